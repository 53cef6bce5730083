//! Integrationstests der Anruf-Zustandsmaschine mit Mock-Medien

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use beistand_call::{
    AnrufPhase, CallError, CallResult, CallSession, MediaConnector, MediaEvent, MediaSession,
    TokenAntwort, TokenIssuer, TrackArt,
};
use beistand_core::raum::RaumId;
use beistand_db::models::{AnfrageArt, AnfrageStatus, NeueAnfrage};
use beistand_db::{AnfrageRepository, SqliteDb};
use beistand_signaling::{user_topic, BroadcastHub, CallEvent, LOBBY_TOPIC};

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

struct MockSessionKern {
    ereignisse: broadcast::Sender<MediaEvent>,
    veroeffentlicht: AtomicBool,
    mikrofon_aktiv: AtomicBool,
    getrennt: AtomicBool,
    freigegeben: AtomicBool,
}

impl MockSessionKern {
    fn neu() -> Arc<Self> {
        let (ereignisse, _) = broadcast::channel(16);
        Arc::new(Self {
            ereignisse,
            veroeffentlicht: AtomicBool::new(false),
            mikrofon_aktiv: AtomicBool::new(false),
            getrennt: AtomicBool::new(false),
            freigegeben: AtomicBool::new(false),
        })
    }

    fn senden(&self, event: MediaEvent) {
        let _ = self.ereignisse.send(event);
    }
}

struct MockSession {
    kern: Arc<MockSessionKern>,
}

#[async_trait]
impl MediaSession for MockSession {
    async fn tracks_veroeffentlichen(&self, _mit_video: bool) -> CallResult<()> {
        self.kern.veroeffentlicht.store(true, Ordering::SeqCst);
        self.kern.mikrofon_aktiv.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn mikrofon_aktivieren(&self, aktiv: bool) -> CallResult<()> {
        self.kern.mikrofon_aktiv.store(aktiv, Ordering::SeqCst);
        Ok(())
    }

    fn ereignisse(&self) -> broadcast::Receiver<MediaEvent> {
        self.kern.ereignisse.subscribe()
    }

    async fn trennen(&self) {
        self.kern.getrennt.store(true, Ordering::SeqCst);
    }

    async fn tracks_freigeben(&self) {
        self.kern.freigegeben.store(true, Ordering::SeqCst);
    }
}

struct MockConnector {
    fehlschlagen: bool,
    kerne: Mutex<Vec<Arc<MockSessionKern>>>,
}

impl MockConnector {
    fn neu() -> Arc<Self> {
        Arc::new(Self {
            fehlschlagen: false,
            kerne: Mutex::new(Vec::new()),
        })
    }

    fn kaputt() -> Arc<Self> {
        Arc::new(Self {
            fehlschlagen: true,
            kerne: Mutex::new(Vec::new()),
        })
    }

    fn letzter_kern(&self) -> Arc<MockSessionKern> {
        self.kerne
            .lock()
            .unwrap()
            .last()
            .expect("keine Sitzung aufgebaut")
            .clone()
    }

    fn sitzungs_anzahl(&self) -> usize {
        self.kerne.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaConnector for MockConnector {
    async fn verbinden(&self, _url: &str, _token: &str) -> CallResult<Box<dyn MediaSession>> {
        if self.fehlschlagen {
            return Err(CallError::Verbindung("Mock-Verbindung verweigert".into()));
        }
        let kern = MockSessionKern::neu();
        self.kerne.lock().unwrap().push(kern.clone());
        Ok(Box::new(MockSession { kern }))
    }
}

struct MockIssuer {
    fehlschlagen: bool,
}

#[async_trait]
impl TokenIssuer for MockIssuer {
    async fn ausstellen(
        &self,
        _raum: &RaumId,
        _identitaet: Uuid,
        _name: &str,
    ) -> CallResult<TokenAntwort> {
        if self.fehlschlagen {
            return Err(CallError::TokenAbruf("Mock-Issuer verweigert".into()));
        }
        Ok(TokenAntwort {
            token: "mock-token".into(),
            url: "wss://media.test".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Aufbau-Helfer
// ---------------------------------------------------------------------------

/// Der Pool verbindet sich auf einem Blocking-Thread; die Uhr darf erst
/// danach angehalten werden, sonst laeuft der Acquire-Timeout sofort ab.
async fn db() -> Arc<SqliteDb> {
    Arc::new(SqliteDb::in_memory().await.expect("In-Memory DB"))
}

fn session(
    user: Uuid,
    db: Arc<SqliteDb>,
    hub: BroadcastHub,
    connector: Arc<MockConnector>,
) -> Arc<CallSession<SqliteDb>> {
    CallSession::neu(
        user,
        "Testperson",
        db,
        hub,
        Arc::new(MockIssuer { fehlschlagen: false }),
        connector,
    )
}

async fn anfrage_anlegen(db: &SqliteDb, requester: Uuid) -> Uuid {
    db.create(NeueAnfrage {
        requester_id: requester,
        art: AnfrageArt::Direct,
        room_id: None,
        expires_at: Utc::now() + chrono::Duration::minutes(10),
    })
    .await
    .unwrap()
    .id
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn klingeln_lehnt_nach_30_sekunden_automatisch_ab() {
    let db = db().await;
    tokio::time::pause();
    let anrufer = Uuid::new_v4();
    let ich = Uuid::new_v4();
    let hub = BroadcastHub::neu();
    let mut beim_anrufer = hub.abonnieren(&user_topic(anrufer));

    let maschine = session(ich, db, hub, MockConnector::neu());
    maschine.klingeln(Uuid::new_v4(), anrufer, None).await.unwrap();
    assert_eq!(maschine.phase(), AnrufPhase::Ringing);

    tokio::time::sleep(Duration::from_secs(31)).await;

    let event = tokio::time::timeout(Duration::from_secs(1), beim_anrufer.recv())
        .await
        .expect("Auto-Decline kam nicht")
        .unwrap();
    assert!(matches!(event, CallEvent::CallDeclined { .. }));

    // Nach der Ended-Anzeige steht die Maschine wieder auf Idle
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(maschine.phase(), AnrufPhase::Idle);
}

#[tokio::test]
async fn phasenwechsel_brauchen_keinen_beobachter() {
    let db = db().await;
    let maschine = session(Uuid::new_v4(), db, BroadcastHub::neu(), MockConnector::neu());

    // Niemand haelt einen Receiver aus phase_beobachten(): die Maschine
    // muss ihre Uebergaenge trotzdem vollziehen.
    maschine.klingeln(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
    assert_eq!(maschine.phase(), AnrufPhase::Ringing);

    maschine.ablehnen().await.unwrap();
    assert_eq!(maschine.phase(), AnrufPhase::Ended);
}

#[tokio::test]
async fn alter_timer_stoert_spaeteres_klingeln_nicht() {
    let db = db().await;
    tokio::time::pause();
    let anrufer_a = Uuid::new_v4();
    let anrufer_b = Uuid::new_v4();
    let anfrage_a = Uuid::new_v4();
    let anfrage_b = Uuid::new_v4();
    let hub = BroadcastHub::neu();
    let mut bei_a = hub.abonnieren(&user_topic(anrufer_a));
    let mut bei_b = hub.abonnieren(&user_topic(anrufer_b));

    let maschine = session(Uuid::new_v4(), db, hub, MockConnector::neu());
    maschine.klingeln(anfrage_a, anrufer_a, None).await.unwrap();
    maschine.ablehnen().await.unwrap();
    let erste = bei_a.try_recv().unwrap();
    assert!(matches!(erste, CallEvent::CallDeclined { request_id, .. } if request_id == anfrage_a));

    // Nach der Ended-Anzeige klingelt der naechste Anruf, waehrend der
    // 30s-Timer des ersten noch aussteht
    tokio::time::sleep(Duration::from_secs(1)).await;
    maschine.klingeln(anfrage_b, anrufer_b, None).await.unwrap();

    // t=30,5s: der Timer des ersten Anrufs ist abgelaufen und muss ins
    // Leere gehen, der zweite Anruf klingelt weiter
    tokio::time::sleep(Duration::from_millis(29_500)).await;
    assert_eq!(maschine.phase(), AnrufPhase::Ringing);
    assert!(
        bei_a.try_recv().is_err(),
        "Ablehnung fuer den ersten Anruf ging doppelt raus"
    );

    // Der zweite Anruf laeuft erst nach seinen eigenen 30 Sekunden ab
    tokio::time::sleep(Duration::from_secs(1)).await;
    let zweite = bei_b.try_recv().unwrap();
    assert!(matches!(zweite, CallEvent::CallDeclined { request_id, .. } if request_id == anfrage_b));
}

#[tokio::test]
async fn manuelles_ablehnen_sendet_genau_eine_ablehnung() {
    let db = db().await;
    tokio::time::pause();
    let anrufer = Uuid::new_v4();
    let hub = BroadcastHub::neu();
    let mut beim_anrufer = hub.abonnieren(&user_topic(anrufer));

    let maschine = session(Uuid::new_v4(), db, hub, MockConnector::neu());
    maschine.klingeln(Uuid::new_v4(), anrufer, None).await.unwrap();
    maschine.ablehnen().await.unwrap();

    // Auch wenn der Timer spaeter feuert darf nichts mehr rausgehen
    tokio::time::sleep(Duration::from_secs(40)).await;

    let erste = beim_anrufer.try_recv().unwrap();
    assert!(matches!(erste, CallEvent::CallDeclined { .. }));
    assert!(beim_anrufer.try_recv().is_err(), "Ablehnung ging doppelt raus");
}

#[tokio::test]
async fn annehmen_verbindet_und_unterbindet_den_timer() {
    let db = db().await;
    tokio::time::pause();
    let anrufer = Uuid::new_v4();
    let hub = BroadcastHub::neu();
    let mut beim_anrufer = hub.abonnieren(&user_topic(anrufer));
    let connector = MockConnector::neu();

    let maschine = session(Uuid::new_v4(), db, hub, connector.clone());
    maschine.klingeln(Uuid::new_v4(), anrufer, None).await.unwrap();
    maschine.annehmen(RaumId("quick-connect-1-abc".into())).await.unwrap();

    assert_eq!(maschine.phase(), AnrufPhase::Connected);
    let kern = connector.letzter_kern();
    assert!(kern.veroeffentlicht.load(Ordering::SeqCst));

    let event = beim_anrufer.try_recv().unwrap();
    assert!(matches!(event, CallEvent::CallAccepted { .. }));

    // Timer feuert ins Leere: keine nachtraegliche Ablehnung
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert!(beim_anrufer.try_recv().is_err());
    assert_eq!(maschine.phase(), AnrufPhase::Connected);
}

#[tokio::test]
async fn dauer_bleibt_null_ohne_remote_audio() {
    let db = db().await;
    tokio::time::pause();
    let hub = BroadcastHub::neu();
    let connector = MockConnector::neu();

    let maschine = session(Uuid::new_v4(), db, hub, connector.clone());
    maschine.klingeln(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
    maschine.annehmen(RaumId("quick-connect-1-abc".into())).await.unwrap();

    // Beitritt allein startet keine Uhr, auch ein Video-Track nicht
    let kern = connector.letzter_kern();
    kern.senden(MediaEvent::TeilnehmerVerbunden {
        identitaet: "peer".into(),
    });
    kern.senden(MediaEvent::RemoteTrackAbonniert {
        teilnehmer: "peer".into(),
        art: TrackArt::Video,
    });
    tokio::time::sleep(Duration::from_secs(10)).await;

    let dauer = maschine.auflegen().await.unwrap();
    assert_eq!(dauer, Duration::ZERO, "Zaehlung darf erst mit Audio beginnen");
}

#[tokio::test]
async fn dauer_misst_ab_erstem_remote_audio() {
    let db = db().await;
    tokio::time::pause();
    let hub = BroadcastHub::neu();
    let connector = MockConnector::neu();

    let maschine = session(Uuid::new_v4(), db, hub, connector.clone());
    maschine.klingeln(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
    maschine.annehmen(RaumId("quick-connect-1-abc".into())).await.unwrap();

    // Stille Minute vor dem ersten Audio zaehlt nicht
    tokio::time::sleep(Duration::from_secs(60)).await;
    let kern = connector.letzter_kern();
    kern.senden(MediaEvent::RemoteTrackAbonniert {
        teilnehmer: "peer".into(),
        art: TrackArt::Audio,
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    tokio::time::sleep(Duration::from_secs(7)).await;

    let dauer = maschine.auflegen().await.unwrap();
    assert!(
        dauer >= Duration::from_secs(7) && dauer < Duration::from_secs(8),
        "Dauer war {dauer:?}"
    );
}

#[tokio::test]
async fn stummschalten_kippt_nur_das_enabled_flag() {
    let db = db().await;
    let connector = MockConnector::neu();

    let maschine = session(Uuid::new_v4(), db, BroadcastHub::neu(), connector.clone());
    maschine.klingeln(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
    maschine.annehmen(RaumId("quick-connect-1-abc".into())).await.unwrap();

    let kern = connector.letzter_kern();
    maschine.stumm_schalten(true).await.unwrap();
    assert!(!kern.mikrofon_aktiv.load(Ordering::SeqCst));
    assert!(
        kern.veroeffentlicht.load(Ordering::SeqCst),
        "Stummschalten darf nicht unveroeffentlichen"
    );

    maschine.stumm_schalten(false).await.unwrap();
    assert!(kern.mikrofon_aktiv.load(Ordering::SeqCst));
}

#[tokio::test]
async fn token_fehlschlag_fuehrt_direkt_nach_ended() {
    let db = db().await;
    tokio::time::pause();
    let connector = MockConnector::neu();
    let maschine = CallSession::neu(
        Uuid::new_v4(),
        "Testperson",
        db,
        BroadcastHub::neu(),
        Arc::new(MockIssuer { fehlschlagen: true }),
        connector.clone(),
    );

    maschine.klingeln(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
    let fehler = maschine
        .annehmen(RaumId("quick-connect-1-abc".into()))
        .await
        .unwrap_err();
    assert!(matches!(fehler, CallError::TokenAbruf(_)));
    assert_eq!(maschine.phase(), AnrufPhase::Ended);
    assert_eq!(connector.sitzungs_anzahl(), 0, "kein Verbindungsversuch ohne Token");

    // Kein Retry: die Maschine kehrt nach Idle zurueck und bleibt dort
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(maschine.phase(), AnrufPhase::Idle);
}

#[tokio::test]
async fn verbindungs_fehlschlag_fuehrt_direkt_nach_ended() {
    let db = db().await;
    tokio::time::pause();
    let maschine = session(Uuid::new_v4(), db, BroadcastHub::neu(), MockConnector::kaputt());

    maschine.klingeln(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
    let fehler = maschine
        .annehmen(RaumId("quick-connect-1-abc".into()))
        .await
        .unwrap_err();
    assert!(matches!(fehler, CallError::Verbindung(_)));
    assert_eq!(maschine.phase(), AnrufPhase::Ended);
}

#[tokio::test]
async fn auflegen_beendet_broadcastet_und_schliesst_die_anfrage_ab() {
    let db = db().await;
    let ich = Uuid::new_v4();
    let hub = BroadcastHub::neu();
    let mut lobby = hub.abonnieren(LOBBY_TOPIC);
    let connector = MockConnector::neu();
    let anfrage = anfrage_anlegen(&db, Uuid::new_v4()).await;

    let maschine = session(ich, db.clone(), hub, connector.clone());
    maschine.klingeln(anfrage, Uuid::new_v4(), None).await.unwrap();
    maschine.annehmen(RaumId("quick-connect-1-abc".into())).await.unwrap();

    maschine.auflegen().await.unwrap();

    let event = lobby.try_recv().unwrap();
    assert!(matches!(event, CallEvent::CallEnded { request_id, .. } if request_id == anfrage));

    let kern = connector.letzter_kern();
    assert!(kern.getrennt.load(Ordering::SeqCst));
    assert!(kern.freigegeben.load(Ordering::SeqCst));

    let record = db.get(anfrage).await.unwrap().unwrap();
    assert_eq!(record.status, AnfrageStatus::Completed);
}

#[tokio::test]
async fn auflegen_raeumt_auch_bei_store_ausfall_auf() {
    let db = db().await;
    let connector = MockConnector::neu();

    let maschine = session(Uuid::new_v4(), db.clone(), BroadcastHub::neu(), connector.clone());
    maschine.klingeln(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
    maschine.annehmen(RaumId("quick-connect-1-abc".into())).await.unwrap();

    // Store faellt aus: Trennen und Freigeben muessen trotzdem laufen
    db.pool().close().await;
    maschine.auflegen().await.unwrap();

    let kern = connector.letzter_kern();
    assert!(kern.getrennt.load(Ordering::SeqCst));
    assert!(kern.freigegeben.load(Ordering::SeqCst));
}

#[tokio::test]
async fn anrufer_fluss_von_calling_bis_remote_ende() {
    let db = db().await;
    tokio::time::pause();
    let ich = Uuid::new_v4();
    let gegenueber = Uuid::new_v4();
    let hub = BroadcastHub::neu();
    let mut beim_gegenueber = hub.abonnieren(&user_topic(gegenueber));
    let connector = MockConnector::neu();
    let anfrage = Uuid::new_v4();
    let raum = RaumId("quick-connect-1-abc".into());

    let maschine = session(ich, db, hub, connector.clone());
    maschine.anruf_starten(anfrage, gegenueber, None).await.unwrap();
    assert_eq!(maschine.phase(), AnrufPhase::Calling);

    let einladung = beim_gegenueber.try_recv().unwrap();
    assert!(matches!(einladung, CallEvent::IncomingCall { to, .. } if to == gegenueber));

    // Gegenseite nimmt an: die Maschine verbindet sich in den Raum
    maschine
        .ereignis_verarbeiten(CallEvent::CallAccepted {
            request_id: anfrage,
            from: gegenueber,
            to: ich,
            room: raum.clone(),
        })
        .await
        .unwrap();
    assert_eq!(maschine.phase(), AnrufPhase::Connected);

    // Gegenseite legt auf: aufraeumen ohne erneuten Broadcast
    maschine
        .ereignis_verarbeiten(CallEvent::CallEnded {
            request_id: anfrage,
            from: gegenueber,
            room: raum,
        })
        .await
        .unwrap();
    assert_eq!(maschine.phase(), AnrufPhase::Ended);
    let kern = connector.letzter_kern();
    assert!(kern.getrennt.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(maschine.phase(), AnrufPhase::Idle);
}

#[tokio::test]
async fn abgelehnter_anruf_beendet_den_anrufer() {
    let db = db().await;
    let ich = Uuid::new_v4();
    let gegenueber = Uuid::new_v4();
    let anfrage = Uuid::new_v4();

    let maschine = session(ich, db, BroadcastHub::neu(), MockConnector::neu());
    maschine.anruf_starten(anfrage, gegenueber, None).await.unwrap();

    maschine
        .ereignis_verarbeiten(CallEvent::CallDeclined {
            request_id: anfrage,
            from: gegenueber,
            to: ich,
        })
        .await
        .unwrap();
    assert_eq!(maschine.phase(), AnrufPhase::Ended);
}
