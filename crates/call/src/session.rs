//! CallSession – die Anruf-Zustandsmaschine
//!
//! Eine Session gehoert genau einem Benutzer und verwaltet hoechstens
//! einen aktiven Anruf. Alle Zeitgeber (30s Auto-Decline, 500ms
//! Ended-Anzeige, Gespraechsdauer) laufen ueber `tokio::time` und sind
//! damit in Tests mit angehaltener Uhr deterministisch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

use beistand_core::raum::RaumId;
use beistand_db::AnfrageRepository;
use beistand_signaling::{user_topic, BroadcastHub, CallEvent, LOBBY_TOPIC};

use crate::error::{CallError, CallResult};
use crate::media::{MediaConnector, MediaEvent, MediaSession, TrackArt};
use crate::token::TokenIssuer;

/// Unbeantwortetes Klingeln lehnt nach dieser Frist automatisch ab
const KLINGEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Ended bleibt kurz sichtbar bevor die Maschine nach Idle zurueckkehrt
const ENDED_ANZEIGE: Duration = Duration::from_millis(500);

/// Phasen der Zustandsmaschine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrufPhase {
    Idle,
    /// Anrufer: Einladung versendet, wartet auf Antwort
    Calling,
    /// Angerufener: Einladung empfangen, Timer laeuft
    Ringing,
    /// Token holen und Medien-Sitzung aufbauen
    Connecting,
    Connected,
    Ended,
}

/// Zustand des gerade aktiven Anrufs
struct AktiverAnruf {
    anfrage_id: Uuid,
    gegenueber: Option<Uuid>,
    raum: Option<RaumId>,
    session: Option<Box<dyn MediaSession>>,
    /// Gesetzt beim ersten abonnierten Remote-Audio-Track, nie beim
    /// blossen Raumbeitritt
    verbunden_seit: Option<Instant>,
}

impl AktiverAnruf {
    fn neu(anfrage_id: Uuid, gegenueber: Option<Uuid>, raum: Option<RaumId>) -> Self {
        Self {
            anfrage_id,
            gegenueber,
            raum,
            session: None,
            verbunden_seit: None,
        }
    }
}

/// Anruf-Zustandsmaschine eines Benutzers
pub struct CallSession<R>
where
    R: AnfrageRepository + Send + Sync + 'static,
{
    user: Uuid,
    anzeige_name: String,
    repo: Arc<R>,
    hub: BroadcastHub,
    token_issuer: Arc<dyn TokenIssuer>,
    connector: Arc<dyn MediaConnector>,
    phase: watch::Sender<AnrufPhase>,
    anruf: Mutex<Option<AktiverAnruf>>,
    /// Genau-einmal-Schutz fuer Annehmen/Ablehnen waehrend des Klingelns
    klingel_beantwortet: AtomicBool,
    /// Entwertet Auto-Decline-Timer frueherer Klingel-Vorgaenge
    klingel_generation: AtomicU64,
    mit_video: AtomicBool,
}

impl<R> CallSession<R>
where
    R: AnfrageRepository + Send + Sync + 'static,
{
    pub fn neu(
        user: Uuid,
        anzeige_name: impl Into<String>,
        repo: Arc<R>,
        hub: BroadcastHub,
        token_issuer: Arc<dyn TokenIssuer>,
        connector: Arc<dyn MediaConnector>,
    ) -> Arc<Self> {
        let (phase, _) = watch::channel(AnrufPhase::Idle);
        Arc::new(Self {
            user,
            anzeige_name: anzeige_name.into(),
            repo,
            hub,
            token_issuer,
            connector,
            phase,
            anruf: Mutex::new(None),
            klingel_beantwortet: AtomicBool::new(true),
            klingel_generation: AtomicU64::new(0),
            mit_video: AtomicBool::new(false),
        })
    }

    /// Aktuelle Phase
    pub fn phase(&self) -> AnrufPhase {
        *self.phase.borrow()
    }

    /// Beobachter fuer Phasenwechsel (UI-Anbindung)
    pub fn phase_beobachten(&self) -> watch::Receiver<AnrufPhase> {
        self.phase.subscribe()
    }

    /// Schaltet die Kamera fuer kommende Anrufe zu
    pub fn video_aktivieren(&self, aktiv: bool) {
        self.mit_video.store(aktiv, Ordering::SeqCst);
    }

    // -----------------------------------------------------------------------
    // Anrufer-Seite
    // -----------------------------------------------------------------------

    /// Startet einen ausgehenden Anruf: Einladung auf das Privat-Topic
    /// des Angerufenen, dann warten auf Annahme/Ablehnung
    ///
    /// Bei Gruppen-Anrufen steht der Raum schon fest und wird mitgesendet
    /// (Host-Fluss); bei direkten Anrufen entsteht er erst beim Annehmen.
    pub async fn anruf_starten(
        &self,
        anfrage_id: Uuid,
        zu: Uuid,
        raum: Option<RaumId>,
    ) -> CallResult<()> {
        if self.phase() != AnrufPhase::Idle {
            return Err(CallError::ungueltiger_zustand(
                "Anruf nur aus Idle heraus moeglich",
            ));
        }

        *self.anruf.lock().await = Some(AktiverAnruf::neu(anfrage_id, Some(zu), raum.clone()));
        self.phase.send_replace(AnrufPhase::Calling);

        self.hub.veroeffentlichen(
            &user_topic(zu),
            CallEvent::IncomingCall {
                request_id: anfrage_id,
                from: self.user,
                to: zu,
                room: raum,
                context: Some(self.anzeige_name.clone()),
            },
        );
        tracing::info!(anfrage_id = %anfrage_id, zu = %zu, "Ausgehender Anruf gestartet");
        Ok(())
    }

    /// Verarbeitet ein eingehendes Signalisierungs-Event
    ///
    /// Wird vom Event-Pump des Aufrufers gefuettert (Privat-Topic oder
    /// Lobby). Events zu fremden Anfragen werden still verworfen.
    pub async fn ereignis_verarbeiten(self: &Arc<Self>, event: CallEvent) -> CallResult<()> {
        match event {
            CallEvent::CallAccepted {
                request_id, room, ..
            } => {
                let aktuelle = {
                    let guard = self.anruf.lock().await;
                    guard.as_ref().map(|a| a.anfrage_id)
                };
                if self.phase() == AnrufPhase::Calling && aktuelle == Some(request_id) {
                    self.verbinden(&room).await?;
                }
                Ok(())
            }
            CallEvent::CallDeclined { request_id, .. } => {
                let mut guard = self.anruf.lock().await;
                if guard.as_ref().map(|a| a.anfrage_id) == Some(request_id)
                    && self.phase() == AnrufPhase::Calling
                {
                    guard.take();
                    drop(guard);
                    tracing::info!(anfrage_id = %request_id, "Anruf wurde abgelehnt");
                    self.ended_dann_idle();
                }
                Ok(())
            }
            CallEvent::CallEnded { request_id, .. } => {
                let betroffen = {
                    let guard = self.anruf.lock().await;
                    guard.as_ref().map(|a| a.anfrage_id) == Some(request_id)
                };
                if betroffen {
                    self.remote_beendet().await;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Angerufenen-Seite
    // -----------------------------------------------------------------------

    /// Eingehenden Anruf entgegennehmen lassen: Idle -> Ringing
    ///
    /// Startet den 30s-Timer, der unbeantwortetes Klingeln genau einmal
    /// automatisch ablehnt.
    pub async fn klingeln(
        self: &Arc<Self>,
        anfrage_id: Uuid,
        von: Uuid,
        raum: Option<RaumId>,
    ) -> CallResult<()> {
        if self.phase() != AnrufPhase::Idle {
            return Err(CallError::ungueltiger_zustand(
                "Klingeln nur aus Idle heraus moeglich",
            ));
        }

        let generation = self.klingel_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.klingel_beantwortet.store(false, Ordering::SeqCst);
        *self.anruf.lock().await = Some(AktiverAnruf::neu(anfrage_id, Some(von), raum));
        self.phase.send_replace(AnrufPhase::Ringing);

        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(KLINGEL_TIMEOUT).await;
            let mut anruf = session.anruf.lock().await;
            // Ein juengerer Klingel-Vorgang entwertet diesen Timer; sonst
            // wuerde ein abgelehnter Anruf A den klingelnden Anruf B killen
            // und eine zweite Ablehnung fuer A senden.
            if session.klingel_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if session
                .klingel_beantwortet
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
            anruf.take();
            drop(anruf);
            tracing::info!(anfrage_id = %anfrage_id, "Klingeln unbeantwortet, lehne automatisch ab");
            session.decline_senden(anfrage_id, von);
            session.ended_dann_idle();
        });
        Ok(())
    }

    /// Nimmt den klingelnden Anruf an und baut die Medien-Sitzung auf
    ///
    /// Der Raum kommt von der Vermittlung (beim direkten Anruf aus dem
    /// Accept, beim Gruppen-Anruf aus der Einladung selbst).
    pub async fn annehmen(self: &Arc<Self>, raum: RaumId) -> CallResult<()> {
        let (anfrage_id, gegenueber) = {
            let mut guard = self.anruf.lock().await;
            let anruf = guard
                .as_mut()
                .ok_or_else(|| CallError::ungueltiger_zustand("kein klingelnder Anruf"))?;
            if self
                .klingel_beantwortet
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return Err(CallError::ungueltiger_zustand(
                    "Klingeln wurde bereits beantwortet",
                ));
            }
            anruf.raum = Some(raum.clone());
            (anruf.anfrage_id, anruf.gegenueber)
        };

        if let Some(zu) = gegenueber {
            self.hub.veroeffentlichen(
                &user_topic(zu),
                CallEvent::CallAccepted {
                    request_id: anfrage_id,
                    from: self.user,
                    to: zu,
                    room: raum.clone(),
                },
            );
        }

        self.verbinden(&raum).await
    }

    /// Lehnt den klingelnden Anruf ab
    ///
    /// Die Ablehnung geht genau einmal raus, auch wenn der Auto-Decline-
    /// Timer gleichzeitig feuert.
    pub async fn ablehnen(self: &Arc<Self>) -> CallResult<()> {
        let anruf = self
            .anruf
            .lock()
            .await
            .take()
            .ok_or_else(|| CallError::ungueltiger_zustand("kein klingelnder Anruf"))?;

        if self
            .klingel_beantwortet
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if let Some(zu) = anruf.gegenueber {
                self.decline_senden(anruf.anfrage_id, zu);
            }
        }
        self.ended_dann_idle();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Laufendes Gespraech
    // -----------------------------------------------------------------------

    /// Stummschalten: kippt nur das Enabled-Flag des Mikrofons, der
    /// Track bleibt veroeffentlicht
    pub async fn stumm_schalten(&self, stumm: bool) -> CallResult<()> {
        let guard = self.anruf.lock().await;
        let session = guard
            .as_ref()
            .and_then(|a| a.session.as_ref())
            .ok_or_else(|| CallError::ungueltiger_zustand("keine aktive Medien-Sitzung"))?;
        session.mikrofon_aktivieren(!stumm).await
    }

    /// Legt auf und raeumt in fester Reihenfolge auf
    ///
    /// Reihenfolge: Ende-Broadcast, Anfrage abschliessen, Sitzung
    /// trennen, lokale Tracks freigeben. Die beiden letzten Schritte
    /// laufen bedingungslos, damit Mikrofon und Kamera nie haengen
    /// bleiben wenn Broadcast oder Store ausfallen.
    ///
    /// Gibt die Gespraechsdauer zurueck (0 wenn nie Remote-Audio floss).
    pub async fn auflegen(self: &Arc<Self>) -> CallResult<Duration> {
        let mut anruf = self
            .anruf
            .lock()
            .await
            .take()
            .ok_or_else(|| CallError::ungueltiger_zustand("kein aktiver Anruf"))?;

        self.klingel_beantwortet.store(true, Ordering::SeqCst);
        let dauer = anruf
            .verbunden_seit
            .map(|seit| seit.elapsed())
            .unwrap_or_default();

        if let Some(raum) = &anruf.raum {
            let ende = CallEvent::CallEnded {
                request_id: anruf.anfrage_id,
                from: self.user,
                room: raum.clone(),
            };
            self.hub.veroeffentlichen(LOBBY_TOPIC, ende.clone());
            if let Some(zu) = anruf.gegenueber {
                self.hub.veroeffentlichen(&user_topic(zu), ende);
            }
        }

        if let Err(e) = self.repo.mark_completed(anruf.anfrage_id).await {
            tracing::warn!(
                anfrage_id = %anruf.anfrage_id,
                fehler = %e,
                "Anfrage konnte beim Auflegen nicht abgeschlossen werden"
            );
        }

        if let Some(session) = anruf.session.take() {
            session.trennen().await;
            session.tracks_freigeben().await;
        }

        tracing::info!(
            anfrage_id = %anruf.anfrage_id,
            dauer_sekunden = dauer.as_secs(),
            "Gespraech beendet"
        );
        self.ended_dann_idle();
        Ok(dauer)
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    /// Token holen und Medien-Sitzung aufbauen: -> Connecting -> Connected
    ///
    /// Jeder Fehlschlag fuehrt direkt nach Ended; es gibt keinen
    /// automatischen Retry, der Benutzer startet den Fluss neu.
    async fn verbinden(self: &Arc<Self>, raum: &RaumId) -> CallResult<()> {
        self.phase.send_replace(AnrufPhase::Connecting);

        let token = match self
            .token_issuer
            .ausstellen(raum, self.user, &self.anzeige_name)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(raum = %raum, fehler = %e, "Token-Abruf fehlgeschlagen");
                self.anruf.lock().await.take();
                self.ended_dann_idle();
                return Err(e);
            }
        };

        let session = match self.connector.verbinden(&token.url, &token.token).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(raum = %raum, fehler = %e, "Medien-Verbindung fehlgeschlagen");
                self.anruf.lock().await.take();
                self.ended_dann_idle();
                return Err(e);
            }
        };

        let mit_video = self.mit_video.load(Ordering::SeqCst);
        if let Err(e) = session.tracks_veroeffentlichen(mit_video).await {
            session.trennen().await;
            session.tracks_freigeben().await;
            self.anruf.lock().await.take();
            self.ended_dann_idle();
            return Err(e);
        }

        let mut ereignisse = session.ereignisse();
        {
            let mut guard = self.anruf.lock().await;
            match guard.as_mut() {
                Some(anruf) => {
                    anruf.raum = Some(raum.clone());
                    anruf.session = Some(session);
                }
                // Waehrend des Verbindens wurde aufgelegt
                None => {
                    session.trennen().await;
                    session.tracks_freigeben().await;
                    return Ok(());
                }
            }
        }
        self.phase.send_replace(AnrufPhase::Connected);

        // Ereignis-Pumpe: Dauer ab erstem Remote-Audio, Ende bei Trennung
        let zustand = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match ereignisse.recv().await {
                    Ok(MediaEvent::RemoteTrackAbonniert {
                        art: TrackArt::Audio,
                        ..
                    }) => {
                        let mut guard = zustand.anruf.lock().await;
                        if let Some(anruf) = guard.as_mut() {
                            if anruf.verbunden_seit.is_none() {
                                anruf.verbunden_seit = Some(Instant::now());
                            }
                        }
                    }
                    Ok(MediaEvent::Getrennt) => {
                        zustand.remote_beendet().await;
                        break;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(())
    }

    /// Gegenseite hat beendet: aufraeumen ohne erneuten Broadcast
    async fn remote_beendet(self: &Arc<Self>) {
        let Some(mut anruf) = self.anruf.lock().await.take() else {
            return;
        };
        self.klingel_beantwortet.store(true, Ordering::SeqCst);
        if let Some(session) = anruf.session.take() {
            session.trennen().await;
            session.tracks_freigeben().await;
        }
        tracing::info!(anfrage_id = %anruf.anfrage_id, "Gespraech von Gegenseite beendet");
        self.ended_dann_idle();
    }

    fn decline_senden(&self, anfrage_id: Uuid, zu: Uuid) {
        self.hub.veroeffentlichen(
            &user_topic(zu),
            CallEvent::CallDeclined {
                request_id: anfrage_id,
                from: self.user,
                to: zu,
            },
        );
    }

    /// Ended anzeigen, nach kurzer Frist automatisch zurueck nach Idle
    fn ended_dann_idle(self: &Arc<Self>) {
        self.phase.send_replace(AnrufPhase::Ended);
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(ENDED_ANZEIGE).await;
            session.phase.send_if_modified(|phase| {
                if *phase == AnrufPhase::Ended {
                    *phase = AnrufPhase::Idle;
                    true
                } else {
                    false
                }
            });
        });
    }
}
