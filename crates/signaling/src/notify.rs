//! EinladungsWaechter – Benachrichtigungs-Flaeche fuer eingehende Anrufe
//!
//! Der Waechter pollt den Anfragen-Store (dauerhafter Fallback) und
//! verarbeitet zusaetzlich Events vom eigenen Privat-Topic (Latenz-
//! Abkuerzung). Beide Quellen werden per Anfrage-ID zusammengefuehrt,
//! damit keine Karte doppelt erscheint.
//!
//! Der clientseitige Kartenablauf ist rein beratend: die verbindliche
//! Pruefung passiert erneut im Store, wenn der Benutzer Accept drueckt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use beistand_core::raum::RaumId;
use beistand_db::{AnfrageRepository, ProfilRepository};

use crate::broadcast::BroadcastHub;
use crate::error::{SignalingError, SignalingResult};
use crate::events::{user_topic, CallEvent};

/// Standard-Polling-Intervall (siehe Connect-Seiten: ~8s)
const POLL_INTERVALL: Duration = Duration::from_secs(8);

/// Maximale Kartenzahl pro Poll
const POLL_LIMIT: i64 = 50;

/// Platzhalter-Ablauf fuer Broadcast-Karten, bis der naechste Poll den
/// Store-Wert nachliefert
const BROADCAST_KARTEN_TTL_SEKUNDEN: i64 = 60;

/// Eine anzeigbare, selbst-ablaufende Einladungskarte
#[derive(Debug, Clone)]
pub struct EinladungsKarte {
    pub anfrage_id: Uuid,
    pub von: Uuid,
    pub raum: Option<RaumId>,
    pub anzeige_name: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl EinladungsKarte {
    /// Prueft ob die Karte zum Zeitpunkt `now` abgelaufen ist
    pub fn ist_abgelaufen(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// RAII-Sperre gegen ueberlappende Accept/Decline-Aktionen
///
/// Wird beim Fallenlassen automatisch freigegeben – auch im Fehlerpfad.
pub struct AktionsSperre<'a> {
    flag: &'a AtomicBool,
}

impl Drop for AktionsSperre<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Ueberwacht eingehende Einladungen fuer einen Benutzer
pub struct EinladungsWaechter<R>
where
    R: AnfrageRepository + ProfilRepository + 'static,
{
    repo: Arc<R>,
    hub: BroadcastHub,
    user: Uuid,
    intervall: Duration,
    karten: Mutex<Vec<EinladungsKarte>>,
    /// Pause-Guard: Tab verborgen
    sichtbar: AtomicBool,
    /// Pause-Guard: Navigation in einen Raum laeuft
    umleitung: AtomicBool,
    /// Doppelklick-Schutz fuer Accept/Decline
    aktion_laeuft: AtomicBool,
}

impl<R> EinladungsWaechter<R>
where
    R: AnfrageRepository + ProfilRepository + 'static,
{
    /// Erstellt einen Waechter mit Standard-Intervall (8s)
    pub fn neu(repo: Arc<R>, hub: BroadcastHub, user: Uuid) -> Arc<Self> {
        Self::mit_intervall(repo, hub, user, POLL_INTERVALL)
    }

    /// Erstellt einen Waechter mit abweichendem Intervall (fuer Tests)
    pub fn mit_intervall(
        repo: Arc<R>,
        hub: BroadcastHub,
        user: Uuid,
        intervall: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            hub,
            user,
            intervall,
            karten: Mutex::new(Vec::new()),
            sichtbar: AtomicBool::new(true),
            umleitung: AtomicBool::new(false),
            aktion_laeuft: AtomicBool::new(false),
        })
    }

    /// Startet die Hintergrund-Schleife: sofortiger Poll, dann Intervall,
    /// dazwischen Privat-Topic-Events
    pub fn starten(self: &Arc<Self>) -> JoinHandle<()> {
        let waechter = Arc::clone(self);
        let mut ereignisse = waechter.hub.abonnieren(&user_topic(waechter.user));

        tokio::spawn(async move {
            let mut takt = tokio::time::interval(waechter.intervall);
            loop {
                tokio::select! {
                    _ = takt.tick() => {
                        if let Err(e) = waechter.tick().await {
                            tracing::warn!(fehler = %e, "Einladungs-Poll fehlgeschlagen");
                        }
                    }
                    ereignis = ereignisse.recv() => match ereignis {
                        Ok(event) => waechter.event_verarbeiten(event),
                        Err(RecvError::Lagged(verpasst)) => {
                            // Nachzuegler: der naechste Poll holt den Stand nach
                            tracing::debug!(verpasst, "Privat-Topic uebergelaufen");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    /// Ein einzelner Poll-Durchlauf gegen den Store
    ///
    /// Greift nicht ein solange ein Pause-Guard gesetzt ist (Tab verborgen
    /// oder Navigation laeuft) – redundante Arbeit mitten in einer
    /// Umleitung korrumpiert sonst den Anzeigezustand.
    pub async fn tick(&self) -> SignalingResult<()> {
        if !self.sichtbar.load(Ordering::SeqCst) || self.umleitung.load(Ordering::SeqCst) {
            return Ok(());
        }

        let now = Utc::now();
        let anfragen = self
            .repo
            .list_available(Some(self.user), now, POLL_LIMIT)
            .await?;

        let ids: Vec<Uuid> = anfragen.iter().map(|a| a.requester_id).collect();
        let profile = self.repo.get_profile(&ids).await?;

        let mut karten = self
            .karten
            .lock()
            .map_err(|_| SignalingError::intern("Karten-Lock vergiftet"))?;

        // Zusammenfuehren per Anfrage-ID: bestehende Karten aktualisieren,
        // neue anhaengen, nie duplizieren
        for anfrage in anfragen {
            let anzeige_name = profile
                .iter()
                .find(|p| p.user_id == anfrage.requester_id)
                .map(|p| p.display_name.clone());
            match karten.iter_mut().find(|k| k.anfrage_id == anfrage.id) {
                Some(karte) => {
                    karte.expires_at = anfrage.expires_at;
                    karte.raum = anfrage.room_id.clone().map(RaumId);
                    if anzeige_name.is_some() {
                        karte.anzeige_name = anzeige_name;
                    }
                }
                None => karten.push(EinladungsKarte {
                    anfrage_id: anfrage.id,
                    von: anfrage.requester_id,
                    raum: anfrage.room_id.map(RaumId),
                    anzeige_name,
                    expires_at: anfrage.expires_at,
                }),
            }
        }

        karten.retain(|k| !k.ist_abgelaufen(now));
        Ok(())
    }

    /// Verarbeitet ein Event von der Subscriber-Grenze
    ///
    /// Nur an diesen Benutzer adressierte Events wirken; alles andere
    /// wird still verworfen (clientseitiger Empfaenger-Filter).
    pub fn event_verarbeiten(&self, event: CallEvent) {
        let Ok(mut karten) = self.karten.lock() else {
            return;
        };

        match event {
            CallEvent::IncomingCall {
                request_id,
                from,
                to,
                room,
                context,
            } if to == self.user => {
                if !karten.iter().any(|k| k.anfrage_id == request_id) {
                    karten.push(EinladungsKarte {
                        anfrage_id: request_id,
                        von: from,
                        raum: room,
                        anzeige_name: context,
                        expires_at: Utc::now()
                            + chrono::Duration::seconds(BROADCAST_KARTEN_TTL_SEKUNDEN),
                    });
                }
            }
            CallEvent::CallAccepted { request_id, .. }
            | CallEvent::CallDeclined { request_id, .. }
            | CallEvent::CallEnded { request_id, .. } => {
                karten.retain(|k| k.anfrage_id != request_id);
            }
            _ => {}
        }
    }

    /// Gibt die aktuell anzeigbaren Karten zurueck (abgelaufene entfernt)
    pub fn karten(&self) -> Vec<EinladungsKarte> {
        let now = Utc::now();
        match self.karten.lock() {
            Ok(mut karten) => {
                karten.retain(|k| !k.ist_abgelaufen(now));
                karten.clone()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Setzt den Sichtbarkeits-Guard (Tab sichtbar/verborgen)
    pub fn sichtbarkeit_setzen(&self, sichtbar: bool) {
        self.sichtbar.store(sichtbar, Ordering::SeqCst);
    }

    /// Setzt den Umleitungs-Guard (Navigation in einen Raum laeuft)
    pub fn umleitung_setzen(&self, laeuft: bool) {
        self.umleitung.store(laeuft, Ordering::SeqCst);
    }

    /// Reserviert die Aktions-Sperre fuer einen Accept/Decline
    ///
    /// Schlaegt fehl solange eine andere Aktion laeuft (Doppelklick).
    /// Die Sperre wird beim Fallenlassen freigegeben, auch bei Fehlern.
    pub fn aktion_beginnen(&self) -> SignalingResult<AktionsSperre<'_>> {
        if self
            .aktion_laeuft
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(AktionsSperre {
                flag: &self.aktion_laeuft,
            })
        } else {
            Err(SignalingError::AktionInArbeit)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
