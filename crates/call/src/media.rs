//! Medien-Collaborator-Traits
//!
//! Die Zustandsmaschine spricht den Medien-Server ausschliesslich ueber
//! diese Traits an. Der konkrete SDK-Anschluss lebt ausserhalb dieses
//! Crates; Tests haengen eine Mock-Sitzung ein.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::CallResult;

/// Art eines Medien-Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackArt {
    Audio,
    Video,
}

/// Ereignisse aus einer laufenden Medien-Sitzung
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// Ein entfernter Track wurde abonniert (ab hier fliessen Daten)
    RemoteTrackAbonniert {
        teilnehmer: String,
        art: TrackArt,
    },
    /// Ein entfernter Track wurde abbestellt
    RemoteTrackAbbestellt {
        teilnehmer: String,
        art: TrackArt,
    },
    /// Ein Teilnehmer ist dem Raum beigetreten (noch kein Medienfluss)
    TeilnehmerVerbunden { identitaet: String },
    /// Die Sitzung wurde serverseitig getrennt
    Getrennt,
}

/// Baut Medien-Sitzungen zu einem Medien-Server auf
#[async_trait]
pub trait MediaConnector: Send + Sync {
    /// Tritt dem Raum hinter `url` mit dem Zugangs-Token bei
    async fn verbinden(&self, url: &str, token: &str) -> CallResult<Box<dyn MediaSession>>;
}

/// Eine laufende Medien-Sitzung in einem Raum
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Erstellt und veroeffentlicht die lokalen Tracks (Mikrofon,
    /// optional Kamera)
    async fn tracks_veroeffentlichen(&self, mit_video: bool) -> CallResult<()>;

    /// Schaltet das lokale Mikrofon an/aus
    ///
    /// Stummschalten kippt nur das Enabled-Flag; der Track bleibt
    /// veroeffentlicht, damit Entstummen verzoegerungsfrei ist.
    async fn mikrofon_aktivieren(&self, aktiv: bool) -> CallResult<()>;

    /// Liefert einen Empfaenger fuer Sitzungs-Ereignisse
    fn ereignisse(&self) -> broadcast::Receiver<MediaEvent>;

    /// Trennt die Sitzung vom Medien-Server
    async fn trennen(&self);

    /// Stoppt die lokalen Tracks und gibt die Geraete frei
    async fn tracks_freigeben(&self);
}
