//! Call-Events – das getaggte Nachrichtenformat des Broadcast-Hubs
//!
//! Statt frei geformter Payloads tragen alle Topics eine geschlossene
//! Union von Event-Typen, die an der Subscriber-Grenze per serde
//! validiert wird. Empfaenger filtern clientseitig ueber die eingebetteten
//! IDs; der Hub selbst kennt keine Adressaten.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use beistand_core::raum::RaumId;

/// Gemeinsames Lobby-Topic fuer alle Call-Events
pub const LOBBY_TOPIC: &str = "calls";

/// Privates Topic eines einzelnen Benutzers
pub fn user_topic(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

/// Alle Event-Typen die ueber den Broadcast-Hub laufen
///
/// Broadcast ist eine Latenz-Abkuerzung: jeder dieser Fluesse hat einen
/// dauerhaften Fallback im Anfragen-Store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CallEvent {
    /// Neue offene Anfrage (Lobby-Frische, rein informativ)
    RequestCreated {
        request_id: Uuid,
        requester_id: Uuid,
    },
    /// Direkter eingehender Anruf (Privat-Topic des Angerufenen)
    IncomingCall {
        request_id: Uuid,
        from: Uuid,
        to: Uuid,
        room: Option<RaumId>,
        /// Freitext-Kontext, z.B. Anzeigename des Anrufers
        context: Option<String>,
    },
    /// Anruf wurde angenommen
    CallAccepted {
        request_id: Uuid,
        from: Uuid,
        to: Uuid,
        room: RaumId,
    },
    /// Anruf wurde abgelehnt
    CallDeclined {
        request_id: Uuid,
        from: Uuid,
        to: Uuid,
    },
    /// Gespraech wurde beendet
    CallEnded {
        request_id: Uuid,
        from: Uuid,
        room: RaumId,
    },
    /// Aufforderung, in einen Raum zu navigieren (Privat-Topic)
    NavigateToRoom { to: Uuid, room: RaumId },
}

impl CallEvent {
    /// Gibt den Ziel-Benutzer zurueck, falls das Event adressiert ist
    ///
    /// Lobby-Subscriber nutzen das fuer den clientseitigen Empfaenger-Filter.
    pub fn adressat(&self) -> Option<Uuid> {
        match self {
            Self::RequestCreated { .. } => None,
            Self::IncomingCall { to, .. }
            | Self::CallAccepted { to, .. }
            | Self::CallDeclined { to, .. }
            | Self::NavigateToRoom { to, .. } => Some(*to),
            Self::CallEnded { .. } => None,
        }
    }
}
