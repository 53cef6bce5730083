//! BroadcastHub – benannte Pub/Sub-Topics ohne Persistenz
//!
//! Vertrag: `publish` ist fire-and-forget, at-most-once, ohne
//! Bestaetigung. Ein getrennter Subscriber verpasst Nachrichten
//! stillschweigend; ein ueberlaufender Subscriber verliert die aeltesten.
//! Deshalb darf der Hub nie der einzige Mechanismus eines Flusses sein –
//! der Anfragen-Store ist die dauerhafte Rueckfallebene.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::events::CallEvent;

/// Kapazitaet pro Topic; Nachzuegler verlieren die aeltesten Events
const TOPIC_KAPAZITAET: usize = 64;

/// Zentraler Broadcast-Hub fuer alle Topics
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<BroadcastHubInner>,
}

struct BroadcastHubInner {
    /// Sender je Topic-Name; entsteht lazy beim ersten Subscribe/Publish
    topics: DashMap<String, broadcast::Sender<CallEvent>>,
}

impl BroadcastHub {
    /// Erstellt einen neuen BroadcastHub
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(BroadcastHubInner {
                topics: DashMap::new(),
            }),
        }
    }

    /// Abonniert ein Topic
    ///
    /// Das Abo endet durch Fallenlassen des Receivers; eine explizite
    /// Abmeldung gibt es nicht.
    pub fn abonnieren(&self, topic: &str) -> broadcast::Receiver<CallEvent> {
        self.inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_KAPAZITAET).0)
            .subscribe()
    }

    /// Veroeffentlicht ein Event auf einem Topic
    ///
    /// Gibt die Anzahl der aktuell verbundenen Subscriber zurueck.
    /// 0 ist kein Fehler: niemand hoert zu, das Event verpufft.
    pub fn veroeffentlichen(&self, topic: &str, event: CallEvent) -> usize {
        match self.inner.topics.get(topic) {
            Some(sender) => match sender.send(event) {
                Ok(anzahl) => anzahl,
                Err(_) => {
                    tracing::debug!(topic = %topic, "Publish ohne Subscriber");
                    0
                }
            },
            None => {
                tracing::debug!(topic = %topic, "Publish auf unbekanntes Topic");
                0
            }
        }
    }

    /// Gibt die Anzahl aktiver Subscriber eines Topics zurueck
    pub fn subscriber_anzahl(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Entfernt Topics ohne aktive Subscriber
    pub fn topics_aufraeumen(&self) {
        self.inner.topics.retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Gibt die Anzahl bekannter Topics zurueck
    pub fn topic_anzahl(&self) -> usize {
        self.inner.topics.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
