//! beistand-signaling – Broadcast-Hub und Einladungs-Waechter
//!
//! Dieser Crate implementiert die ephemere Signalisierungs-Schicht:
//!
//! ```text
//! BroadcastHub
//!     |  benannte Topics, at-most-once, keine Persistenz
//!     +-- Lobby-Topic "calls"        (alle interessierten Clients)
//!     +-- Privat-Topic "user:<id>"   (direkte Einladungen, Navigation)
//!
//! EinladungsWaechter
//!     |  Polling gegen den Anfragen-Store (dauerhafter Fallback)
//!     |  + Privat-Topic als Latenz-Abkuerzung
//!     v
//! Einladungs-Karten mit clientseitigem Selbstablauf
//! ```
//!
//! Der Hub ist bewusst NICHT die Quelle der Wahrheit: getrennte
//! Subscriber verpassen Nachrichten stillschweigend. Jeder Broadcast-
//! getriebene Fluss hat deshalb einen Polling-Fallback gegen den Store.

pub mod broadcast;
pub mod error;
pub mod events;
pub mod notify;

// Bequeme Re-Exporte
pub use broadcast::BroadcastHub;
pub use error::{SignalingError, SignalingResult};
pub use events::{user_topic, CallEvent, LOBBY_TOPIC};
pub use notify::{EinladungsKarte, EinladungsWaechter};
