//! beistand-matching – Matching-Engine und Raum-Ledger
//!
//! Dieses Crate implementiert den Lebenszyklus einer Anruf-Anfrage:
//! Erstellen, Entdecken, Annehmen, Abbrechen, Abschliessen, Ablauf.
//!
//! ## Architektur
//!
//! ```text
//! MatchingService
//!     |  Direktanruf:  create -> discover -> accept (CAS) -> Raum-Bindung
//!     |  Gruppenanruf: create bindet Raum sofort, Host betritt zuerst
//!     v
//! AnfrageRepository (Quelle der Wahrheit, Compare-and-Swap)
//!
//! RaumLedger
//!     |  upsert idempotent, authorize als Gate vor jedem Media-Join
//!     v
//! TeilnehmerRepository
//! ```
//!
//! Alle Race-Aufloesung passiert ausschliesslich im Store: verlorene
//! Accepts und Cancels werden als gewoehnliche, typisierte Ergebnisse
//! gemeldet, nie als Panik oder stilles Nichtstun.

pub mod error;
pub mod ledger;
pub mod service;

// Bequeme Re-Exporte
pub use error::{MatchingError, MatchingResult};
pub use ledger::{RaumLedger, RosterEintrag};
pub use service::{AngenommenerAnruf, MatchingService, OffeneAnfrage};
