//! beistand-db – Datenbank-Abstraktion
//!
//! Dieses Crate stellt das Repository-Pattern fuer den Anfragen-Store,
//! das Raum-Teilnahme-Ledger, die Profil-Dekoration und die Raum-Tokens
//! bereit. Die Repositories sind als Traits definiert und fuer SQLite
//! (WAL-Pool, In-Memory fuer Tests) implementiert.
//!
//! Der Anfragen-Store ist die einzige Quelle der Wahrheit fuer den
//! Anruf-Lebenszyklus; alle Race-kritischen Uebergaenge laufen ueber
//! bedingte Updates deren Treffzahl zurueckgegeben wird
//! (Compare-and-Swap auf `status = 'available'`).

pub mod error;
pub mod models;
pub mod repository;
pub mod sqlite;

// Bequeme Re-Exporte
pub use error::DbError;
pub use repository::{
    AnfrageRepository, DbResult, ProfilRepository, RaumTokenRepository, TeilnehmerRepository,
};
pub use sqlite::SqliteDb;
