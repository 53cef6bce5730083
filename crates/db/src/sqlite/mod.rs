//! SQLite-Backend-Implementierungen fuer alle Repository-Traits

pub mod anfragen;
pub mod pool;
pub mod profile;
pub mod teilnehmer;
pub mod tokens;

pub use pool::SqliteDb;
