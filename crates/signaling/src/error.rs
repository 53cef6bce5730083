//! Fehlertypen fuer die Signalisierungs-Schicht

use beistand_db::DbError;
use thiserror::Error;

/// Fehlertyp der Signalisierungs-Schicht
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Datenbankfehler beim Polling-Fallback
    #[error("Datenbankfehler: {0}")]
    Datenbank(#[from] DbError),

    /// Eine andere Aktion ist bereits in Arbeit (Doppelklick-Schutz)
    #[error("Aktion bereits in Arbeit")]
    AktionInArbeit,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Typ der Signalisierungs-Schicht
pub type SignalingResult<T> = Result<T, SignalingError>;
