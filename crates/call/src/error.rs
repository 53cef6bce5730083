//! Fehlertypen der Anruf-Schicht

use beistand_db::DbError;
use thiserror::Error;

/// Fehlertyp der Anruf-Schicht
#[derive(Debug, Error)]
pub enum CallError {
    /// Der Token-Dienst hat kein Zugangs-Token geliefert
    #[error("Token-Abruf fehlgeschlagen: {0}")]
    TokenAbruf(String),

    /// Die Medien-Sitzung konnte nicht aufgebaut werden
    #[error("Medien-Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    /// Operation passt nicht zur aktuellen Phase der Zustandsmaschine
    #[error("Ungueltiger Zustand: {0}")]
    UngueltigerZustand(String),

    /// Datenbankfehler beim Abschliessen der Anfrage
    #[error("Datenbankfehler: {0}")]
    Datenbank(#[from] DbError),
}

impl CallError {
    /// Erstellt einen Zustandsfehler
    pub fn ungueltiger_zustand(msg: impl Into<String>) -> Self {
        Self::UngueltigerZustand(msg.into())
    }
}

/// Result-Typ der Anruf-Schicht
pub type CallResult<T> = Result<T, CallError>;
