//! Fehlertypen fuer die Matching-Engine
//!
//! `BereitsVermittelt` und `Abgelaufen` sind erwartete, gewoehnliche
//! Ausgaenge des Accept-Races – Aufrufer sollen sie als freundliche
//! "zu spaet"-Hinweise behandeln, nicht als Defekte.

use beistand_db::DbError;
use thiserror::Error;

/// Fehlertyp der Matching-Engine
#[derive(Debug, Error)]
pub enum MatchingError {
    /// Referenzierte Anfrage existiert nicht (mehr)
    #[error("Anfrage nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Anfrage ist abgelaufen
    #[error("Anfrage ist abgelaufen")]
    Abgelaufen,

    /// Ein anderer Akzeptor hat das Race gewonnen
    #[error("Anfrage wurde bereits vermittelt")]
    BereitsVermittelt,

    /// Anfrage wurde bereits abgebrochen oder abgeschlossen
    #[error("Anfrage wurde bereits erledigt")]
    BereitsErledigt,

    /// Aktion ist fuer diesen Benutzer nicht zulaessig
    #[error("Nicht berechtigt: {0}")]
    NichtBerechtigt(String),

    /// Datenbankfehler
    #[error("Datenbankfehler: {0}")]
    Datenbank(#[from] DbError),
}

impl MatchingError {
    /// Gibt true zurueck wenn der Fehler ein erwarteter Race-Ausgang ist
    ///
    /// Solche Fehler verdienen eine Retry-Aufforderung statt eines
    /// generischen Fehlerbanners.
    pub fn ist_race_ausgang(&self) -> bool {
        matches!(
            self,
            Self::BereitsVermittelt | Self::BereitsErledigt | Self::Abgelaufen
        )
    }
}

/// Result-Typ der Matching-Engine
pub type MatchingResult<T> = Result<T, MatchingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_ausgaenge_erkannt() {
        assert!(MatchingError::BereitsVermittelt.ist_race_ausgang());
        assert!(MatchingError::Abgelaufen.ist_race_ausgang());
        assert!(MatchingError::BereitsErledigt.ist_race_ausgang());
        assert!(!MatchingError::NichtGefunden("x".into()).ist_race_ausgang());
    }
}
