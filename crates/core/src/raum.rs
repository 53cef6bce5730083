//! Raumnamen – Erzeugung und Newtype
//!
//! Raumnamen sind sprechende Strings, keine UUIDs: sie tragen ein Praefix
//! je Anrufart, einen Zeitstempel und ein zufaelliges Suffix. Das Format
//! ist Teil der Kompatibilitaet mit bestehenden Clients und darf nicht
//! veraendert werden:
//!
//! - Direktanruf:  `quick-connect-<millis>-<suffix>`
//! - Gruppenanruf: `group-call-<millis>-<suffix>`

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Laenge des zufaelligen Suffix
const SUFFIX_LAENGE: usize = 9;

/// Zeichenvorrat fuer das Suffix (an JS `toString(36)` angelehnt)
const SUFFIX_ZEICHEN: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Eindeutiger Raumname
///
/// Newtype um String, damit Raumnamen nicht mit beliebigen Strings
/// verwechselt werden koennen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaumId(pub String);

impl RaumId {
    /// Gibt den inneren Namen zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prueft ob der Raum zu einem Gruppenanruf gehoert
    pub fn ist_gruppenraum(&self) -> bool {
        self.0.starts_with("group-call-")
    }
}

impl From<String> for RaumId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RaumId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Erzeugt einen Raumnamen fuer einen Direktanruf
pub fn quick_connect_raum_name() -> RaumId {
    RaumId(format!("quick-connect-{}-{}", epoch_millis(), suffix()))
}

/// Erzeugt einen Raumnamen fuer einen Gruppenanruf
pub fn gruppen_raum_name() -> RaumId {
    RaumId(format!("group-call-{}-{}", epoch_millis(), suffix()))
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LAENGE)
        .map(|_| {
            let idx = rng.random_range(0..SUFFIX_ZEICHEN.len());
            SUFFIX_ZEICHEN[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_connect_format() {
        let raum = quick_connect_raum_name();
        assert!(raum.as_str().starts_with("quick-connect-"));
        assert!(!raum.ist_gruppenraum());

        let teile: Vec<&str> = raum.as_str().splitn(4, '-').collect();
        assert_eq!(teile.len(), 4);
        assert_eq!(teile[3].len(), SUFFIX_LAENGE);
    }

    #[test]
    fn gruppen_format() {
        let raum = gruppen_raum_name();
        assert!(raum.as_str().starts_with("group-call-"));
        assert!(raum.ist_gruppenraum());
    }

    #[test]
    fn raumnamen_eindeutig() {
        let a = quick_connect_raum_name();
        let b = quick_connect_raum_name();
        assert_ne!(a, b, "Suffix muss Kollisionen im selben Millisekundenfenster abfangen");
    }
}
