//! Datenbankmodelle fuer Beistand
//!
//! Diese Typen repraesentieren Datensaetze aus der Datenbank.
//! Die String-Repraesentationen von `art`, `status` und `role` sind
//! Wire-Format und duerfen nicht veraendert werden.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Anfragen
// ---------------------------------------------------------------------------

/// Art einer Anruf-Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnfrageArt {
    Direct,
    Group,
}

impl AnfrageArt {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

impl std::str::FromStr for AnfrageArt {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "group" => Ok(Self::Group),
            other => Err(format!("Unbekannte Anfrage-Art: {other}")),
        }
    }
}

/// Status einer Anruf-Anfrage
///
/// Uebergaenge sind monoton: `available -> matched -> completed` oder
/// `available -> expired`/`completed`. Terminale Zustaende werden nie
/// wieder verlassen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnfrageStatus {
    Available,
    Matched,
    Completed,
    Expired,
}

impl AnfrageStatus {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Matched => "matched",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    /// Gibt true zurueck wenn der Status terminal ist
    pub fn ist_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }
}

impl std::str::FromStr for AnfrageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "matched" => Ok(Self::Matched),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            other => Err(format!("Unbekannter Anfrage-Status: {other}")),
        }
    }
}

/// Anfrage-Datensatz aus der Datenbank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnfrageRecord {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub art: AnfrageArt,
    pub status: AnfrageStatus,
    pub room_id: Option<String>,
    pub acceptor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AnfrageRecord {
    /// Prueft ob die Anfrage zum Zeitpunkt `now` abgelaufen ist
    pub fn ist_abgelaufen(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Daten zum Erstellen einer neuen Anfrage
#[derive(Debug, Clone)]
pub struct NeueAnfrage<'a> {
    pub requester_id: Uuid,
    pub art: AnfrageArt,
    /// Nur bei Gruppenanfragen bereits zur Erstellung gesetzt
    pub room_id: Option<&'a str>,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Raum-Teilnehmer (Ledger)
// ---------------------------------------------------------------------------

/// Rolle eines Raum-Teilnehmers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeilnehmerRolle {
    Host,
    Participant,
}

impl TeilnehmerRolle {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Participant => "participant",
        }
    }
}

impl std::str::FromStr for TeilnehmerRolle {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Self::Host),
            "participant" => Ok(Self::Participant),
            other => Err(format!("Unbekannte Teilnehmer-Rolle: {other}")),
        }
    }
}

/// Teilnehmer-Datensatz aus dem Raum-Ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaumTeilnehmerRecord {
    pub room_id: String,
    pub user_id: Uuid,
    pub role: TeilnehmerRolle,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
}

/// Daten zum Eintragen eines Raum-Teilnehmers
#[derive(Debug, Clone)]
pub struct NeuerTeilnehmer<'a> {
    pub room_id: &'a str,
    pub user_id: Uuid,
    pub role: TeilnehmerRolle,
}

// ---------------------------------------------------------------------------
// Profile (nur Dekoration, nie Korrektheit)
// ---------------------------------------------------------------------------

/// Profil-Datensatz fuer die Anzeige
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilRecord {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Daten zum Anlegen/Aktualisieren eines Profils
#[derive(Debug, Clone)]
pub struct NeuesProfil<'a> {
    pub user_id: Uuid,
    pub display_name: &'a str,
    pub avatar_url: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Raum-Tokens
// ---------------------------------------------------------------------------

/// Ausgestelltes Zugangs-Token fuer einen Raum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaumTokenRecord {
    pub token: String,
    pub room_id: String,
    pub identity: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RaumTokenRecord {
    /// Gibt true zurueck wenn das Token zum Zeitpunkt `now` noch gueltig ist
    pub fn ist_gueltig(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Daten zum Ausstellen eines Raum-Tokens
#[derive(Debug, Clone)]
pub struct NeuerRaumToken<'a> {
    pub token: &'a str,
    pub room_id: &'a str,
    pub identity: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn status_strings_stabil() {
        assert_eq!(AnfrageStatus::Available.als_str(), "available");
        assert_eq!(AnfrageStatus::Matched.als_str(), "matched");
        assert_eq!(AnfrageStatus::Completed.als_str(), "completed");
        assert_eq!(AnfrageStatus::Expired.als_str(), "expired");
    }

    #[test]
    fn status_terminal_erkennung() {
        assert!(!AnfrageStatus::Available.ist_terminal());
        assert!(!AnfrageStatus::Matched.ist_terminal());
        assert!(AnfrageStatus::Completed.ist_terminal());
        assert!(AnfrageStatus::Expired.ist_terminal());
    }

    #[test]
    fn anfrage_ablauf_pruefung() {
        let now = Utc::now();
        let record = AnfrageRecord {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            art: AnfrageArt::Direct,
            status: AnfrageStatus::Available,
            room_id: None,
            acceptor_id: None,
            created_at: now,
            expires_at: now + Duration::minutes(10),
        };
        assert!(!record.ist_abgelaufen(now));
        assert!(record.ist_abgelaufen(now + Duration::minutes(11)));
    }

    #[test]
    fn rollen_roundtrip() {
        for rolle in [TeilnehmerRolle::Host, TeilnehmerRolle::Participant] {
            let s = rolle.als_str();
            assert_eq!(s.parse::<TeilnehmerRolle>().unwrap(), rolle);
        }
    }
}
