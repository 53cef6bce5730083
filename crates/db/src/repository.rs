//! Repository-Trait-Definitionen
//!
//! Das Repository-Pattern entkoppelt die Geschaeftslogik von der konkreten
//! Datenbank-Implementierung. Alle Race-kritischen Uebergaenge geben die
//! Anzahl der tatsaechlich geaenderten Zeilen zurueck, damit Aufrufer
//! verlorene Races erkennen koennen. Alle Methoden liefern `Send`-Futures,
//! damit Aufrufer sie in gespawnte Tasks heben koennen.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{
    AnfrageRecord, NeueAnfrage, NeuerRaumToken, NeuerTeilnehmer, NeuesProfil, ProfilRecord,
    RaumTeilnehmerRecord, RaumTokenRecord,
};

/// Result-Typ fuer alle Repository-Operationen
pub type DbResult<T> = Result<T, DbError>;

/// Repository fuer den Anfragen-Store
///
/// Der Store ist die einzige Quelle der Wahrheit fuer den Anfrage-
/// Lebenszyklus. Ablauf wird lazy gefiltert: Leser pruefen `expires_at`,
/// ein Hintergrund-Sweep ist nicht erforderlich.
pub trait AnfrageRepository: Send + Sync {
    /// Legt eine neue Anfrage mit Status `available` an
    fn create(&self, data: NeueAnfrage<'_>) -> impl Future<Output = DbResult<AnfrageRecord>> + Send;

    /// Laedt eine Anfrage anhand ihrer ID
    fn get(&self, id: Uuid) -> impl Future<Output = DbResult<Option<AnfrageRecord>>> + Send;

    /// Listet offene Anfragen fuer die Discovery
    ///
    /// Filtert `status = 'available'` und `expires_at > now`, schliesst den
    /// eigenen Requester aus und sortiert aelteste zuerst (fairste zuerst).
    fn list_available(
        &self,
        exclude_requester: Option<Uuid>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> impl Future<Output = DbResult<Vec<AnfrageRecord>>> + Send;

    /// Compare-and-Swap: `available -> matched` mit Raum-Bindung
    ///
    /// Gibt die Anzahl geaenderter Zeilen zurueck. 0 bedeutet: ein anderer
    /// Akzeptor (oder ein Cancel) hat das Race gewonnen.
    fn mark_matched(
        &self,
        id: Uuid,
        room_id: &str,
        acceptor_id: Option<Uuid>,
    ) -> impl Future<Output = DbResult<u64>> + Send;

    /// Compare-and-Swap: `available -> completed` (Cancel)
    ///
    /// Gibt 0 zurueck wenn die Anfrage nicht mehr `available` war.
    fn mark_completed_if_available(&self, id: Uuid) -> impl Future<Output = DbResult<u64>> + Send;

    /// Abschluss nach Gespraechsende: `available|matched -> completed`
    ///
    /// Terminale Zustaende bleiben unangetastet (Monotonie).
    fn mark_completed(&self, id: Uuid) -> impl Future<Output = DbResult<u64>> + Send;

    /// Hygiene-Sweep: `available -> expired` fuer abgelaufene Zeilen
    ///
    /// Rein kosmetisch; kein Lesepfad darf sich darauf verlassen.
    fn expire_stale(&self, now: DateTime<Utc>) -> impl Future<Output = DbResult<u64>> + Send;
}

/// Repository fuer das Raum-Teilnahme-Ledger
///
/// Das Ledger ist das Autorisierungs-Gate vor jedem Media-Join.
pub trait TeilnehmerRepository: Send + Sync {
    /// Traegt einen Teilnehmer ein, idempotent auf (room_id, user_id)
    ///
    /// Ein wiederholter Upsert reaktiviert den Eintrag, laesst die
    /// urspruengliche Rolle aber unveraendert.
    fn upsert(&self, data: NeuerTeilnehmer<'_>) -> impl Future<Output = DbResult<()>> + Send;

    /// Laedt einen einzelnen Ledger-Eintrag
    fn get(
        &self,
        room_id: &str,
        user_id: Uuid,
    ) -> impl Future<Output = DbResult<Option<RaumTeilnehmerRecord>>> + Send;

    /// Prueft ob ein aktiver Eintrag fuer (room_id, user_id) existiert
    fn ist_aktiv(&self, room_id: &str, user_id: Uuid) -> impl Future<Output = DbResult<bool>> + Send;

    /// Listet alle aktiven Teilnehmer eines Raums
    fn roster(&self, room_id: &str) -> impl Future<Output = DbResult<Vec<RaumTeilnehmerRecord>>> + Send;

    /// Setzt einen Eintrag inaktiv (Teilnehmer hat den Raum verlassen)
    fn deactivate(&self, room_id: &str, user_id: Uuid) -> impl Future<Output = DbResult<bool>> + Send;
}

/// Repository fuer Profil-Dekoration
///
/// Profile dekorieren Discovery-Zeilen und Roster; sie sind nie Teil der
/// Korrektheitslogik.
pub trait ProfilRepository: Send + Sync {
    /// Legt ein Profil an oder aktualisiert es
    fn upsert_profil(&self, profil: NeuesProfil<'_>) -> impl Future<Output = DbResult<()>> + Send;

    /// Laedt mehrere Profile auf einmal
    fn get_profile(&self, ids: &[Uuid]) -> impl Future<Output = DbResult<Vec<ProfilRecord>>> + Send;
}

/// Repository fuer ausgestellte Raum-Tokens
pub trait RaumTokenRepository: Send + Sync {
    /// Persistiert ein frisch ausgestelltes Token
    fn insert(&self, data: NeuerRaumToken<'_>) -> impl Future<Output = DbResult<RaumTokenRecord>> + Send;

    /// Laedt ein Token anhand seines Werts
    fn get_token(&self, token: &str) -> impl Future<Output = DbResult<Option<RaumTokenRecord>>> + Send;

    /// Entfernt abgelaufene Tokens
    fn purge_expired(&self, now: DateTime<Utc>) -> impl Future<Output = DbResult<u64>> + Send;
}
