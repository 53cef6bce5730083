//! SQLite Connection Pool mit WAL-Modus

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use crate::error::DbError;

/// Wrapper um den SQLite Connection Pool
#[derive(Debug, Clone)]
pub struct SqliteDb {
    pub(crate) pool: SqlitePool,
}

impl SqliteDb {
    /// Erstellt einen neuen Pool, fuehrt Migrationen aus
    pub async fn oeffnen(url: &str, max_verbindungen: u32) -> Result<Self, DbError> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_verbindungen)
            .connect_with(opts)
            .await?;

        info!(url = %url, "SQLite-Pool geoeffnet");

        let db = Self { pool };
        db.migrationen_ausfuehren().await?;

        Ok(db)
    }

    /// Fuehrt alle ausstehenden Migrationen aus
    pub async fn migrationen_ausfuehren(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Datenbank-Migrationen abgeschlossen");
        Ok(())
    }

    /// Gibt den internen Pool zurueck (fuer Tests)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Erstellt eine In-Memory-Datenbank fuer Tests
    pub async fn in_memory() -> Result<Self, DbError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            // In-Memory benoetigt mindestens 1 persistente Verbindung
            .min_connections(1)
            .connect_with(opts)
            .await?;

        let db = Self { pool };
        db.migrationen_ausfuehren().await?;
        Ok(db)
    }
}

// ---------------------------------------------------------------------------
// Row-Parsing-Hilfen (geteilt von den Repository-Implementierungen)
// ---------------------------------------------------------------------------

/// Liest eine Pflicht-UUID-Spalte
pub(crate) fn parse_uuid(row: &sqlx::sqlite::SqliteRow, spalte: &str) -> Result<uuid::Uuid, DbError> {
    let s: String = row.try_get(spalte)?;
    uuid::Uuid::parse_str(&s)
        .map_err(|e| DbError::intern(format!("Ungueltige UUID in '{spalte}': {e}")))
}

/// Liest eine optionale UUID-Spalte
pub(crate) fn parse_opt_uuid(
    row: &sqlx::sqlite::SqliteRow,
    spalte: &str,
) -> Result<Option<uuid::Uuid>, DbError> {
    let s: Option<String> = row.try_get(spalte)?;
    s.map(|s| {
        uuid::Uuid::parse_str(&s)
            .map_err(|e| DbError::intern(format!("Ungueltige UUID in '{spalte}': {e}")))
    })
    .transpose()
}

/// Liest eine Pflicht-Zeitstempel-Spalte (RFC3339-Text)
pub(crate) fn parse_datetime(
    row: &sqlx::sqlite::SqliteRow,
    spalte: &str,
) -> Result<chrono::DateTime<chrono::Utc>, DbError> {
    let s: String = row.try_get(spalte)?;
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| DbError::intern(format!("Ungueltiger Zeitstempel in '{spalte}': {e}")))
}
