//! SQLite-Implementierung des TeilnehmerRepository
//!
//! Der Upsert ist idempotent auf dem Konfliktschluessel (room_id, user_id):
//! Wiederholungen reaktivieren den Eintrag, ueberschreiben aber nie die
//! urspruengliche Rolle. So bleibt ein Host ein Host, auch wenn ein
//! spaeterer Join ihn als Participant eintragen wollte.

use sqlx::Row;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{NeuerTeilnehmer, RaumTeilnehmerRecord};
use crate::repository::{DbResult, TeilnehmerRepository};
use crate::sqlite::pool::{parse_datetime, parse_uuid, SqliteDb};

impl TeilnehmerRepository for SqliteDb {
    async fn upsert(&self, data: NeuerTeilnehmer<'_>) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO room_participants (room_id, user_id, role, active, joined_at)
             VALUES (?, ?, ?, 1, ?)
             ON CONFLICT (room_id, user_id) DO UPDATE SET active = 1",
        )
        .bind(data.room_id)
        .bind(data.user_id.to_string())
        .bind(data.role.als_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, room_id: &str, user_id: Uuid) -> DbResult<Option<RaumTeilnehmerRecord>> {
        let row = sqlx::query(
            "SELECT room_id, user_id, role, active, joined_at
             FROM room_participants WHERE room_id = ? AND user_id = ?",
        )
        .bind(room_id)
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_teilnehmer(&r)).transpose()
    }

    async fn ist_aktiv(&self, room_id: &str, user_id: Uuid) -> DbResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM room_participants
             WHERE room_id = ? AND user_id = ? AND active = 1",
        )
        .bind(room_id)
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn roster(&self, room_id: &str) -> DbResult<Vec<RaumTeilnehmerRecord>> {
        let rows = sqlx::query(
            "SELECT room_id, user_id, role, active, joined_at
             FROM room_participants
             WHERE room_id = ? AND active = 1
             ORDER BY joined_at ASC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_teilnehmer).collect()
    }

    async fn deactivate(&self, room_id: &str, user_id: Uuid) -> DbResult<bool> {
        let affected = sqlx::query(
            "UPDATE room_participants SET active = 0
             WHERE room_id = ? AND user_id = ? AND active = 1",
        )
        .bind(room_id)
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }
}

fn row_to_teilnehmer(row: &sqlx::sqlite::SqliteRow) -> DbResult<RaumTeilnehmerRecord> {
    let role_str: String = row.try_get("role")?;
    let role = role_str
        .parse()
        .map_err(|e: String| DbError::UngueltigeDaten(e))?;

    let active: i64 = row.try_get("active")?;

    Ok(RaumTeilnehmerRecord {
        room_id: row.try_get("room_id")?,
        user_id: parse_uuid(row, "user_id")?,
        role,
        active: active != 0,
        joined_at: parse_datetime(row, "joined_at")?,
    })
}
