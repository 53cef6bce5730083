//! SQLite-Implementierung des AnfrageRepository
//!
//! Die Uebergaenge `mark_matched` und `mark_completed_if_available` sind
//! die Compare-and-Swap-Primitiven des Systems: ein einzelnes UPDATE mit
//! Status-Vorbedingung, dessen Treffzahl dem Aufrufer sagt ob er das Race
//! gewonnen hat.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{AnfrageRecord, NeueAnfrage};
use crate::repository::{AnfrageRepository, DbResult};
use crate::sqlite::pool::{parse_datetime, parse_opt_uuid, parse_uuid, SqliteDb};

impl AnfrageRepository for SqliteDb {
    async fn create(&self, data: NeueAnfrage<'_>) -> DbResult<AnfrageRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO requests
               (id, requester_id, art, status, room_id, acceptor_id, created_at, expires_at)
             VALUES (?, ?, ?, 'available', ?, NULL, ?, ?)",
        )
        .bind(id.to_string())
        .bind(data.requester_id.to_string())
        .bind(data.art.als_str())
        .bind(data.room_id)
        .bind(now.to_rfc3339())
        .bind(data.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AnfrageRecord {
            id,
            requester_id: data.requester_id,
            art: data.art,
            status: crate::models::AnfrageStatus::Available,
            room_id: data.room_id.map(str::to_string),
            acceptor_id: None,
            created_at: now,
            expires_at: data.expires_at,
        })
    }

    async fn get(&self, id: Uuid) -> DbResult<Option<AnfrageRecord>> {
        let row = sqlx::query(
            "SELECT id, requester_id, art, status, room_id, acceptor_id, created_at, expires_at
             FROM requests WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_anfrage(&r)).transpose()
    }

    async fn list_available(
        &self,
        exclude_requester: Option<Uuid>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<Vec<AnfrageRecord>> {
        // Lazy-Ablauffilter: abgelaufene Zeilen bleiben liegen, werden aber
        // nie zurueckgegeben. Aelteste zuerst (fairste zuerst).
        let now_str = now.to_rfc3339();
        let rows = if let Some(requester) = exclude_requester {
            sqlx::query(
                "SELECT id, requester_id, art, status, room_id, acceptor_id, created_at, expires_at
                 FROM requests
                 WHERE status = 'available' AND expires_at > ? AND requester_id != ?
                 ORDER BY created_at ASC
                 LIMIT ?",
            )
            .bind(&now_str)
            .bind(requester.to_string())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, requester_id, art, status, room_id, acceptor_id, created_at, expires_at
                 FROM requests
                 WHERE status = 'available' AND expires_at > ?
                 ORDER BY created_at ASC
                 LIMIT ?",
            )
            .bind(&now_str)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_anfrage).collect()
    }

    async fn mark_matched(
        &self,
        id: Uuid,
        room_id: &str,
        acceptor_id: Option<Uuid>,
    ) -> DbResult<u64> {
        let affected = sqlx::query(
            "UPDATE requests
             SET status = 'matched', room_id = ?, acceptor_id = ?
             WHERE id = ? AND status = 'available'",
        )
        .bind(room_id)
        .bind(acceptor_id.map(|u| u.to_string()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected)
    }

    async fn mark_completed_if_available(&self, id: Uuid) -> DbResult<u64> {
        let affected = sqlx::query(
            "UPDATE requests SET status = 'completed'
             WHERE id = ? AND status = 'available'",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected)
    }

    async fn mark_completed(&self, id: Uuid) -> DbResult<u64> {
        // Terminale Zustaende bleiben unangetastet
        let affected = sqlx::query(
            "UPDATE requests SET status = 'completed'
             WHERE id = ? AND status IN ('available', 'matched')",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected)
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let affected = sqlx::query(
            "UPDATE requests SET status = 'expired'
             WHERE status = 'available' AND expires_at <= ?",
        )
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected)
    }
}

fn row_to_anfrage(row: &sqlx::sqlite::SqliteRow) -> DbResult<AnfrageRecord> {
    let art_str: String = row.try_get("art")?;
    let art = art_str
        .parse()
        .map_err(|e: String| DbError::UngueltigeDaten(e))?;

    let status_str: String = row.try_get("status")?;
    let status = status_str
        .parse()
        .map_err(|e: String| DbError::UngueltigeDaten(e))?;

    Ok(AnfrageRecord {
        id: parse_uuid(row, "id")?,
        requester_id: parse_uuid(row, "requester_id")?,
        art,
        status,
        room_id: row.try_get("room_id")?,
        acceptor_id: parse_opt_uuid(row, "acceptor_id")?,
        created_at: parse_datetime(row, "created_at")?,
        expires_at: parse_datetime(row, "expires_at")?,
    })
}
