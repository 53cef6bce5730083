//! SQLite-Implementierung des RaumTokenRepository

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::error::DbError;
use crate::models::{NeuerRaumToken, RaumTokenRecord};
use crate::repository::{DbResult, RaumTokenRepository};
use crate::sqlite::pool::{parse_datetime, parse_uuid, SqliteDb};

impl RaumTokenRepository for SqliteDb {
    async fn insert(&self, data: NeuerRaumToken<'_>) -> DbResult<RaumTokenRecord> {
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO room_tokens (token, room_id, identity, issued_at, expires_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(data.token)
        .bind(data.room_id)
        .bind(data.identity.to_string())
        .bind(now.to_rfc3339())
        .bind(data.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE") || msg.contains("unique") {
                DbError::Eindeutigkeit("Token-Wert bereits vergeben".into())
            } else {
                DbError::Sqlx(e)
            }
        })?;

        Ok(RaumTokenRecord {
            token: data.token.to_string(),
            room_id: data.room_id.to_string(),
            identity: data.identity,
            issued_at: now,
            expires_at: data.expires_at,
        })
    }

    async fn get_token(&self, token: &str) -> DbResult<Option<RaumTokenRecord>> {
        let row = sqlx::query(
            "SELECT token, room_id, identity, issued_at, expires_at
             FROM room_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(RaumTokenRecord {
                token: r.try_get("token")?,
                room_id: r.try_get("room_id")?,
                identity: parse_uuid(&r, "identity")?,
                issued_at: parse_datetime(&r, "issued_at")?,
                expires_at: parse_datetime(&r, "expires_at")?,
            })
        })
        .transpose()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let affected = sqlx::query("DELETE FROM room_tokens WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }
}
