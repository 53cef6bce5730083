//! SQLite-Implementierung des ProfilRepository

use sqlx::Row;
use uuid::Uuid;

use crate::models::{NeuesProfil, ProfilRecord};
use crate::repository::{DbResult, ProfilRepository};
use crate::sqlite::pool::{parse_uuid, SqliteDb};

impl ProfilRepository for SqliteDb {
    async fn upsert_profil(&self, profil: NeuesProfil<'_>) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO profiles (user_id, display_name, avatar_url)
             VALUES (?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE
             SET display_name = excluded.display_name, avatar_url = excluded.avatar_url",
        )
        .bind(profil.user_id.to_string())
        .bind(profil.display_name)
        .bind(profil.avatar_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_profile(&self, ids: &[Uuid]) -> DbResult<Vec<ProfilRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // SQLite kennt keine Array-Binds; Platzhalterliste von Hand bauen
        let platzhalter = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT user_id, display_name, avatar_url
             FROM profiles WHERE user_id IN ({platzhalter})"
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(ProfilRecord {
                    user_id: parse_uuid(row, "user_id")?,
                    display_name: row.try_get("display_name")?,
                    avatar_url: row.try_get("avatar_url")?,
                })
            })
            .collect()
    }
}
