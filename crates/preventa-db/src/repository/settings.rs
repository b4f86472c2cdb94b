//! # Settings Repository
//!
//! Small key/value device settings. The Sync Engine keeps `last_sync` here.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::warn;

use crate::error::DbResult;

/// Key of the last fully successful sync timestamp.
pub const LAST_SYNC_KEY: &str = "last_sync";

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Timestamp of the last sync that finished without errors.
    pub async fn last_sync(&self) -> DbResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.get(LAST_SYNC_KEY).await? else {
            return Ok(None);
        };

        match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring unparseable last_sync");
                Ok(None)
            }
        }
    }

    pub async fn set_last_sync(&self, at: DateTime<Utc>) -> DbResult<()> {
        self.set(LAST_SYNC_KEY, &at.to_rfc3339()).await
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_last_sync_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = db.settings();
        assert!(settings.last_sync().await.unwrap().is_none());

        let at = Utc.with_ymd_and_hms(2024, 5, 10, 18, 30, 0).unwrap();
        settings.set_last_sync(at).await.unwrap();
        assert_eq!(settings.last_sync().await.unwrap(), Some(at));

        settings.set("last_sync", "garbage").await.unwrap();
        assert!(settings.last_sync().await.unwrap().is_none());
    }
}
