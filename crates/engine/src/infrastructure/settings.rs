//! SQLite-backed settings storage.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::infrastructure::app_settings::AppSettings;
use crate::infrastructure::ports::{ClockPort, RepoError, SettingsRepo};

/// SQLite implementation for application settings storage.
///
/// A single global row holds the JSON blob; reads happen on every
/// conversion attempt, which SQLite serves comfortably.
pub struct SqliteSettingsRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteSettingsRepo {
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("settings", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_settings (
                scope TEXT NOT NULL PRIMARY KEY,
                settings_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("settings", e))?;

        Ok(Self { pool, clock })
    }
}

#[async_trait]
impl SettingsRepo for SqliteSettingsRepo {
    async fn get(&self) -> Result<Option<AppSettings>, RepoError> {
        let row = sqlx::query("SELECT settings_json FROM app_settings WHERE scope = 'global'")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("settings", e))?;

        match row {
            Some(row) => {
                let json: String = row.get("settings_json");
                let settings = serde_json::from_str(&json)
                    .map_err(|e| RepoError::Serialization(e.to_string()))?;
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, settings: &AppSettings) -> Result<(), RepoError> {
        let json =
            serde_json::to_string(settings).map_err(|e| RepoError::Serialization(e.to_string()))?;
        let now = self.clock.now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO app_settings (scope, settings_json, updated_at)
            VALUES ('global', ?, ?)
            ON CONFLICT(scope) DO UPDATE SET
                settings_json = excluded.settings_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("settings", e))?;

        Ok(())
    }
}
