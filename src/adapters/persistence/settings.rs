use async_trait::async_trait;
use sqlx::Row;

use crate::app_error::AppResult;
use crate::application::use_cases::admin::SettingsRepo;

use super::PostgresPersistence;

#[async_trait]
impl SettingsRepo for PostgresPersistence {
    async fn all(&self) -> AppResult<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("key"), r.get("value")))
            .collect())
    }

    async fn upsert(&self, key: &str, value: &str) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
