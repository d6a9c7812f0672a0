use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::Row;

use crate::app_error::{AppError, AppResult};
use crate::application::session::{SessionBag, SessionStore};

use super::PostgresPersistence;

#[async_trait]
impl SessionStore for PostgresPersistence {
    async fn load(
        &self,
        token_hash: &str,
        now: NaiveDateTime,
    ) -> AppResult<Option<SessionBag>> {
        let row = sqlx::query(
            "SELECT data FROM sessions WHERE token_hash = $1 AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            let data: serde_json::Value = r.get("data");
            serde_json::from_value(data)
                .map_err(|e| AppError::Internal(format!("corrupt session payload: {e}")))
        })
        .transpose()
    }

    async fn create(
        &self,
        token_hash: &str,
        bag: &SessionBag,
        expires_at: NaiveDateTime,
    ) -> AppResult<()> {
        let data = serde_json::to_value(bag)
            .map_err(|e| AppError::Internal(format!("session serialization failed: {e}")))?;
        sqlx::query(
            "INSERT INTO sessions (token_hash, data, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (token_hash) DO UPDATE SET data = $2, expires_at = $3",
        )
        .bind(token_hash)
        .bind(data)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, token_hash: &str, bag: &SessionBag) -> AppResult<()> {
        let data = serde_json::to_value(bag)
            .map_err(|e| AppError::Internal(format!("session serialization failed: {e}")))?;
        sqlx::query("UPDATE sessions SET data = $2 WHERE token_hash = $1")
            .bind(token_hash)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, token_hash: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: NaiveDateTime) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
