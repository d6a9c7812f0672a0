use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::application::use_cases::chat::ChatRepo;
use crate::domain::entities::chat::{ChatMessage, ChatSession};

use super::PostgresPersistence;

const SESSION_COLS: &str = "uuid, user_id, title, created_at, updated_at";
const MESSAGE_COLS: &str = "id, chat_session_uuid, user_id, prompt, response, created_at";

fn row_to_session(row: &PgRow) -> ChatSession {
    ChatSession {
        uuid: row.get("uuid"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_message(row: &PgRow) -> ChatMessage {
    ChatMessage {
        id: row.get("id"),
        chat_session_uuid: row.get("chat_session_uuid"),
        user_id: row.get("user_id"),
        prompt: row.get("prompt"),
        response: row.get("response"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ChatRepo for PostgresPersistence {
    async fn create_session(
        &self,
        user_id: Uuid,
        uuid: Uuid,
        title: &str,
    ) -> AppResult<ChatSession> {
        let row = sqlx::query(&format!(
            "INSERT INTO chat_sessions (uuid, user_id, title) VALUES ($1, $2, $3) \
             RETURNING {SESSION_COLS}"
        ))
        .bind(uuid)
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_session(&row))
    }

    async fn session(&self, uuid: Uuid) -> AppResult<Option<ChatSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLS} FROM chat_sessions WHERE uuid = $1"
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn list_sessions(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<ChatSession>> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLS} FROM chat_sessions WHERE user_id = $1 \
             ORDER BY updated_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_session).collect())
    }

    async fn messages(&self, session_uuid: Uuid, limit: i64) -> AppResult<Vec<ChatMessage>> {
        // Newest N picked by the inner query, flipped back to oldest first.
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLS} FROM ( \
               SELECT {MESSAGE_COLS} FROM chat_messages \
               WHERE chat_session_uuid = $1 \
               ORDER BY created_at DESC LIMIT $2 \
             ) AS recent ORDER BY created_at ASC"
        ))
        .bind(session_uuid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_message).collect())
    }

    async fn save_message(
        &self,
        user_id: Uuid,
        session_uuid: Uuid,
        prompt: &str,
        response: &str,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO chat_messages (id, chat_session_uuid, user_id, prompt, response) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(session_uuid)
        .bind(user_id)
        .bind(prompt)
        .bind(response)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE chat_sessions SET updated_at = CURRENT_TIMESTAMP WHERE uuid = $1")
            .bind(session_uuid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
