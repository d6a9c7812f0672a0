use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub uuid: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub title: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_session_uuid: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub prompt: String,
    pub response: String,
    pub created_at: NaiveDateTime,
}
