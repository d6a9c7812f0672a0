use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_error::AppResult;

pub const SESSION_TTL_HOURS: i64 = 24;
pub const SESSION_COOKIE: &str = "emshi_session";

/// Server-side session state. Serialized as JSON into the store; cookies
/// only ever carry the opaque token.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash_success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash_error: Option<String>,
    /// Where to send the user after the next successful login, e.g. the
    /// URI a subscription gate turned them away from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

impl SessionBag {
    pub fn is_empty(&self) -> bool {
        *self == SessionBag::default()
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the bag for a live session; expired rows read as absent.
    async fn load(&self, token_hash: &str, now: NaiveDateTime) -> AppResult<Option<SessionBag>>;
    async fn create(
        &self,
        token_hash: &str,
        bag: &SessionBag,
        expires_at: NaiveDateTime,
    ) -> AppResult<()>;
    async fn update(&self, token_hash: &str, bag: &SessionBag) -> AppResult<()>;
    async fn delete(&self, token_hash: &str) -> AppResult<()>;
    async fn delete_expired(&self, now: NaiveDateTime) -> AppResult<u64>;
}
