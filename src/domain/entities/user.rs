use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entities::role::RoleName;
use crate::domain::entities::subscription::{SubscriptionStatus, has_active_subscription};

/// Full user row as the application sees it. Secret columns (password hash,
/// verification tokens) never leave the persistence layer.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub birthday: String,
    pub role_name: Option<RoleName>,
    pub tts_enabled_default: Option<bool>,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,
    #[serde(skip)]
    pub subscription_id: Option<String>,
    #[serde(skip)]
    pub customer_id: Option<String>,
    pub subscription_status: SubscriptionStatus,
    #[serde(skip)]
    pub subscription_end_date: Option<NaiveDateTime>,
    pub current_period_end: Option<NaiveDateTime>,
    #[serde(skip)]
    pub tokens_used_input_this_period: i64,
    #[serde(skip)]
    pub tokens_used_output_this_period: i64,
    #[serde(skip)]
    pub billing_cycle_anchor: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role_name == Some(RoleName::Admin)
    }

    pub fn has_active_subscription(&self) -> bool {
        has_active_subscription(self.subscription_status, self.current_period_end)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Input for creating a user; all fields already validated and sanitized.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub birthday: String,
}
