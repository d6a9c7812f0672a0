use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Inactive,
    Pending,
    Active,
    PastDue,
    Canceled,
    Trial,
    Completed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Completed => "completed",
        }
    }

    /// Unknown values map to `Inactive` rather than failing the row read.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => SubscriptionStatus::Pending,
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "trial" => SubscriptionStatus::Trial,
            "completed" => SubscriptionStatus::Completed,
            _ => SubscriptionStatus::Inactive,
        }
    }
}

/// Access rule: the status must be `active` and the paid period must not
/// have elapsed. A missing period end means "no known end" and passes.
pub fn has_active_subscription(
    status: SubscriptionStatus,
    current_period_end: Option<NaiveDateTime>,
) -> bool {
    if status != SubscriptionStatus::Active {
        return false;
    }
    match current_period_end {
        Some(end) => end > Utc::now().naive_utc(),
        None => true,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway_subscription_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub current_period_start: NaiveDateTime,
    pub current_period_end: NaiveDateTime,
    pub cancel_at_period_end: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
