use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleName {
    Admin,
    User,
    Moderator,
    Support,
}

impl RoleName {
    pub const ALL: [RoleName; 4] = [
        RoleName::Admin,
        RoleName::User,
        RoleName::Moderator,
        RoleName::Support,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Admin => "admin",
            RoleName::User => "user",
            RoleName::Moderator => "moderator",
            RoleName::Support => "support",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(RoleName::Admin),
            "user" => Some(RoleName::User),
            "moderator" => Some(RoleName::Moderator),
            "support" => Some(RoleName::Support),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: NaiveDateTime,
}
