use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure, keyed by the form field name.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Too many requests. Please slow down.")]
    RateLimited,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email address is not verified")]
    EmailNotVerified,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Active subscription required")]
    SubscriptionRequired,

    #[error("Monthly usage limit exceeded")]
    QuotaExceeded {
        /// End of the current paid period, when known; shown to the user
        /// as the date the limit resets.
        period_end: Option<NaiveDateTime>,
    },

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    RateLimited,
    InvalidCredentials,
    EmailNotVerified,
    Unauthorized,
    Forbidden,
    SubscriptionRequired,
    QuotaExceeded,
    ValidationFailed,
    InvalidInput,
    NotFound,
    UpstreamError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::SubscriptionRequired => "SUBSCRIPTION_REQUIRED",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UpstreamError => "UPSTREAM_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            let constraint = db_err.constraint().unwrap_or_default();
            if constraint.contains("email") {
                return AppError::Validation(vec![FieldError::new(
                    "email",
                    "Этот email уже зарегистрирован.",
                )]);
            }
            if constraint.contains("phone") {
                return AppError::Validation(vec![FieldError::new(
                    "phone",
                    "Этот номер телефона уже зарегистрирован.",
                )]);
            }
            return AppError::InvalidInput("duplicate value".into());
        }
        AppError::Database(e.to_string())
    }
}
