use crate::app_error::{AppError, ErrorCode, FieldError};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        tracing::error!(error = ?self, "Request failed");

        match self {
            AppError::Database(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DatabaseError, None)
            }
            AppError::RateLimited => {
                error_resp(StatusCode::TOO_MANY_REQUESTS, ErrorCode::RateLimited, None)
            }
            AppError::InvalidCredentials => {
                error_resp(StatusCode::UNAUTHORIZED, ErrorCode::InvalidCredentials, None)
            }
            AppError::EmailNotVerified => error_resp(
                StatusCode::UNAUTHORIZED,
                ErrorCode::EmailNotVerified,
                Some("Подтвердите ваш email, чтобы войти.".into()),
            ),
            AppError::Unauthorized => {
                error_resp(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, None)
            }
            AppError::Forbidden => error_resp(StatusCode::FORBIDDEN, ErrorCode::Forbidden, None),
            AppError::SubscriptionRequired => error_resp(
                StatusCode::FORBIDDEN,
                ErrorCode::SubscriptionRequired,
                Some("Для доступа к этой функции требуется активная подписка.".into()),
            ),
            AppError::QuotaExceeded { period_end } => {
                let message = match period_end {
                    Some(end) => format!(
                        "Вы превысили месячный лимит использования. \
                         Лимит обновится {}.",
                        end.format("%d.%m.%Y")
                    ),
                    None => "Вы превысили месячный лимит использования. \
                             Лимит обновится после следующего платежа."
                        .to_string(),
                };
                error_resp(StatusCode::FORBIDDEN, ErrorCode::QuotaExceeded, Some(message))
            }
            AppError::Validation(fields) => validation_resp(fields),
            AppError::InvalidInput(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, Some(msg))
            }
            AppError::NotFound => error_resp(StatusCode::NOT_FOUND, ErrorCode::NotFound, None),
            AppError::Upstream(_) => {
                error_resp(StatusCode::BAD_GATEWAY, ErrorCode::UpstreamError, None)
            }
            AppError::Internal(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError, None)
            }
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}

fn validation_resp(fields: Vec<FieldError>) -> Response {
    let body = serde_json::json!({
        "code": ErrorCode::ValidationFailed.as_str(),
        "fields": fields,
    });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}
