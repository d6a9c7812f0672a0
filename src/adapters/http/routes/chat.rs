use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::{
        app_state::AppState,
        middleware::{CurrentUser, check_token_quota, require_active_subscription},
    },
    app_error::{AppError, AppResult},
    application::use_cases::chat::{Attachment, MAX_UPLOAD_BYTES},
    domain::entities::chat::{ChatMessage, ChatSession},
};

pub fn router(app_state: AppState) -> Router<AppState> {
    let dialogue_routes = Router::new()
        .route("/dialogue", post(dialogue))
        // Upload cap plus headroom for the multipart framing.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
        .route_layer(from_fn_with_state(app_state, check_token_quota));

    Router::new()
        .route("/chat_session_create", post(create_session))
        .route("/chat_sessions", get(list_sessions))
        .route("/chat_session_messages", get(session_messages))
        .merge(dialogue_routes)
        .route_layer(from_fn(require_active_subscription))
}

async fn create_session(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<ChatSession>> {
    let session = app_state.chat_use_cases.create_session(user.id).await?;
    Ok(Json(session))
}

async fn list_sessions(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<Vec<ChatSession>>> {
    let sessions = app_state.chat_use_cases.list_sessions(user.id).await?;
    Ok(Json(sessions))
}

#[derive(Deserialize)]
struct SessionMessagesQuery {
    uuid: Uuid,
}

async fn session_messages(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<SessionMessagesQuery>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    let messages = app_state
        .chat_use_cases
        .session_messages(user.id, query.uuid)
        .await?;
    Ok(Json(messages))
}

#[derive(Serialize)]
struct DialogueResponse {
    response: String,
}

/// Multipart body: `prompt` and `session_uuid` text fields plus an
/// optional `file` part.
async fn dialogue(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> AppResult<Json<DialogueResponse>> {
    let mut prompt = None;
    let mut session_uuid = None;
    let mut attachment = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("prompt") => {
                prompt = Some(field.text().await.map_err(|e| {
                    AppError::InvalidInput(format!("invalid prompt field: {e}"))
                })?);
            }
            Some("session_uuid") => {
                let raw = field.text().await.map_err(|e| {
                    AppError::InvalidInput(format!("invalid session_uuid field: {e}"))
                })?;
                session_uuid = Some(Uuid::parse_str(raw.trim()).map_err(|_| {
                    AppError::InvalidInput("session_uuid не является корректным UUID.".into())
                })?);
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::InvalidInput(format!("failed to read uploaded file: {e}"))
                })?;
                if !bytes.is_empty() {
                    attachment = Some(Attachment {
                        filename,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    let prompt = prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Введите сообщение.".into()))?;
    let session_uuid = session_uuid
        .ok_or_else(|| AppError::InvalidInput("Не указан идентификатор диалога.".into()))?;

    let response = app_state
        .chat_use_cases
        .dialogue(user.id, session_uuid, &prompt, attachment)
        .await?;
    Ok(Json(DialogueResponse { response }))
}
