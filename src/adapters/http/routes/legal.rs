use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/legal/{doc}", get(legal_document))
}

/// Serves the static legal documents (offer, privacy policy). The name is
/// whitelisted to letters, digits, dashes and underscores so it can never
/// escape the documents directory.
async fn legal_document(
    State(app_state): State<AppState>,
    Path(doc): Path<String>,
) -> AppResult<impl IntoResponse> {
    if doc.is_empty()
        || !doc
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::NotFound);
    }

    let path = app_state.config.legal_docs_dir.join(format!("{doc}.html"));
    let html = tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| AppError::NotFound)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    ))
}
