use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
};

/// Trial prompts are capped well below the paid flow.
const MAX_TRIAL_PROMPT_CHARS: usize = 1000;

pub fn router() -> Router<AppState> {
    Router::new().route("/trial-dialogue", post(trial_dialogue))
}

#[derive(Deserialize)]
struct TrialRequest {
    prompt: String,
}

#[derive(Serialize)]
struct TrialResponse {
    response: String,
}

async fn trial_dialogue(
    State(app_state): State<AppState>,
    Json(body): Json<TrialRequest>,
) -> AppResult<Json<TrialResponse>> {
    let prompt = body.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::InvalidInput("Введите сообщение.".into()));
    }
    if prompt.chars().count() > MAX_TRIAL_PROMPT_CHARS {
        return Err(AppError::InvalidInput(format!(
            "Сообщение слишком длинное. Максимум {MAX_TRIAL_PROMPT_CHARS} символов."
        )));
    }
    let response = app_state.chat_use_cases.trial_dialogue(prompt).await?;
    Ok(Json(TrialResponse { response }))
}
