use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use crate::{
    adapters::http::{app_state::AppState, middleware::CurrentUser},
    app_error::AppResult,
    domain::entities::user::UserProfile,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/profile/update", post(update_profile))
        .route("/profile/change-password", post(change_password))
        .route("/verify-phone", post(verify_phone))
        .route("/resend-phone-code", post(resend_phone_code))
        .route("/settings/update", post(update_settings))
}

async fn profile(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserProfile> {
    Json(user)
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    first_name: String,
    last_name: String,
    phone: String,
}

async fn update_profile(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    app_state
        .auth_use_cases
        .update_profile(user.id, &body.first_name, &body.last_name, &body.phone)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
    confirm_password: String,
}

async fn change_password(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    app_state
        .auth_use_cases
        .change_password(
            user.id,
            &body.current_password,
            &body.new_password,
            &body.confirm_password,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct VerifyPhoneRequest {
    code: String,
}

async fn verify_phone(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<VerifyPhoneRequest>,
) -> AppResult<impl IntoResponse> {
    app_state
        .auth_use_cases
        .verify_phone(user.id, &body.code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resend_phone_code(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<impl IntoResponse> {
    app_state.auth_use_cases.resend_phone_code(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct UpdateSettingsRequest {
    tts_enabled: bool,
}

async fn update_settings(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<UpdateSettingsRequest>,
) -> AppResult<impl IntoResponse> {
    app_state
        .auth_use_cases
        .update_settings(user.id, body.tts_enabled)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
