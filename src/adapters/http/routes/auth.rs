use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    adapters::http::{app_state::AppState, csrf, session::SessionHandle},
    app_error::{AppError, AppResult},
    application::use_cases::auth::{EmailVerificationOutcome, RegistrationOutcome},
    application::validators::RegistrationForm,
    domain::entities::user::UserProfile,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/verify-email", get(verify_email))
        .route("/resend-verification-email", post(resend_verification_email))
        .route("/request-password-reset", post(request_password_reset))
        .route("/reset-password", post(reset_password))
        .route("/csrf", get(csrf::issue_csrf_token))
        .route("/session", get(session_status))
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
    redirect_to: Option<String>,
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
        redirect_to: None,
    })
}

/// The honeypot outcome answers exactly like a success so bots learn
/// nothing from the response.
async fn register(
    State(app_state): State<AppState>,
    Extension(session): Extension<SessionHandle>,
    Json(form): Json<RegistrationForm>,
) -> AppResult<impl IntoResponse> {
    let outcome = app_state.auth_use_cases.register(form).await?;
    if let RegistrationOutcome::Created(user) = outcome {
        session.login(user.id);
    }
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Регистрация принята. Мы отправили письмо для подтверждения email."
                .to_string(),
            redirect_to: Some("/verify-phone".to_string()),
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    user: UserProfile,
    redirect_to: String,
}

async fn login(
    State(app_state): State<AppState>,
    Extension(session): Extension<SessionHandle>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let user = app_state
        .auth_use_cases
        .login(&body.email, &body.password)
        .await?;
    session.login(user.id);
    // A URI stashed by the subscription gate wins over the default landing.
    let redirect_to = session.take_redirect().unwrap_or_else(|| {
        if user.is_admin() {
            "/admin/dashboard".to_string()
        } else {
            "/dashboard".to_string()
        }
    });
    Ok(Json(LoginResponse { user, redirect_to }))
}

async fn logout(Extension(session): Extension<SessionHandle>) -> StatusCode {
    session.logout();
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct VerifyEmailQuery {
    token: String,
}

#[derive(Serialize)]
struct VerifyEmailResponse {
    status: &'static str,
}

async fn verify_email(
    State(app_state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> AppResult<Json<VerifyEmailResponse>> {
    match app_state.auth_use_cases.verify_email(&query.token).await? {
        EmailVerificationOutcome::Verified => Ok(Json(VerifyEmailResponse { status: "verified" })),
        EmailVerificationOutcome::AlreadyVerified => Ok(Json(VerifyEmailResponse {
            status: "already_verified",
        })),
        EmailVerificationOutcome::InvalidOrExpired => Err(AppError::InvalidInput(
            "Ссылка подтверждения недействительна или истекла.".into(),
        )),
    }
}

#[derive(Deserialize)]
struct EmailRequest {
    email: String,
}

async fn resend_verification_email(
    State(app_state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> AppResult<impl IntoResponse> {
    app_state
        .auth_use_cases
        .resend_verification_email(&body.email)
        .await?;
    Ok(message(
        "Если этот email зарегистрирован и не подтвержден, мы отправили новое письмо.",
    ))
}

async fn request_password_reset(
    State(app_state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> AppResult<impl IntoResponse> {
    app_state
        .auth_use_cases
        .request_password_reset(&body.email)
        .await?;
    Ok(message(
        "Если этот email зарегистрирован, мы отправили ссылку для сброса пароля.",
    ))
}

#[derive(Deserialize)]
struct ResetPasswordRequest {
    token: String,
    password: String,
    confirm_password: String,
}

async fn reset_password(
    State(app_state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    app_state
        .auth_use_cases
        .reset_password(&body.token, &body.password, &body.confirm_password)
        .await?;
    Ok(message("Пароль обновлен. Теперь вы можете войти."))
}

#[derive(Serialize)]
struct SessionStatusResponse {
    authenticated: bool,
    user: Option<UserProfile>,
    flash_success: Option<String>,
    flash_error: Option<String>,
}

async fn session_status(
    State(app_state): State<AppState>,
    Extension(session): Extension<SessionHandle>,
) -> AppResult<Json<SessionStatusResponse>> {
    let user = match session.user_id() {
        Some(user_id) => app_state.user_repo.get_by_id(user_id).await?,
        None => None,
    };
    let (flash_success, flash_error) = session.take_flashes();
    Ok(Json(SessionStatusResponse {
        authenticated: user.is_some(),
        user,
        flash_success,
        flash_error,
    }))
}
