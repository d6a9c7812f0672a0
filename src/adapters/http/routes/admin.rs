use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::use_cases::admin::{RevenueReport, UserPage},
    application::use_cases::auth::AdminUserUpdate,
    domain::entities::role::RoleName,
    domain::entities::subscription::SubscriptionStatus,
    domain::entities::user::UserProfile,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user).post(update_user))
        .route("/reports", get(revenue_report))
        .route("/settings", get(list_settings).post(update_setting))
}

#[derive(Deserialize)]
struct UsersQuery {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    search: Option<String>,
}

async fn list_users(
    State(app_state): State<AppState>,
    Query(query): Query<UsersQuery>,
) -> AppResult<Json<UserPage>> {
    let page = app_state
        .admin_use_cases
        .list_users(query.search.as_deref(), query.page.unwrap_or(1))
        .await?;
    Ok(Json(page))
}

async fn get_user(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserProfile>> {
    let user = app_state.admin_use_cases.get_user(id).await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
struct UpdateUserRequest {
    first_name: String,
    last_name: String,
    role: String,
    subscription_status: String,
    is_email_verified: bool,
}

async fn update_user(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<impl IntoResponse> {
    let role = RoleName::parse(&body.role)
        .ok_or_else(|| AppError::InvalidInput(format!("Неизвестная роль: {}", body.role)))?;
    let update = AdminUserUpdate {
        first_name: body.first_name,
        last_name: body.last_name,
        role,
        subscription_status: SubscriptionStatus::parse(&body.subscription_status),
        is_email_verified: body.is_email_verified,
    };
    app_state.admin_use_cases.update_user(id, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revenue_report(
    State(app_state): State<AppState>,
) -> AppResult<Json<RevenueReport>> {
    let report = app_state.admin_use_cases.revenue_report().await?;
    Ok(Json(report))
}

#[derive(Serialize)]
struct SettingEntry {
    key: String,
    value: String,
}

async fn list_settings(
    State(app_state): State<AppState>,
) -> AppResult<Json<Vec<SettingEntry>>> {
    let settings = app_state.admin_use_cases.settings().await?;
    Ok(Json(
        settings
            .into_iter()
            .map(|(key, value)| SettingEntry { key, value })
            .collect(),
    ))
}

#[derive(Deserialize)]
struct UpdateSettingRequest {
    key: String,
    value: String,
}

async fn update_setting(
    State(app_state): State<AppState>,
    Json(body): Json<UpdateSettingRequest>,
) -> AppResult<impl IntoResponse> {
    app_state
        .admin_use_cases
        .update_setting(&body.key, &body.value)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
