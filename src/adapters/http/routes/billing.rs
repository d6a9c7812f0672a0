use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    adapters::http::{app_state::AppState, middleware::CurrentUser},
    app_error::AppResult,
    application::use_cases::billing::WEBHOOK_SIGNATURE_HEADER,
    domain::entities::subscription::Subscription,
};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/billing/webhook", post(webhook))
        .route("/billing/return", get(payment_return))
}

pub fn authed_router() -> Router<AppState> {
    Router::new()
        .route("/billing/create-payment", post(create_payment))
        .route("/billing/cancel", post(cancel))
        .route("/billing/subscription", get(subscription))
}

#[derive(Serialize)]
struct CreatePaymentResponse {
    payment_url: String,
}

async fn create_payment(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<CreatePaymentResponse>> {
    let payment_url = app_state.billing_use_cases.create_payment(&user).await?;
    Ok(Json(CreatePaymentResponse { payment_url }))
}

async fn cancel(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<serde_json::Value>> {
    app_state.billing_use_cases.cancel(user.id).await?;
    Ok(Json(serde_json::json!({
        "message": "Автопродление отключено. Доступ сохранится до конца оплаченного периода."
    })))
}

async fn subscription(
    State(app_state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<Option<Subscription>>> {
    let subscription = app_state
        .billing_use_cases
        .subscription_for_user(user.id)
        .await?;
    Ok(Json(subscription))
}

/// Raw body is needed verbatim: the HMAC covers the exact bytes on the
/// wire, not a re-serialization.
async fn webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    app_state
        .billing_use_cases
        .process_webhook(&body, signature)
        .await?;
    Ok(Json(serde_json::json!({ "received": true })))
}

#[derive(Deserialize)]
struct ReturnQuery {
    order_id: String,
}

/// The browser lands here after the bank's payment page. The real order
/// state is re-queried from the gateway; query parameters are not trusted.
async fn payment_return(
    State(app_state): State<AppState>,
    Query(query): Query<ReturnQuery>,
) -> AppResult<impl IntoResponse> {
    let paid = app_state
        .billing_use_cases
        .confirm_return(&query.order_id)
        .await?;
    Ok(if paid {
        Redirect::to("/payment/success")
    } else {
        Redirect::to("/payment/failure")
    })
}
