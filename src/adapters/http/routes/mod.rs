pub mod account;
pub mod admin;
pub mod auth;
pub mod billing;
pub mod chat;
pub mod legal;
pub mod trial;

use axum::{Router, middleware::from_fn};

use crate::adapters::http::{
    app_state::AppState,
    middleware::{require_admin, require_auth},
};

pub fn router(app_state: AppState) -> Router<AppState> {
    let authed = Router::new()
        .merge(account::router())
        .merge(billing::authed_router())
        .merge(chat::router(app_state))
        .route_layer(from_fn(require_auth));

    Router::new()
        .merge(auth::router())
        .merge(trial::router())
        .merge(legal::router())
        .merge(billing::public_router())
        .merge(authed)
        .nest("/admin", admin::router().route_layer(from_fn(require_admin)))
}
