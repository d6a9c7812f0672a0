use std::sync::Arc;

use crate::{
    application::session::SessionStore,
    application::use_cases::{
        admin::AdminUseCases, auth::AuthUseCases, auth::UserRepo, billing::BillingUseCases,
        chat::ChatUseCases,
    },
    infra::config::AppConfig,
    infra::rate_limit::RateLimiterTrait,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth_use_cases: Arc<AuthUseCases>,
    pub chat_use_cases: Arc<ChatUseCases>,
    pub billing_use_cases: Arc<BillingUseCases>,
    pub admin_use_cases: Arc<AdminUseCases>,
    pub user_repo: Arc<dyn UserRepo>,
    pub sessions: Arc<dyn SessionStore>,
    pub rate_limiter: Arc<dyn RateLimiterTrait>,
}
