//! Full mock-backed application for router-level tests.

use std::net::SocketAddr;
use std::sync::Arc;

use axum_extra::extract::cookie::Cookie;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use crate::adapters::http::app_state::AppState;
use crate::application::session::{SESSION_COOKIE, SessionBag, SessionStore};
use crate::application::use_cases::admin::AdminUseCases;
use crate::application::use_cases::auth::{AuthUseCases, generate_token, hash_token};
use crate::application::use_cases::billing::{BillingConfig, BillingUseCases};
use crate::application::use_cases::chat::{ChatUseCases, SystemPrompts};
use crate::infra::app::create_app;
use crate::infra::config::{
    AppConfig, BillingEnv, EmailConfig, GatewayConfig, LlmConfig, SmsConfig,
};
use crate::infra::rate_limit::TokenBucketRateLimiter;
use crate::test_utils::mocks::{
    InMemoryChatRepo, InMemoryPaymentRepo, InMemoryRoleRepo, InMemorySessionStore,
    InMemorySettingsRepo, InMemorySubscriptionRepo, InMemoryUserRepo, RecordingEmailSender,
    RecordingSmsSender, ScriptedCompletionClient, StubPaymentGateway,
};

/// The mock collaborators behind a [`TestServer`], kept so tests can seed
/// data and inspect what the handlers did.
pub struct TestBackend {
    pub state: AppState,
    pub users: Arc<InMemoryUserRepo>,
    pub sessions: Arc<InMemorySessionStore>,
    pub chats: Arc<InMemoryChatRepo>,
    pub payments: Arc<InMemoryPaymentRepo>,
    pub subscriptions: Arc<InMemorySubscriptionRepo>,
    pub gateway: Arc<StubPaymentGateway>,
    pub email: Arc<RecordingEmailSender>,
    pub sms: Arc<RecordingSmsSender>,
    pub llm: Arc<ScriptedCompletionClient>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        app_env: "test".into(),
        base_url: "http://localhost:8080".parse().unwrap(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        cors_origin: "http://localhost:3000".parse().unwrap(),
        database_url: String::new(),
        trust_proxy: false,
        csrf_key: SecretString::from("test-csrf-key"),
        rate_limit_per_second: 1_000.0,
        rate_limit_burst: 1_000.0,
        upload_path: std::env::temp_dir(),
        legal_docs_dir: std::env::temp_dir(),
        first_admin_email: None,
        llm: LlmConfig {
            api_url: "http://localhost:9/v1/chat/completions".parse().unwrap(),
            api_key: SecretString::from("test-llm-key"),
            model_name: "test-model".into(),
            request_timeout_secs: 5,
            input_cost_usd_per_million: 3.0,
            output_cost_usd_per_million: 15.0,
            healer_prompt_path: "./prompts/healer.txt".into(),
            general_prompt_path: "./prompts/general.txt".into(),
        },
        gateway: GatewayConfig {
            base_url: "http://localhost:9/".parse().unwrap(),
            login: "merchant".into(),
            password: SecretString::from("gateway-password"),
        },
        billing: BillingEnv {
            plan_id: "monthly".into(),
            monthly_amount: 990_000,
            currency: "KZT".into(),
            usd_to_kzt_rate: 500.0,
            webhook_secret: SecretString::from("whsec_test"),
        },
        email: EmailConfig {
            api_url: "http://localhost:9/".parse().unwrap(),
            api_key: SecretString::from("email-key"),
            from: "noreply@emshi.test".into(),
        },
        sms: SmsConfig {
            api_url: "http://localhost:9/".parse().unwrap(),
            api_key: SecretString::from("sms-key"),
            sender_id: "EMSHI".into(),
        },
    }
}

pub fn test_backend() -> TestBackend {
    let config = Arc::new(test_config());
    let users = Arc::new(InMemoryUserRepo::default());
    let sessions = Arc::new(InMemorySessionStore::default());
    let chats = Arc::new(InMemoryChatRepo::default());
    let payments = Arc::new(InMemoryPaymentRepo::default());
    let subscriptions = Arc::new(InMemorySubscriptionRepo::default());
    let gateway = Arc::new(StubPaymentGateway::default());
    let email = Arc::new(RecordingEmailSender::default());
    let sms = Arc::new(RecordingSmsSender::default());
    let llm = Arc::new(ScriptedCompletionClient::new("Ответ ассистента."));

    let auth_use_cases = AuthUseCases::new(
        users.clone(),
        Arc::new(InMemoryRoleRepo),
        email.clone(),
        sms.clone(),
        "http://localhost:8080".into(),
    );

    let chat_use_cases = ChatUseCases::new(
        chats.clone(),
        users.clone(),
        llm.clone(),
        SystemPrompts {
            healer: "Ты — внимательный консультант по здоровью.".into(),
            general: "Ты — вежливый ассистент.".into(),
        },
        std::env::temp_dir(),
    );

    let billing_use_cases = BillingUseCases::new(
        payments.clone(),
        subscriptions.clone(),
        users.clone(),
        gateway.clone(),
        BillingConfig {
            plan_id: config.billing.plan_id.clone(),
            monthly_amount: config.billing.monthly_amount,
            currency: config.billing.currency.clone(),
            return_url: "http://localhost:8080/api/billing/return".into(),
            webhook_secret: config.billing.webhook_secret.clone(),
        },
    );

    let admin_use_cases = AdminUseCases::new(
        users.clone(),
        payments.clone(),
        Arc::new(InMemorySettingsRepo::default()),
    );

    let state = AppState {
        config,
        auth_use_cases: Arc::new(auth_use_cases),
        chat_use_cases: Arc::new(chat_use_cases),
        billing_use_cases: Arc::new(billing_use_cases),
        admin_use_cases: Arc::new(admin_use_cases),
        user_repo: users.clone(),
        sessions: sessions.clone(),
        rate_limiter: Arc::new(TokenBucketRateLimiter::new(1_000.0, 1_000.0)),
    };

    TestBackend {
        state,
        users,
        sessions,
        chats,
        payments,
        subscriptions,
        gateway,
        email,
        sms,
        llm,
    }
}

/// The rate limiter needs a peer address, so the server runs over a real
/// HTTP transport; cookies persist across requests like in a browser.
pub fn test_server(state: AppState) -> TestServer {
    let app = create_app(state).into_make_service_with_connect_info::<SocketAddr>();
    TestServer::builder()
        .http_transport()
        .save_cookies()
        .build(app)
        .expect("test server should start")
}

/// Fetches a CSRF token (and its base cookie) for mutating requests.
pub async fn csrf_token(server: &TestServer) -> String {
    let body: serde_json::Value = server.get("/api/csrf").await.json();
    body["csrf_token"]
        .as_str()
        .expect("csrf token in response")
        .to_string()
}

/// Seeds an authenticated session for `user_id` and attaches its cookie,
/// sidestepping the password flow. Returns the raw session token.
pub async fn open_session(
    server: &mut TestServer,
    sessions: &InMemorySessionStore,
    user_id: Uuid,
) -> String {
    let raw = generate_token();
    let bag = SessionBag {
        user_id: Some(user_id),
        ..SessionBag::default()
    };
    let expires_at = Utc::now().naive_utc() + Duration::hours(1);
    sessions
        .create(&hash_token(&raw), &bag, expires_at)
        .await
        .expect("session create");
    server.add_cookie(Cookie::new(SESSION_COOKIE, raw.clone()));
    raw
}
