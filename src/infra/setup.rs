use std::fs::File;
use std::sync::Arc;

use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{
        email::HttpEmailSender,
        http::app_state::AppState,
        llm::OpenAiCompletionClient,
        payment_gateway::BankPaymentGateway,
        persistence::PostgresPersistence,
        sms::HttpSmsSender,
    },
    application::session::SessionStore,
    application::use_cases::{
        admin::{AdminUseCases, SettingsRepo},
        auth::{AuthUseCases, EmailSender, RoleRepo, SmsSender, UserRepo},
        billing::{BillingConfig, BillingUseCases, PaymentGateway, PaymentRepo, SubscriptionRepo},
        chat::{ChatUseCases, CompletionClient, SystemPrompts},
    },
    infra::{
        config::{AppConfig, LlmConfig},
        db::init_db,
        error::InfraError,
        rate_limit::TokenBucketRateLimiter,
    },
};

pub async fn init_app_state() -> Result<AppState, InfraError> {
    let config = AppConfig::from_env();

    let pool = init_db(&config.database_url).await?;
    let persistence = Arc::new(PostgresPersistence::new(pool));

    tokio::fs::create_dir_all(&config.upload_path)
        .await
        .map_err(|e| InfraError::UploadDir {
            path: config.upload_path.display().to_string(),
            source: e,
        })?;

    let prompts = load_prompts(&config.llm).await?;

    let user_repo = persistence.clone() as Arc<dyn UserRepo>;
    let role_repo = persistence.clone() as Arc<dyn RoleRepo>;
    let payment_repo = persistence.clone() as Arc<dyn PaymentRepo>;
    let subscription_repo = persistence.clone() as Arc<dyn SubscriptionRepo>;
    let settings_repo = persistence.clone() as Arc<dyn SettingsRepo>;
    let sessions = persistence.clone() as Arc<dyn SessionStore>;

    let email = Arc::new(HttpEmailSender::new(&config.email)) as Arc<dyn EmailSender>;
    let sms = Arc::new(HttpSmsSender::new(&config.sms)) as Arc<dyn SmsSender>;
    let llm = Arc::new(OpenAiCompletionClient::new(&config.llm)) as Arc<dyn CompletionClient>;
    let gateway = Arc::new(BankPaymentGateway::new(&config.gateway)) as Arc<dyn PaymentGateway>;

    let base_url = config.base_url.to_string().trim_end_matches('/').to_string();
    let auth_use_cases = AuthUseCases::new(
        user_repo.clone(),
        role_repo,
        email,
        sms,
        base_url.clone(),
    );

    let chat_use_cases = ChatUseCases::new(
        persistence.clone(),
        user_repo.clone(),
        llm,
        prompts,
        config.upload_path.clone(),
    );

    let billing_use_cases = BillingUseCases::new(
        payment_repo.clone(),
        subscription_repo,
        user_repo.clone(),
        gateway,
        BillingConfig {
            plan_id: config.billing.plan_id.clone(),
            monthly_amount: config.billing.monthly_amount,
            currency: config.billing.currency.clone(),
            return_url: format!("{base_url}/api/billing/return"),
            webhook_secret: config.billing.webhook_secret.clone(),
        },
    );

    let admin_use_cases = AdminUseCases::new(user_repo.clone(), payment_repo, settings_repo);

    let rate_limiter = Arc::new(TokenBucketRateLimiter::new(
        config.rate_limit_per_second,
        config.rate_limit_burst,
    ));
    rate_limiter.start();

    Ok(AppState {
        config: Arc::new(config),
        auth_use_cases: Arc::new(auth_use_cases),
        chat_use_cases: Arc::new(chat_use_cases),
        billing_use_cases: Arc::new(billing_use_cases),
        admin_use_cases: Arc::new(admin_use_cases),
        user_repo,
        sessions,
        rate_limiter,
    })
}

/// The healer prompt is the product voice and must exist; the general
/// prompt has a serviceable built-in fallback.
async fn load_prompts(config: &LlmConfig) -> Result<SystemPrompts, InfraError> {
    let healer = tokio::fs::read_to_string(&config.healer_prompt_path)
        .await
        .map_err(|e| InfraError::PromptFile {
            path: config.healer_prompt_path.display().to_string(),
            source: e,
        })?;

    let general = match tokio::fs::read_to_string(&config.general_prompt_path).await {
        Ok(text) => text,
        Err(e) => {
            warn!(
                path = %config.general_prompt_path.display(),
                error = %e,
                "General prompt file missing, using the built-in default"
            );
            "Ты — вежливый ассистент. Отвечай кратко, по делу и на языке пользователя."
                .to_string()
        }
    };

    Ok(SystemPrompts {
        healer: healer.trim().to_string(),
        general: general.trim().to_string(),
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "emshi=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false) // don’t show target (module path)
        .with_level(true) // show log level
        .pretty(); // human-friendly, with colors

    // File (structured JSON logs)
    let file = File::create("app.log").expect("cannot create log file");
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
