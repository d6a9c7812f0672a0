use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::application::entitlement::{TokenRates, monthly_limit_kzt};

pub struct LlmConfig {
    pub api_url: Url,
    pub api_key: SecretString,
    pub model_name: String,
    pub request_timeout_secs: u64,
    pub input_cost_usd_per_million: f64,
    pub output_cost_usd_per_million: f64,
    pub healer_prompt_path: PathBuf,
    pub general_prompt_path: PathBuf,
}

pub struct GatewayConfig {
    pub base_url: Url,
    pub login: String,
    pub password: SecretString,
}

pub struct BillingEnv {
    pub plan_id: String,
    /// Minor units (tiyn) per month.
    pub monthly_amount: i64,
    pub currency: String,
    pub usd_to_kzt_rate: f64,
    pub webhook_secret: SecretString,
}

pub struct EmailConfig {
    pub api_url: Url,
    pub api_key: SecretString,
    pub from: String,
}

pub struct SmsConfig {
    pub api_url: Url,
    pub api_key: SecretString,
    pub sender_id: String,
}

pub struct AppConfig {
    pub app_env: String,
    pub base_url: Url,
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    pub database_url: String,
    /// Whether to trust X-Forwarded-For headers. Set to true when behind a reverse proxy (Caddy, nginx).
    /// SECURITY: Only enable this when the API is not directly exposed to the internet.
    pub trust_proxy: bool,
    pub csrf_key: SecretString,
    pub rate_limit_per_second: f64,
    pub rate_limit_burst: f64,
    pub upload_path: PathBuf,
    pub legal_docs_dir: PathBuf,
    pub first_admin_email: Option<String>,
    pub llm: LlmConfig,
    pub gateway: GatewayConfig,
    pub billing: BillingEnv,
    pub email: EmailConfig,
    pub sms: SmsConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let app_env: String = get_env_default("APP_ENV", "development".to_string());
        let is_production = app_env == "production";

        let base_url: Url = get_env("BASE_URL");
        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:8080".parse().unwrap());
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");
        let database_url: String = get_env("DATABASE_URL");
        // Default to false for security - must explicitly enable when behind a trusted proxy
        let trust_proxy: bool = get_env_default("TRUST_PROXY", false);

        let csrf_key = SecretString::from(secret_env("CSRF_AUTH_KEY", is_production));

        let rate_limit_per_second: f64 = get_env_default("RATE_LIMIT_PER_SECOND", 5.0);
        let rate_limit_burst: f64 = get_env_default("RATE_LIMIT_BURST", 10.0);

        let upload_path: PathBuf =
            PathBuf::from(get_env_default("UPLOAD_PATH", "./uploads".to_string()));
        let legal_docs_dir: PathBuf =
            PathBuf::from(get_env_default("LEGAL_DOCS_DIR", "./legal".to_string()));
        let first_admin_email = std::env::var("FIRST_ADMIN_EMAIL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let llm = LlmConfig {
            api_url: get_env("LLM_API_URL"),
            api_key: SecretString::from(secret_env("LLM_API_KEY", is_production)),
            model_name: get_env::<String>("LLM_MODEL_NAME"),
            request_timeout_secs: get_env_default("LLM_REQUEST_TIMEOUT_SECS", 90),
            input_cost_usd_per_million: get_env_default("TOKEN_COST_INPUT_PER_MILLION", 3.0),
            output_cost_usd_per_million: get_env_default("TOKEN_COST_OUTPUT_PER_MILLION", 15.0),
            healer_prompt_path: PathBuf::from(get_env_default(
                "HEALER_PROMPT_PATH",
                "./prompts/healer.txt".to_string(),
            )),
            general_prompt_path: PathBuf::from(get_env_default(
                "GENERAL_PROMPT_PATH",
                "./prompts/general.txt".to_string(),
            )),
        };

        let gateway = GatewayConfig {
            base_url: get_env("PAYMENT_GATEWAY_BASE_URL"),
            login: get_env::<String>("PAYMENT_GATEWAY_LOGIN"),
            password: SecretString::from(secret_env("PAYMENT_GATEWAY_PASSWORD", is_production)),
        };

        let billing = BillingEnv {
            plan_id: get_env_default("BILLING_PLAN_ID", "monthly".to_string()),
            monthly_amount: get_env::<i64>("BILLING_MONTHLY_AMOUNT"),
            currency: get_env_default("BILLING_CURRENCY", "KZT".to_string()),
            usd_to_kzt_rate: get_env::<f64>("USD_TO_KZT_RATE"),
            webhook_secret: SecretString::from(secret_env("WEBHOOK_SECRET", is_production)),
        };

        let email = EmailConfig {
            api_url: get_env("EMAIL_API_URL"),
            api_key: SecretString::from(secret_env("EMAIL_API_KEY", is_production)),
            from: get_env::<String>("EMAIL_FROM"),
        };

        let sms = SmsConfig {
            api_url: get_env("SMS_GATEWAY_API_URL"),
            api_key: SecretString::from(secret_env("SMS_GATEWAY_API_KEY", is_production)),
            sender_id: get_env_default("SMS_GATEWAY_SENDER_ID", "EMSHI".to_string()),
        };

        if is_production {
            assert!(
                base_url.scheme() == "https",
                "BASE_URL must use https in production"
            );
        }
        assert!(billing.monthly_amount > 0, "BILLING_MONTHLY_AMOUNT must be positive");
        assert!(billing.usd_to_kzt_rate > 0.0, "USD_TO_KZT_RATE must be positive");

        Self {
            app_env,
            base_url,
            bind_addr,
            cors_origin,
            database_url,
            trust_proxy,
            csrf_key,
            rate_limit_per_second,
            rate_limit_burst,
            upload_path,
            legal_docs_dir,
            first_admin_email,
            llm,
            gateway,
            billing,
            email,
            sms,
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    pub fn token_rates(&self) -> TokenRates {
        TokenRates {
            input_usd_per_million: self.llm.input_cost_usd_per_million,
            output_usd_per_million: self.llm.output_cost_usd_per_million,
            usd_to_kzt: self.billing.usd_to_kzt_rate,
        }
    }

    pub fn token_monthly_limit_kzt(&self) -> f64 {
        monthly_limit_kzt(self.billing.monthly_amount)
    }
}

/// Secrets are hard-required in production; development falls back to an
/// obviously unsafe placeholder so the server still starts locally.
fn secret_env(key: &'static str, is_production: bool) -> String {
    if is_production {
        get_env::<String>(key)
    } else {
        get_env_default(key, format!("dev-insecure-{}", key.to_lowercase()))
    }
}
