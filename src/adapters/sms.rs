use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};
use url::Url;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::auth::SmsSender;
use crate::infra::config::SmsConfig;
use crate::infra::http_client::build_client;

/// SMS delivery through a form-POST gateway (Mobizon-style API).
pub struct HttpSmsSender {
    client: Client,
    api_url: Url,
    api_key: SecretString,
    sender_id: String,
}

impl HttpSmsSender {
    pub fn new(config: &SmsConfig) -> Self {
        Self {
            client: build_client(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            sender_id: config.sender_id.clone(),
        }
    }
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    async fn send(&self, to_phone: &str, text: &str) -> AppResult<()> {
        // The gateway expects the recipient without the leading plus.
        let recipient = to_phone.trim_start_matches('+');
        let response = self
            .client
            .post(self.api_url.clone())
            .form(&[
                ("apiKey", self.api_key.expose_secret()),
                ("recipient", recipient),
                ("text", text),
                ("from", &self.sender_id),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("SMS gateway request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body, "SMS gateway rejected message");
            return Err(AppError::Upstream(format!("SMS gateway returned {status}")));
        }
        debug!(recipient, "SMS dispatched");
        Ok(())
    }
}
