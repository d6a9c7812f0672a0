use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error};
use url::Url;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::auth::EmailSender;
use crate::infra::config::EmailConfig;
use crate::infra::http_client::build_client;

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Transactional email over a Resend-style HTTP API.
pub struct HttpEmailSender {
    client: Client,
    api_url: Url,
    api_key: SecretString,
    from: String,
}

impl HttpEmailSender {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            client: build_client(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<()> {
        let response = self
            .client
            .post(self.api_url.clone())
            .bearer_auth(self.api_key.expose_secret())
            .json(&SendEmailRequest {
                from: &self.from,
                to: [to],
                subject,
                html,
            })
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("email API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body, "Email API rejected message");
            return Err(AppError::Upstream(format!(
                "email API returned {status}"
            )));
        }
        debug!(subject, "Email dispatched");
        Ok(())
    }
}
