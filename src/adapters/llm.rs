use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use url::Url;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::chat::{ChatTurn, Completion, CompletionClient, TokenUsage};
use crate::infra::config::LlmConfig;
use crate::infra::http_client::build_client_with_timeout;

const MAX_COMPLETION_TOKENS: u32 = 2048;
const TEMPERATURE: f64 = 0.7;

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

/// Chat-completions client for an OpenAI-compatible upstream.
pub struct OpenAiCompletionClient {
    client: Client,
    api_url: Url,
    api_key: SecretString,
    model_name: String,
    request_timeout: Duration,
}

impl OpenAiCompletionClient {
    pub fn new(config: &LlmConfig) -> Self {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        Self {
            client: build_client_with_timeout(request_timeout),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model_name: config.model_name.clone(),
            request_timeout,
        }
    }
}

fn build_messages(system_prompt: &str, history: &[ChatTurn], user_prompt: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(Message {
        role: "system",
        content: system_prompt.to_string(),
    });
    for turn in history {
        messages.push(Message {
            role: "user",
            content: turn.prompt.clone(),
        });
        // A turn without a stored answer must not produce an empty
        // assistant message upstream.
        if !turn.response.is_empty() {
            messages.push(Message {
                role: "assistant",
                content: turn.response.clone(),
            });
        }
    }
    messages.push(Message {
        role: "user",
        content: user_prompt.to_string(),
    });
    messages
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    #[instrument(skip(self, system_prompt, history, user_prompt))]
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_prompt: &str,
        quick: bool,
    ) -> AppResult<Completion> {
        let timeout = if quick {
            self.request_timeout / 2
        } else {
            self.request_timeout
        };

        let request = CompletionRequest {
            model: self.model_name.clone(),
            messages: build_messages(system_prompt, history, user_prompt),
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: TEMPERATURE,
            stream: false,
        };

        let response = self
            .client
            .post(self.api_url.clone())
            .bearer_auth(self.api_key.expose_secret())
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("LLM request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body, "LLM API returned an error");
            return Err(AppError::Upstream(format!("LLM API returned {status}")));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("malformed LLM response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Upstream("LLM response contained no choices".into()))?;

        Ok(Completion {
            content,
            usage: parsed.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}
