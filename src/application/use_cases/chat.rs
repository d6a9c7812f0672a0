use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::prompt_router::{self, PromptKind},
    application::use_cases::auth::UserRepo,
    domain::entities::chat::{ChatMessage, ChatSession},
};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const HISTORY_LIMIT: i64 = 10;
pub const MESSAGES_LIMIT: i64 = 200;
pub const SESSION_LIST_LIMIT: i64 = 50;
/// Spliced document text is cut at this many bytes.
const MAX_DOCUMENT_TEXT_BYTES: usize = 4000;

#[async_trait]
pub trait ChatRepo: Send + Sync {
    async fn create_session(
        &self,
        user_id: Uuid,
        uuid: Uuid,
        title: &str,
    ) -> AppResult<ChatSession>;
    async fn session(&self, uuid: Uuid) -> AppResult<Option<ChatSession>>;
    async fn list_sessions(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<ChatSession>>;
    /// The last `limit` messages of the session, oldest first.
    async fn messages(&self, session_uuid: Uuid, limit: i64) -> AppResult<Vec<ChatMessage>>;
    async fn save_message(
        &self,
        user_id: Uuid,
        session_uuid: Uuid,
        prompt: &str,
        response: &str,
    ) -> AppResult<()>;
}

/// One past exchange, as sent upstream.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub prompt: String,
    pub response: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// `quick` halves the upstream timeout (used by the trial endpoint).
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_prompt: &str,
        quick: bool,
    ) -> AppResult<Completion>;
}

#[derive(Debug, Clone)]
pub struct SystemPrompts {
    pub healer: String,
    pub general: String,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct ChatUseCases {
    chats: Arc<dyn ChatRepo>,
    users: Arc<dyn UserRepo>,
    llm: Arc<dyn CompletionClient>,
    prompts: SystemPrompts,
    upload_dir: PathBuf,
}

impl ChatUseCases {
    pub fn new(
        chats: Arc<dyn ChatRepo>,
        users: Arc<dyn UserRepo>,
        llm: Arc<dyn CompletionClient>,
        prompts: SystemPrompts,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            chats,
            users,
            llm,
            prompts,
            upload_dir,
        }
    }

    pub async fn create_session(&self, user_id: Uuid) -> AppResult<ChatSession> {
        let title = format!("Новый диалог от {}", Local::now().format("%d.%m.%y %H:%M"));
        let session = self
            .chats
            .create_session(user_id, Uuid::new_v4(), &title)
            .await?;
        info!(%user_id, session_uuid = %session.uuid, "Chat session created");
        Ok(session)
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> AppResult<Vec<ChatSession>> {
        self.chats.list_sessions(user_id, SESSION_LIST_LIMIT).await
    }

    pub async fn session_messages(
        &self,
        user_id: Uuid,
        session_uuid: Uuid,
    ) -> AppResult<Vec<ChatMessage>> {
        self.owned_session(user_id, session_uuid).await?;
        self.chats.messages(session_uuid, MESSAGES_LIMIT).await
    }

    async fn owned_session(&self, user_id: Uuid, session_uuid: Uuid) -> AppResult<ChatSession> {
        let session = self
            .chats
            .session(session_uuid)
            .await?
            .ok_or(AppError::NotFound)?;
        if session.user_id != user_id {
            warn!(%user_id, owner = %session.user_id, %session_uuid, "Chat session access denied");
            return Err(AppError::Forbidden);
        }
        Ok(session)
    }

    #[instrument(skip(self, prompt, attachment), fields(%user_id, %session_uuid))]
    pub async fn dialogue(
        &self,
        user_id: Uuid,
        session_uuid: Uuid,
        prompt: &str,
        attachment: Option<Attachment>,
    ) -> AppResult<String> {
        self.owned_session(user_id, session_uuid).await?;

        let mut llm_prompt = prompt.to_string();
        let mut attached_name = None;

        if let Some(file) = attachment {
            if file.bytes.len() > MAX_UPLOAD_BYTES {
                return Err(AppError::InvalidInput(format!(
                    "Файл слишком большой. Максимальный размер: {}MB",
                    MAX_UPLOAD_BYTES / (1024 * 1024)
                )));
            }
            self.store_upload(user_id, &file).await?;
            llm_prompt.push_str(&splice_attachment(&file));
            attached_name = Some(file.filename);
        }

        let system_prompt = match prompt_router::classify(&llm_prompt) {
            PromptKind::Healer => &self.prompts.healer,
            PromptKind::General => &self.prompts.general,
        };

        let history = self
            .chats
            .messages(session_uuid, HISTORY_LIMIT)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to load chat history, continuing without it");
                Vec::new()
            });
        let turns: Vec<ChatTurn> = history
            .into_iter()
            .map(|m| ChatTurn {
                prompt: m.prompt,
                response: m.response,
            })
            .collect();

        let completion = self
            .llm
            .complete(system_prompt, &turns, &llm_prompt, false)
            .await?;

        let mut prompt_to_save = prompt.to_string();
        if let Some(name) = attached_name {
            prompt_to_save.push_str(&format!(" (Прикреплен файл: {name})"));
        }
        // The user already has the answer; a failed save must not turn
        // into an error response.
        if let Err(e) = self
            .chats
            .save_message(user_id, session_uuid, &prompt_to_save, &completion.content)
            .await
        {
            error!(error = %e, "Failed to persist chat message");
        }

        if let Some(usage) = completion.usage {
            if let Err(e) = self
                .users
                .increment_token_usage(user_id, usage.input_tokens, usage.output_tokens)
                .await
            {
                error!(error = %e, "Failed to update token counters");
            } else {
                info!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Token counters updated"
                );
            }
        }

        Ok(completion.content)
    }

    /// Unauthenticated demo: general prompt only, no history, nothing stored.
    pub async fn trial_dialogue(&self, prompt: &str) -> AppResult<String> {
        let completion = self
            .llm
            .complete(&self.prompts.general, &[], prompt, true)
            .await?;
        Ok(completion.content)
    }

    async fn store_upload(&self, user_id: Uuid, file: &Attachment) -> AppResult<()> {
        let extension = std::path::Path::new(&file.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let stored_name = format!("{user_id}_{}{extension}", Uuid::new_v4());
        let path = self.upload_dir.join(stored_name);
        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|e| AppError::Internal(format!("failed to store upload: {e}")))?;
        Ok(())
    }
}

/// Builds the text spliced into the prompt for an attachment. Images are
/// only announced (no vision upstream yet); `.txt` documents get their
/// content inlined, truncated to a byte budget.
fn splice_attachment(file: &Attachment) -> String {
    if file.content_type.starts_with("image/") {
        return format!(
            "\n\n[Прикреплено изображение: {}. Опиши его или ответь на вопрос с его учетом.]",
            file.filename
        );
    }

    let is_document = file.content_type.contains("pdf")
        || file.content_type.contains("document")
        || file.content_type.contains("text");
    if !is_document {
        return String::new();
    }

    if file.filename.to_lowercase().ends_with(".txt")
        && let Ok(text) = std::str::from_utf8(&file.bytes)
    {
        let truncated = truncate_at_boundary(text, MAX_DOCUMENT_TEXT_BYTES);
        let suffix = if truncated.len() < text.len() {
            "...\n[текст документа был сокращен]"
        } else {
            ""
        };
        return format!(
            "\n\n[Извлеченный текст из документа '{}']:\n{}{}\n[/конец текста из документа]",
            file.filename, truncated, suffix
        );
    }

    format!(
        "\n\n[Прикреплен документ: {}. Извлечение текста не удалось или не поддерживается для этого типа.]",
        file.filename
    )
}

fn truncate_at_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
