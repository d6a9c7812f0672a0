use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult, FieldError};
use crate::application::session::{SessionBag, SessionStore};
use crate::application::use_cases::admin::SettingsRepo;
use crate::application::use_cases::auth::{
    AdminUserUpdate, EmailSender, EmailVerificationOutcome, RoleRepo, SmsSender,
    SubscriptionStateUpdate, TokenCleanupCounts, UserRepo,
};
use crate::application::use_cases::billing::{
    CreatedOrder, GatewayOrderState, OrderRequest, PaymentGateway, PaymentRepo, RevenueSummary,
    SubscriptionRepo,
};
use crate::application::use_cases::chat::{
    ChatRepo, ChatTurn, Completion, CompletionClient, TokenUsage,
};
use crate::domain::entities::chat::{ChatMessage, ChatSession};
use crate::domain::entities::payment::{Payment, PaymentStatus};
use crate::domain::entities::role::RoleName;
use crate::domain::entities::subscription::Subscription;
use crate::domain::entities::user::{NewUser, UserProfile};

pub const ADMIN_ROLE_ID: Uuid = Uuid::from_u128(0xA);
pub const USER_ROLE_ID: Uuid = Uuid::from_u128(0xB);
pub const MODERATOR_ROLE_ID: Uuid = Uuid::from_u128(0xC);
pub const SUPPORT_ROLE_ID: Uuid = Uuid::from_u128(0xD);

fn role_for_id(role_id: Uuid) -> RoleName {
    if role_id == ADMIN_ROLE_ID {
        RoleName::Admin
    } else if role_id == MODERATOR_ROLE_ID {
        RoleName::Moderator
    } else if role_id == SUPPORT_ROLE_ID {
        RoleName::Support
    } else {
        RoleName::User
    }
}

struct UserRecord {
    profile: UserProfile,
    password_hash: Option<String>,
    email_token: Option<(String, NaiveDateTime)>,
    phone_code: Option<(String, NaiveDateTime)>,
    reset_token: Option<(String, NaiveDateTime)>,
}

#[derive(Default)]
pub struct InMemoryUserRepo {
    users: Mutex<Vec<UserRecord>>,
}

impl InMemoryUserRepo {
    /// Seeds a user directly, bypassing registration.
    pub async fn insert(&self, profile: UserProfile) -> UserProfile {
        self.users.lock().unwrap().push(UserRecord {
            profile: profile.clone(),
            password_hash: None,
            email_token: None,
            phone_code: None,
            reset_token: None,
        });
        profile
    }

    fn with_user<T>(&self, id: Uuid, f: impl FnOnce(&mut UserRecord) -> T) -> AppResult<T> {
        let mut users = self.users.lock().unwrap();
        let record = users
            .iter_mut()
            .find(|r| r.profile.id == id)
            .ok_or(AppError::NotFound)?;
        Ok(f(record))
    }

    fn matches(profile: &UserProfile, search: Option<&str>) -> bool {
        let Some(needle) = search else {
            return true;
        };
        let needle = needle.to_lowercase();
        profile.email.to_lowercase().contains(&needle)
            || profile.first_name.to_lowercase().contains(&needle)
            || profile.last_name.to_lowercase().contains(&needle)
    }
}

#[async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn create(&self, user: NewUser, role_id: Uuid) -> AppResult<UserProfile> {
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|r| r.profile.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(AppError::Validation(vec![FieldError::new(
                "email",
                "Этот email уже зарегистрирован.",
            )]));
        }
        if users.iter().any(|r| r.profile.phone.as_deref() == Some(user.phone.as_str())) {
            return Err(AppError::Validation(vec![FieldError::new(
                "phone",
                "Этот номер телефона уже зарегистрирован.",
            )]));
        }

        let now = Utc::now().naive_utc();
        let profile = UserProfile {
            id: Uuid::new_v4(),
            email: user.email,
            phone: Some(user.phone).filter(|p| !p.is_empty()),
            first_name: user.first_name,
            last_name: user.last_name,
            gender: user.gender,
            birthday: user.birthday,
            role_name: Some(role_for_id(role_id)),
            tts_enabled_default: None,
            is_email_verified: false,
            is_phone_verified: false,
            subscription_id: None,
            customer_id: None,
            subscription_status: crate::domain::entities::subscription::SubscriptionStatus::Inactive,
            subscription_end_date: None,
            current_period_end: None,
            tokens_used_input_this_period: 0,
            tokens_used_output_this_period: 0,
            billing_cycle_anchor: None,
            created_at: now,
            updated_at: now,
        };
        users.push(UserRecord {
            profile: profile.clone(),
            password_hash: Some(user.password_hash),
            email_token: None,
            phone_code: None,
            reset_token: None,
        });
        Ok(profile)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.profile.id == id)
            .map(|r| r.profile.clone()))
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<UserProfile>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.profile.email.eq_ignore_ascii_case(email))
            .map(|r| r.profile.clone()))
    }

    async fn password_hash_by_id(&self, user_id: Uuid) -> AppResult<Option<String>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.profile.id == user_id)
            .and_then(|r| r.password_hash.clone()))
    }

    async fn set_email_verification(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.email_token = Some((token_hash.to_string(), expires_at));
        })
    }

    async fn verify_email(
        &self,
        token_hash: &str,
        now: NaiveDateTime,
    ) -> AppResult<EmailVerificationOutcome> {
        let mut users = self.users.lock().unwrap();
        let Some(record) = users
            .iter_mut()
            .find(|r| matches!(&r.email_token, Some((hash, _)) if hash == token_hash))
        else {
            return Ok(EmailVerificationOutcome::InvalidOrExpired);
        };
        if record.profile.is_email_verified {
            return Ok(EmailVerificationOutcome::AlreadyVerified);
        }
        let (_, expires_at) = record.email_token.as_ref().unwrap();
        if *expires_at <= now {
            return Ok(EmailVerificationOutcome::InvalidOrExpired);
        }
        record.profile.is_email_verified = true;
        record.email_token = None;
        Ok(EmailVerificationOutcome::Verified)
    }

    async fn set_phone_code(
        &self,
        user_id: Uuid,
        code: &str,
        expires_at: NaiveDateTime,
    ) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.phone_code = Some((code.to_string(), expires_at));
        })
    }

    async fn phone_code(&self, user_id: Uuid) -> AppResult<Option<(String, NaiveDateTime)>> {
        self.with_user(user_id, |r| r.phone_code.clone())
    }

    async fn mark_phone_verified(&self, user_id: Uuid) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.profile.is_phone_verified = true;
            r.phone_code = None;
        })
    }

    async fn clear_phone_verification(&self, user_id: Uuid) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.profile.is_phone_verified = false;
            r.phone_code = None;
        })
    }

    async fn set_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.reset_token = Some((token_hash.to_string(), expires_at));
        })
    }

    async fn consume_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let mut users = self.users.lock().unwrap();
        let Some(record) = users.iter_mut().find(
            |r| matches!(&r.reset_token, Some((hash, expires)) if hash == token_hash && *expires > now),
        ) else {
            return Ok(false);
        };
        record.password_hash = Some(new_password_hash.to_string());
        record.reset_token = None;
        Ok(true)
    }

    async fn update_password(&self, user_id: Uuid, new_password_hash: &str) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.password_hash = Some(new_password_hash.to_string());
        })
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
        phone: &str,
    ) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.profile.first_name = first_name.to_string();
            r.profile.last_name = last_name.to_string();
            r.profile.phone = Some(phone.to_string()).filter(|p| !p.is_empty());
        })
    }

    async fn update_tts_default(&self, user_id: Uuid, enabled: bool) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.profile.tts_enabled_default = Some(enabled);
        })
    }

    async fn set_role(&self, user_id: Uuid, role_id: Uuid) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.profile.role_name = Some(role_for_id(role_id));
        })
    }

    async fn admin_update(&self, user_id: Uuid, update: &AdminUserUpdate) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.profile.first_name = update.first_name.clone();
            r.profile.last_name = update.last_name.clone();
            r.profile.role_name = Some(update.role);
            r.profile.subscription_status = update.subscription_status;
            r.profile.is_email_verified = update.is_email_verified;
        })
    }

    async fn increment_token_usage(
        &self,
        user_id: Uuid,
        input_tokens: i64,
        output_tokens: i64,
    ) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.profile.tokens_used_input_this_period += input_tokens;
            r.profile.tokens_used_output_this_period += output_tokens;
        })
    }

    async fn reset_usage_if_anchor(
        &self,
        user_id: Uuid,
        expected_anchor: NaiveDateTime,
        new_anchor: NaiveDateTime,
    ) -> AppResult<bool> {
        self.with_user(user_id, |r| {
            if r.profile.billing_cycle_anchor != Some(expected_anchor) {
                return false;
            }
            r.profile.tokens_used_input_this_period = 0;
            r.profile.tokens_used_output_this_period = 0;
            r.profile.billing_cycle_anchor = Some(new_anchor);
            true
        })
    }

    async fn apply_subscription_state(
        &self,
        user_id: Uuid,
        update: &SubscriptionStateUpdate,
    ) -> AppResult<()> {
        self.with_user(user_id, |r| {
            r.profile.subscription_id = update.subscription_id.clone();
            if update.customer_id.is_some() {
                r.profile.customer_id = update.customer_id.clone();
            }
            r.profile.subscription_status = update.status;
            r.profile.subscription_end_date = update.end_date;
            r.profile.current_period_end = update.current_period_end;
            if let Some(anchor) = update.new_billing_anchor {
                r.profile.tokens_used_input_this_period = 0;
                r.profile.tokens_used_output_this_period = 0;
                r.profile.billing_cycle_anchor = Some(anchor);
            }
        })
    }

    async fn list(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<UserProfile>> {
        let mut profiles: Vec<UserProfile> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|r| Self::matches(&r.profile, search))
            .map(|r| r.profile.clone())
            .collect();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, search: Option<&str>) -> AppResult<i64> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|r| Self::matches(&r.profile, search))
            .count() as i64)
    }

    async fn cleanup_expired_tokens(&self, now: NaiveDateTime) -> AppResult<TokenCleanupCounts> {
        let mut counts = TokenCleanupCounts::default();
        for record in self.users.lock().unwrap().iter_mut() {
            if matches!(&record.email_token, Some((_, expires)) if *expires <= now) {
                record.email_token = None;
                counts.email_tokens += 1;
            }
            if matches!(&record.phone_code, Some((_, expires)) if *expires <= now) {
                record.phone_code = None;
                counts.phone_codes += 1;
            }
            if matches!(&record.reset_token, Some((_, expires)) if *expires <= now) {
                record.reset_token = None;
                counts.reset_tokens += 1;
            }
        }
        Ok(counts)
    }
}

#[derive(Default)]
pub struct InMemoryRoleRepo;

#[async_trait]
impl RoleRepo for InMemoryRoleRepo {
    async fn ensure_default_roles(&self) -> AppResult<()> {
        Ok(())
    }

    async fn id_by_name(&self, name: RoleName) -> AppResult<Uuid> {
        Ok(match name {
            RoleName::Admin => ADMIN_ROLE_ID,
            RoleName::User => USER_ROLE_ID,
            RoleName::Moderator => MODERATOR_ROLE_ID,
            RoleName::Support => SUPPORT_ROLE_ID,
        })
    }
}

#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<(String, String, String)>>,
    fail_next: Mutex<bool>,
}

impl RecordingEmailSender {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Makes the next send return an upstream error.
    pub fn fail_next_send(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    /// Extracts the raw token from the most recent email's link.
    pub fn last_token(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let (_, _, html) = sent.last()?;
        let start = html.find("token=")? + "token=".len();
        let rest = &html[start..];
        let end = rest.find(['"', '<', '&']).unwrap_or(rest.len());
        Some(rest[..end].to_string())
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<()> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(AppError::Upstream("email gateway unavailable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), html.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSmsSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSmsSender {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// The six-digit code in the most recent SMS.
    pub fn last_code(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let (_, text) = sent.last()?;
        text.split(|c: char| !c.is_ascii_digit())
            .find(|chunk| chunk.len() == 6)
            .map(str::to_string)
    }
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send(&self, to_phone: &str, text: &str) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to_phone.to_string(), text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryChatRepo {
    sessions: Mutex<Vec<ChatSession>>,
    chat_messages: Mutex<Vec<ChatMessage>>,
}

impl InMemoryChatRepo {
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().unwrap().is_empty() && self.chat_messages.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl ChatRepo for InMemoryChatRepo {
    async fn create_session(
        &self,
        user_id: Uuid,
        uuid: Uuid,
        title: &str,
    ) -> AppResult<ChatSession> {
        let now = Utc::now().naive_utc();
        let session = ChatSession {
            uuid,
            user_id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    async fn session(&self, uuid: Uuid) -> AppResult<Option<ChatSession>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.uuid == uuid)
            .cloned())
    }

    async fn list_sessions(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<ChatSession>> {
        let mut sessions: Vec<ChatSession> = self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(limit.max(0) as usize);
        Ok(sessions)
    }

    async fn messages(&self, session_uuid: Uuid, limit: i64) -> AppResult<Vec<ChatMessage>> {
        let all: Vec<ChatMessage> = self
            .chat_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_session_uuid == session_uuid)
            .cloned()
            .collect();
        let skip = all.len().saturating_sub(limit.max(0) as usize);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn save_message(
        &self,
        user_id: Uuid,
        session_uuid: Uuid,
        prompt: &str,
        response: &str,
    ) -> AppResult<()> {
        self.chat_messages.lock().unwrap().push(ChatMessage {
            id: Uuid::new_v4(),
            chat_session_uuid: session_uuid,
            user_id,
            prompt: prompt.to_string(),
            response: response.to_string(),
            created_at: Utc::now().naive_utc(),
        });
        if let Some(session) = self
            .sessions
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.uuid == session_uuid)
        {
            session.updated_at = Utc::now().naive_utc();
        }
        Ok(())
    }
}

struct CompletionCall {
    system_prompt: String,
    user_prompt: String,
    quick: bool,
}

/// Completion double that always answers with a fixed reply and records
/// what it was asked.
pub struct ScriptedCompletionClient {
    reply: String,
    calls: Mutex<Vec<CompletionCall>>,
}

impl ScriptedCompletionClient {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|c| c.system_prompt.clone())
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|c| c.user_prompt.clone())
    }

    pub fn last_was_quick(&self) -> bool {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|c| c.quick)
            .unwrap_or(false)
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        _history: &[ChatTurn],
        user_prompt: &str,
        quick: bool,
    ) -> AppResult<Completion> {
        self.calls.lock().unwrap().push(CompletionCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            quick,
        });
        Ok(Completion {
            content: self.reply.clone(),
            usage: Some(TokenUsage {
                input_tokens: 120,
                output_tokens: 80,
            }),
        })
    }
}

#[derive(Default)]
pub struct InMemoryPaymentRepo {
    payments: Mutex<Vec<Payment>>,
}

#[async_trait]
impl PaymentRepo for InMemoryPaymentRepo {
    async fn create(&self, payment: &Payment) -> AppResult<()> {
        self.payments.lock().unwrap().push(payment.clone());
        Ok(())
    }

    async fn set_gateway_info(
        &self,
        id: Uuid,
        gateway_order_id: Option<&str>,
        status: PaymentStatus,
    ) -> AppResult<()> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(AppError::NotFound)?;
        if let Some(order_id) = gateway_order_id {
            payment.gateway_order_id = Some(order_id.to_string());
        }
        payment.status = status;
        Ok(())
    }

    async fn get_by_gateway_order(&self, gateway_order_id: &str) -> AppResult<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn update_status_by_gateway_order(
        &self,
        gateway_order_id: &str,
        status: PaymentStatus,
    ) -> AppResult<bool> {
        let mut payments = self.payments.lock().unwrap();
        match payments
            .iter_mut()
            .find(|p| p.gateway_order_id.as_deref() == Some(gateway_order_id))
        {
            Some(payment) => {
                payment.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revenue_summary(&self) -> AppResult<RevenueSummary> {
        let payments = self.payments.lock().unwrap();
        let mut summary = RevenueSummary::default();
        for payment in payments.iter() {
            match payment.status {
                PaymentStatus::Success => {
                    summary.success_count += 1;
                    summary.total_success_amount += payment.amount;
                }
                PaymentStatus::Failed => summary.failed_count += 1,
                _ => {}
            }
        }
        Ok(summary)
    }

    async fn list_recent(&self, limit: i64) -> AppResult<Vec<Payment>> {
        let payments = self.payments.lock().unwrap();
        Ok(payments
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    subscriptions: Mutex<Vec<Subscription>>,
}

#[async_trait]
impl SubscriptionRepo for InMemorySubscriptionRepo {
    async fn upsert(&self, subscription: &Subscription) -> AppResult<()> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        match subscriptions
            .iter_mut()
            .find(|s| s.gateway_subscription_id == subscription.gateway_subscription_id)
        {
            Some(existing) => *existing = subscription.clone(),
            None => subscriptions.push(subscription.clone()),
        }
        Ok(())
    }

    async fn get_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.gateway_subscription_id == gateway_subscription_id)
            .cloned())
    }

    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id)
            .last()
            .cloned())
    }
}

/// Gateway double. Orders succeed by default; the reported order state is
/// scriptable per test.
pub struct StubPaymentGateway {
    fail_next_create: Mutex<bool>,
    order_state: Mutex<GatewayOrderState>,
    counter: AtomicU64,
}

impl Default for StubPaymentGateway {
    fn default() -> Self {
        Self {
            fail_next_create: Mutex::new(false),
            order_state: Mutex::new(GatewayOrderState::Other("created".into())),
            counter: AtomicU64::new(0),
        }
    }
}

impl StubPaymentGateway {
    pub fn fail_next_create(&self) {
        *self.fail_next_create.lock().unwrap() = true;
    }

    pub fn set_order_state(&self, state: GatewayOrderState) {
        *self.order_state.lock().unwrap() = state;
    }
}

#[async_trait]
impl PaymentGateway for StubPaymentGateway {
    async fn create_order(&self, _order: &OrderRequest) -> AppResult<CreatedOrder> {
        if std::mem::take(&mut *self.fail_next_create.lock().unwrap()) {
            return Err(AppError::Upstream("gateway unavailable".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedOrder {
            gateway_order_id: format!("ord-{n}"),
            payment_url: "https://pay.test/order".into(),
        })
    }

    async fn order_status(&self, _gateway_order_id: &str) -> AppResult<GatewayOrderState> {
        Ok(self.order_state.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepo {
    values: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl SettingsRepo for InMemorySettingsRepo {
    async fn all(&self) -> AppResult<Vec<(String, String)>> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn upsert(&self, key: &str, value: &str) -> AppResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Session store over a plain map, for wiring full routers in tests.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<BTreeMap<String, (SessionBag, NaiveDateTime)>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, token_hash: &str, now: NaiveDateTime) -> AppResult<Option<SessionBag>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .get(token_hash)
            .filter(|(_, expires)| *expires > now)
            .map(|(bag, _)| bag.clone()))
    }

    async fn create(
        &self,
        token_hash: &str,
        bag: &SessionBag,
        expires_at: NaiveDateTime,
    ) -> AppResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(token_hash.to_string(), (bag.clone(), expires_at));
        Ok(())
    }

    async fn update(&self, token_hash: &str, bag: &SessionBag) -> AppResult<()> {
        if let Some(entry) = self.sessions.lock().unwrap().get_mut(token_hash) {
            entry.0 = bag.clone();
        }
        Ok(())
    }

    async fn delete(&self, token_hash: &str) -> AppResult<()> {
        self.sessions.lock().unwrap().remove(token_hash);
        Ok(())
    }

    async fn delete_expired(&self, now: NaiveDateTime) -> AppResult<u64> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, (_, expires)| *expires > now);
        Ok((before - sessions.len()) as u64)
    }
}
