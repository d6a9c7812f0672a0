use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chrono::{Duration, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult, FieldError},
    application::password::{hash_password, verify_password},
    application::validators::{
        self, RegistrationForm, is_password_complex, is_valid_phone, sanitize_name,
    },
    domain::entities::{
        role::RoleName,
        subscription::SubscriptionStatus,
        user::{NewUser, UserProfile},
    },
};

pub const EMAIL_TOKEN_TTL_HOURS: i64 = 24;
pub const RESET_TOKEN_TTL_HOURS: i64 = 1;
pub const PHONE_CODE_TTL_MINUTES: i64 = 10;

/// Wholesale subscription-state mirror written by the billing flows.
#[derive(Debug, Clone)]
pub struct SubscriptionStateUpdate {
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub current_period_end: Option<NaiveDateTime>,
    /// When set, token counters go to zero and the anchor moves here.
    pub new_billing_anchor: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailVerificationOutcome {
    Verified,
    AlreadyVerified,
    InvalidOrExpired,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokenCleanupCounts {
    pub email_tokens: u64,
    pub phone_codes: u64,
    pub reset_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct AdminUserUpdate {
    pub first_name: String,
    pub last_name: String,
    pub role: RoleName,
    pub subscription_status: SubscriptionStatus,
    pub is_email_verified: bool,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, user: NewUser, role_id: Uuid) -> AppResult<UserProfile>;
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>>;
    async fn get_by_email(&self, email: &str) -> AppResult<Option<UserProfile>>;
    async fn password_hash_by_id(&self, user_id: Uuid) -> AppResult<Option<String>>;

    async fn set_email_verification(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> AppResult<()>;
    async fn verify_email(
        &self,
        token_hash: &str,
        now: NaiveDateTime,
    ) -> AppResult<EmailVerificationOutcome>;

    async fn set_phone_code(
        &self,
        user_id: Uuid,
        code: &str,
        expires_at: NaiveDateTime,
    ) -> AppResult<()>;
    async fn phone_code(&self, user_id: Uuid) -> AppResult<Option<(String, NaiveDateTime)>>;
    async fn mark_phone_verified(&self, user_id: Uuid) -> AppResult<()>;
    async fn clear_phone_verification(&self, user_id: Uuid) -> AppResult<()>;

    async fn set_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> AppResult<()>;
    /// Consumes the token and writes the new hash in one statement.
    /// Returns false when the token is unknown or expired.
    async fn consume_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: NaiveDateTime,
    ) -> AppResult<bool>;
    async fn update_password(&self, user_id: Uuid, new_password_hash: &str) -> AppResult<()>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
        phone: &str,
    ) -> AppResult<()>;
    async fn update_tts_default(&self, user_id: Uuid, enabled: bool) -> AppResult<()>;
    async fn set_role(&self, user_id: Uuid, role_id: Uuid) -> AppResult<()>;
    async fn admin_update(&self, user_id: Uuid, update: &AdminUserUpdate) -> AppResult<()>;

    async fn increment_token_usage(
        &self,
        user_id: Uuid,
        input_tokens: i64,
        output_tokens: i64,
    ) -> AppResult<()>;
    /// Zeroes the counters only if the anchor still matches `expected_anchor`,
    /// so concurrent requests reset at most once.
    async fn reset_usage_if_anchor(
        &self,
        user_id: Uuid,
        expected_anchor: NaiveDateTime,
        new_anchor: NaiveDateTime,
    ) -> AppResult<bool>;
    async fn apply_subscription_state(
        &self,
        user_id: Uuid,
        update: &SubscriptionStateUpdate,
    ) -> AppResult<()>;

    async fn list(&self, search: Option<&str>, limit: i64, offset: i64)
    -> AppResult<Vec<UserProfile>>;
    async fn count(&self, search: Option<&str>) -> AppResult<i64>;

    async fn cleanup_expired_tokens(&self, now: NaiveDateTime) -> AppResult<TokenCleanupCounts>;
}

#[async_trait]
pub trait RoleRepo: Send + Sync {
    async fn ensure_default_roles(&self) -> AppResult<()>;
    async fn id_by_name(&self, name: RoleName) -> AppResult<Uuid>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<()>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to_phone: &str, text: &str) -> AppResult<()>;
}

#[derive(Debug)]
pub enum RegistrationOutcome {
    Created(UserProfile),
    /// Honeypot tripped: pretend success, create nothing.
    SilentlyDropped,
}

#[derive(Clone)]
pub struct AuthUseCases {
    users: Arc<dyn UserRepo>,
    roles: Arc<dyn RoleRepo>,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    base_url: String,
}

impl AuthUseCases {
    pub fn new(
        users: Arc<dyn UserRepo>,
        roles: Arc<dyn RoleRepo>,
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
        base_url: String,
    ) -> Self {
        Self {
            users,
            roles,
            email,
            sms,
            base_url,
        }
    }

    #[instrument(skip(self, form))]
    pub async fn register(&self, form: RegistrationForm) -> AppResult<RegistrationOutcome> {
        if !form.website.is_empty() {
            warn!("Honeypot field filled, dropping registration attempt");
            return Ok(RegistrationOutcome::SilentlyDropped);
        }

        let errors = validators::validate_registration(&form);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let password_hash = hash_password(&form.password)?;
        let role_id = self.roles.id_by_name(RoleName::User).await?;

        let user = self
            .users
            .create(
                NewUser {
                    email: form.email.trim().to_lowercase(),
                    phone: form.phone.trim().to_string(),
                    password_hash,
                    first_name: sanitize_name(&form.first_name),
                    last_name: sanitize_name(&form.last_name),
                    gender: form.gender.clone(),
                    birthday: form.birthday.trim().to_string(),
                },
                role_id,
            )
            .await?;

        info!(user_id = %user.id, "User registered");

        // The account exists either way; a dead email gateway must not fail
        // the registration. The user can request a resend later.
        if let Err(e) = self.issue_email_verification(&user).await {
            warn!(user_id = %user.id, error = %e, "Verification email send failed");
        }
        self.issue_phone_code(user.id, user.phone.as_deref().unwrap_or_default())
            .await?;

        Ok(RegistrationOutcome::Created(user))
    }

    /// Generic `InvalidCredentials` for both unknown email and bad password;
    /// a verified account is required before login completes.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> AppResult<UserProfile> {
        let normalized = email.trim().to_lowercase();
        let user = self
            .users
            .get_by_email(&normalized)
            .await?
            .ok_or(AppError::InvalidCredentials)?;
        let stored_hash = self
            .users
            .password_hash_by_id(user.id)
            .await?
            .ok_or(AppError::InvalidCredentials)?;
        if !verify_password(password, &stored_hash) {
            return Err(AppError::InvalidCredentials);
        }
        if !user.is_email_verified {
            return Err(AppError::EmailNotVerified);
        }
        Ok(user)
    }

    async fn issue_email_verification(&self, user: &UserProfile) -> AppResult<()> {
        let raw = generate_token();
        let expires_at = Utc::now().naive_utc() + Duration::hours(EMAIL_TOKEN_TTL_HOURS);
        self.users
            .set_email_verification(user.id, &hash_token(&raw), expires_at)
            .await?;

        let link = format!("{}/verify-email?token={}", self.base_url, raw);
        self.email
            .send(
                &user.email,
                "Подтвердите ваш email",
                &format!(
                    "<p>Здравствуйте, {}!</p>\
                     <p>Для завершения регистрации перейдите по ссылке: \
                     <a href=\"{link}\">подтвердить email</a>.</p>\
                     <p>Ссылка действительна {EMAIL_TOKEN_TTL_HOURS} часа.</p>",
                    user.first_name
                ),
            )
            .await
    }

    /// Always reports success so the endpoint cannot be used to probe
    /// which emails are registered.
    #[instrument(skip(self))]
    pub async fn resend_verification_email(&self, email: &str) -> AppResult<()> {
        let normalized = email.trim().to_lowercase();
        match self.users.get_by_email(&normalized).await? {
            Some(user) if !user.is_email_verified => self.issue_email_verification(&user).await,
            _ => Ok(()),
        }
    }

    pub async fn verify_email(&self, raw_token: &str) -> AppResult<EmailVerificationOutcome> {
        self.users
            .verify_email(&hash_token(raw_token), Utc::now().naive_utc())
            .await
    }

    async fn issue_phone_code(&self, user_id: Uuid, phone: &str) -> AppResult<()> {
        if phone.is_empty() {
            return Ok(());
        }
        let code = generate_sms_code();
        let expires_at = Utc::now().naive_utc() + Duration::minutes(PHONE_CODE_TTL_MINUTES);
        self.users.set_phone_code(user_id, &code, expires_at).await?;
        self.sms
            .send(phone, &format!("Ваш код подтверждения: {code}"))
            .await
    }

    pub async fn resend_phone_code(&self, user_id: Uuid) -> AppResult<()> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if user.is_phone_verified {
            return Ok(());
        }
        self.issue_phone_code(user.id, user.phone.as_deref().unwrap_or_default())
            .await
    }

    #[instrument(skip(self, code))]
    pub async fn verify_phone(&self, user_id: Uuid, code: &str) -> AppResult<()> {
        let Some((stored_code, expires_at)) = self.users.phone_code(user_id).await? else {
            return Err(AppError::InvalidInput(
                "Код подтверждения не запрошен.".into(),
            ));
        };
        if expires_at < Utc::now().naive_utc() {
            return Err(AppError::InvalidInput(
                "Срок действия кода истек. Запросите новый.".into(),
            ));
        }
        if stored_code != code.trim() {
            return Err(AppError::InvalidInput("Неверный код подтверждения.".into()));
        }
        self.users.mark_phone_verified(user_id).await?;
        info!(%user_id, "Phone verified");
        Ok(())
    }

    /// Anti-enumeration: succeeds whether or not the email exists.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        let normalized = email.trim().to_lowercase();
        let Some(user) = self.users.get_by_email(&normalized).await? else {
            return Ok(());
        };

        let raw = generate_token();
        let expires_at = Utc::now().naive_utc() + Duration::hours(RESET_TOKEN_TTL_HOURS);
        self.users
            .set_password_reset(user.id, &hash_token(&raw), expires_at)
            .await?;

        let link = format!("{}/reset-password?token={}", self.base_url, raw);
        self.email
            .send(
                &user.email,
                "Сброс пароля",
                &format!(
                    "<p>Для сброса пароля перейдите по ссылке: \
                     <a href=\"{link}\">сбросить пароль</a>.</p>\
                     <p>Ссылка действительна {RESET_TOKEN_TTL_HOURS} час. Если вы не запрашивали \
                     сброс, проигнорируйте это письмо.</p>"
                ),
            )
            .await
    }

    pub async fn reset_password(
        &self,
        raw_token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> AppResult<()> {
        validate_new_password(new_password, confirm_password)?;
        let new_hash = hash_password(new_password)?;
        let consumed = self
            .users
            .consume_password_reset(&hash_token(raw_token), &new_hash, Utc::now().naive_utc())
            .await?;
        if !consumed {
            return Err(AppError::InvalidInput(
                "Ссылка для сброса пароля недействительна или истекла.".into(),
            ));
        }
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> AppResult<()> {
        let stored_hash = self
            .users
            .password_hash_by_id(user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !verify_password(current_password, &stored_hash) {
            return Err(AppError::InvalidCredentials);
        }
        validate_new_password(new_password, confirm_password)?;
        self.users
            .update_password(user_id, &hash_password(new_password)?)
            .await
    }

    /// A changed phone number drops verification and triggers a new code.
    #[instrument(skip(self))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
        phone: &str,
    ) -> AppResult<()> {
        let mut errors = Vec::new();
        let first_name = sanitize_name(first_name);
        let last_name = sanitize_name(last_name);
        if first_name.is_empty() {
            errors.push(FieldError::new(
                "first_name",
                "Поле может содержать только буквы, пробелы и дефисы.",
            ));
        }
        if last_name.is_empty() {
            errors.push(FieldError::new(
                "last_name",
                "Поле может содержать только буквы, пробелы и дефисы.",
            ));
        }
        let phone = phone.trim();
        if !is_valid_phone(phone) {
            errors.push(FieldError::new(
                "phone",
                "Введите корректный номер телефона (например, +7XXXXXXXXXX).",
            ));
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let phone_changed = user.phone.as_deref() != Some(phone);

        self.users
            .update_profile(user_id, &first_name, &last_name, phone)
            .await?;

        if phone_changed {
            self.users.clear_phone_verification(user_id).await?;
            self.issue_phone_code(user_id, phone).await?;
        }
        Ok(())
    }

    pub async fn update_settings(&self, user_id: Uuid, tts_enabled: bool) -> AppResult<()> {
        self.users.update_tts_default(user_id, tts_enabled).await
    }

    /// Startup hook: seeds the role table and applies FIRST_ADMIN_EMAIL.
    pub async fn bootstrap(&self, first_admin_email: Option<&str>) -> AppResult<()> {
        self.roles.ensure_default_roles().await?;
        if let Some(email) = first_admin_email {
            self.promote_first_admin(email).await?;
        }
        Ok(())
    }

    /// Grants the admin role to the configured first admin.
    pub async fn promote_first_admin(&self, email: &str) -> AppResult<()> {
        let Some(user) = self.users.get_by_email(&email.trim().to_lowercase()).await? else {
            warn!(email, "FIRST_ADMIN_EMAIL set but no such user exists yet");
            return Ok(());
        };
        if user.is_admin() {
            return Ok(());
        }
        let admin_role = self.roles.id_by_name(RoleName::Admin).await?;
        self.users.set_role(user.id, admin_role).await?;
        info!(user_id = %user.id, "Promoted first admin");
        Ok(())
    }

    pub async fn cleanup_expired_tokens(&self) -> AppResult<TokenCleanupCounts> {
        self.users
            .cleanup_expired_tokens(Utc::now().naive_utc())
            .await
    }
}

fn validate_new_password(new_password: &str, confirm_password: &str) -> AppResult<()> {
    let mut errors = Vec::new();
    if new_password.chars().count() < validators::MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!(
                "Минимальная длина этого поля: {} символов.",
                validators::MIN_PASSWORD_LEN
            ),
        ));
    } else if !is_password_complex(new_password) {
        errors.push(FieldError::new(
            "password",
            "Пароль должен содержать буквы, цифры и символы.",
        ));
    }
    if new_password != confirm_password {
        errors.push(FieldError::new(
            "confirm_password",
            "Значение должно совпадать с полем password.",
        ));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Only the sha256 of a token is stored; a leaked table cannot be replayed.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn generate_sms_code() -> String {
    use rand::Rng;
    let code: u32 = rand::rngs::OsRng.gen_range(0..1_000_000);
    format!("{code:06}")
}
