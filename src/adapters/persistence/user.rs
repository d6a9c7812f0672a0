use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::application::use_cases::auth::{
    AdminUserUpdate, EmailVerificationOutcome, SubscriptionStateUpdate, TokenCleanupCounts,
    UserRepo,
};
use crate::domain::entities::role::RoleName;
use crate::domain::entities::subscription::SubscriptionStatus;
use crate::domain::entities::user::{NewUser, UserProfile};

use super::PostgresPersistence;

const PROFILE_COLS: &str = "u.id, u.email, u.phone, u.first_name, u.last_name, u.gender, \
     u.birthday, r.name AS role_name, u.tts_enabled_default, u.is_email_verified, \
     u.is_phone_verified, u.subscription_id, u.customer_id, u.subscription_status, \
     u.subscription_end_date, u.current_period_end, u.tokens_used_input_this_period, \
     u.tokens_used_output_this_period, u.billing_cycle_anchor, u.created_at, u.updated_at";

fn row_to_profile(row: &PgRow) -> UserProfile {
    let role_name: Option<String> = row.get("role_name");
    let status: String = row.get("subscription_status");
    UserProfile {
        id: row.get("id"),
        email: row.get("email"),
        phone: row.get("phone"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        gender: row.get("gender"),
        birthday: row.get("birthday"),
        role_name: role_name.as_deref().and_then(RoleName::parse),
        tts_enabled_default: row.get("tts_enabled_default"),
        is_email_verified: row.get("is_email_verified"),
        is_phone_verified: row.get("is_phone_verified"),
        subscription_id: row.get("subscription_id"),
        customer_id: row.get("customer_id"),
        subscription_status: SubscriptionStatus::parse(&status),
        subscription_end_date: row.get("subscription_end_date"),
        current_period_end: row.get("current_period_end"),
        tokens_used_input_this_period: row.get("tokens_used_input_this_period"),
        tokens_used_output_this_period: row.get("tokens_used_output_this_period"),
        billing_cycle_anchor: row.get("billing_cycle_anchor"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl UserRepo for PostgresPersistence {
    async fn create(&self, user: NewUser, role_id: Uuid) -> AppResult<UserProfile> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users \
               (id, email, phone, password_hash, first_name, last_name, gender, birthday, role_id) \
             VALUES ($1, $2, NULLIF($3, ''), $4, $5, $6, $7, $8, $9)",
        )
        .bind(id)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.gender)
        .bind(&user.birthday)
        .bind(role_id)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLS} FROM users u \
             LEFT JOIN roles r ON r.id = u.role_id WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_profile(&row))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLS} FROM users u \
             LEFT JOIN roles r ON r.id = u.role_id WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLS} FROM users u \
             LEFT JOIN roles r ON r.id = u.role_id WHERE LOWER(u.email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn password_hash_by_id(&self, user_id: Uuid) -> AppResult<Option<String>> {
        let row = sqlx::query("SELECT password_hash FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("password_hash")))
    }

    async fn set_email_verification(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET email_verification_token = $2, \
               email_verification_token_expires_at = $3, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn verify_email(
        &self,
        token_hash: &str,
        now: NaiveDateTime,
    ) -> AppResult<EmailVerificationOutcome> {
        let result = sqlx::query(
            "UPDATE users SET is_email_verified = TRUE, email_verified_at = $2, \
               email_verification_token = NULL, email_verification_token_expires_at = NULL, \
               updated_at = CURRENT_TIMESTAMP \
             WHERE email_verification_token = $1 \
               AND email_verification_token_expires_at > $2 \
               AND NOT is_email_verified",
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(EmailVerificationOutcome::Verified);
        }

        // The token either never existed, expired, or belongs to an
        // account that is already verified.
        let row = sqlx::query(
            "SELECT is_email_verified FROM users WHERE email_verification_token = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) if r.get::<bool, _>("is_email_verified") => {
                Ok(EmailVerificationOutcome::AlreadyVerified)
            }
            _ => Ok(EmailVerificationOutcome::InvalidOrExpired),
        }
    }

    async fn set_phone_code(
        &self,
        user_id: Uuid,
        code: &str,
        expires_at: NaiveDateTime,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET phone_verification_code = $2, \
               phone_verification_code_expires_at = $3, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn phone_code(&self, user_id: Uuid) -> AppResult<Option<(String, NaiveDateTime)>> {
        let row = sqlx::query(
            "SELECT phone_verification_code, phone_verification_code_expires_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|r| {
            let code: Option<String> = r.get("phone_verification_code");
            let expires_at: Option<NaiveDateTime> = r.get("phone_verification_code_expires_at");
            code.zip(expires_at)
        }))
    }

    async fn mark_phone_verified(&self, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET is_phone_verified = TRUE, phone_verification_code = NULL, \
               phone_verification_code_expires_at = NULL, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_phone_verification(&self, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET is_phone_verified = FALSE, phone_verification_code = NULL, \
               phone_verification_code_expires_at = NULL, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET password_reset_token = $2, \
               password_reset_token_expires_at = $3, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, password_reset_token = NULL, \
               password_reset_token_expires_at = NULL, updated_at = CURRENT_TIMESTAMP \
             WHERE password_reset_token = $1 AND password_reset_token_expires_at > $3",
        )
        .bind(token_hash)
        .bind(new_password_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_password(&self, user_id: Uuid, new_password_hash: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
        phone: &str,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET first_name = $2, last_name = $3, phone = NULLIF($4, ''), \
               updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(first_name)
        .bind(last_name)
        .bind(phone)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_tts_default(&self, user_id: Uuid, enabled: bool) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET tts_enabled_default = $2, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_role(&self, user_id: Uuid, role_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET role_id = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn admin_update(&self, user_id: Uuid, update: &AdminUserUpdate) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET first_name = $2, last_name = $3, \
               role_id = (SELECT id FROM roles WHERE name = $4), \
               subscription_status = $5, is_email_verified = $6, \
               updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(update.role.as_str())
        .bind(update.subscription_status.as_str())
        .bind(update.is_email_verified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_token_usage(
        &self,
        user_id: Uuid,
        input_tokens: i64,
        output_tokens: i64,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET \
               tokens_used_input_this_period = tokens_used_input_this_period + $2, \
               tokens_used_output_this_period = tokens_used_output_this_period + $3, \
               updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(input_tokens)
        .bind(output_tokens)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_usage_if_anchor(
        &self,
        user_id: Uuid,
        expected_anchor: NaiveDateTime,
        new_anchor: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET tokens_used_input_this_period = 0, \
               tokens_used_output_this_period = 0, billing_cycle_anchor = $3, \
               updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1 AND billing_cycle_anchor = $2",
        )
        .bind(user_id)
        .bind(expected_anchor)
        .bind(new_anchor)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_subscription_state(
        &self,
        user_id: Uuid,
        update: &SubscriptionStateUpdate,
    ) -> AppResult<()> {
        if let Some(anchor) = update.new_billing_anchor {
            sqlx::query(
                "UPDATE users SET subscription_id = $2, \
                   customer_id = COALESCE($3, customer_id), subscription_status = $4, \
                   subscription_start_date = COALESCE($5, subscription_start_date), \
                   subscription_end_date = $6, current_period_end = $7, \
                   tokens_used_input_this_period = 0, tokens_used_output_this_period = 0, \
                   billing_cycle_anchor = $8, updated_at = CURRENT_TIMESTAMP \
                 WHERE id = $1",
            )
            .bind(user_id)
            .bind(&update.subscription_id)
            .bind(&update.customer_id)
            .bind(update.status.as_str())
            .bind(update.start_date)
            .bind(update.end_date)
            .bind(update.current_period_end)
            .bind(anchor)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE users SET subscription_id = $2, \
                   customer_id = COALESCE($3, customer_id), subscription_status = $4, \
                   subscription_start_date = COALESCE($5, subscription_start_date), \
                   subscription_end_date = $6, current_period_end = $7, \
                   updated_at = CURRENT_TIMESTAMP \
                 WHERE id = $1",
            )
            .bind(user_id)
            .bind(&update.subscription_id)
            .bind(&update.customer_id)
            .bind(update.status.as_str())
            .bind(update.start_date)
            .bind(update.end_date)
            .bind(update.current_period_end)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<UserProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROFILE_COLS} FROM users u \
             LEFT JOIN roles r ON r.id = u.role_id \
             WHERE ($1::TEXT IS NULL \
                OR u.email ILIKE '%' || $1 || '%' \
                OR u.first_name ILIKE '%' || $1 || '%' \
                OR u.last_name ILIKE '%' || $1 || '%') \
             ORDER BY u.created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(search)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_profile).collect())
    }

    async fn count(&self, search: Option<&str>) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM users u \
             WHERE ($1::TEXT IS NULL \
                OR u.email ILIKE '%' || $1 || '%' \
                OR u.first_name ILIKE '%' || $1 || '%' \
                OR u.last_name ILIKE '%' || $1 || '%')",
        )
        .bind(search)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    async fn cleanup_expired_tokens(&self, now: NaiveDateTime) -> AppResult<TokenCleanupCounts> {
        let email_tokens = sqlx::query(
            "UPDATE users SET email_verification_token = NULL, \
               email_verification_token_expires_at = NULL \
             WHERE email_verification_token IS NOT NULL \
               AND email_verification_token_expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let phone_codes = sqlx::query(
            "UPDATE users SET phone_verification_code = NULL, \
               phone_verification_code_expires_at = NULL \
             WHERE phone_verification_code IS NOT NULL \
               AND phone_verification_code_expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let reset_tokens = sqlx::query(
            "UPDATE users SET password_reset_token = NULL, \
               password_reset_token_expires_at = NULL \
             WHERE password_reset_token IS NOT NULL \
               AND password_reset_token_expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(TokenCleanupCounts {
            email_tokens,
            phone_codes,
            reset_tokens,
        })
    }
}
