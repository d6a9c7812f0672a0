use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::auth::{AdminUserUpdate, UserRepo},
    application::use_cases::billing::{PaymentRepo, RevenueSummary},
    application::validators::sanitize_name,
    domain::entities::{payment::Payment, user::UserProfile},
};

pub const USERS_PAGE_SIZE: i64 = 50;
const RECENT_PAYMENTS_LIMIT: i64 = 20;

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn all(&self) -> AppResult<Vec<(String, String)>>;
    async fn upsert(&self, key: &str, value: &str) -> AppResult<()>;
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<UserProfile>,
    pub total: i64,
    pub page: i64,
}

#[derive(Debug, Serialize)]
pub struct RevenueReport {
    pub total_users: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub total_success_amount: i64,
    pub recent_payments: Vec<Payment>,
}

#[derive(Clone)]
pub struct AdminUseCases {
    users: Arc<dyn UserRepo>,
    payments: Arc<dyn PaymentRepo>,
    settings: Arc<dyn SettingsRepo>,
}

impl AdminUseCases {
    pub fn new(
        users: Arc<dyn UserRepo>,
        payments: Arc<dyn PaymentRepo>,
        settings: Arc<dyn SettingsRepo>,
    ) -> Self {
        Self {
            users,
            payments,
            settings,
        }
    }

    /// Page numbers are 1-based; search matches email and name columns.
    pub async fn list_users(&self, search: Option<&str>, page: i64) -> AppResult<UserPage> {
        let page = page.max(1);
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let users = self
            .users
            .list(search, USERS_PAGE_SIZE, (page - 1) * USERS_PAGE_SIZE)
            .await?;
        let total = self.users.count(search).await?;
        Ok(UserPage { users, total, page })
    }

    pub async fn get_user(&self, user_id: Uuid) -> AppResult<UserProfile> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    #[instrument(skip(self, update))]
    pub async fn update_user(&self, user_id: Uuid, mut update: AdminUserUpdate) -> AppResult<()> {
        // Target must exist so a typo'd id fails loudly.
        self.get_user(user_id).await?;
        update.first_name = sanitize_name(&update.first_name);
        update.last_name = sanitize_name(&update.last_name);
        if update.first_name.is_empty() || update.last_name.is_empty() {
            return Err(AppError::InvalidInput(
                "Имя и фамилия не могут быть пустыми.".into(),
            ));
        }
        self.users.admin_update(user_id, &update).await?;
        info!(%user_id, role = update.role.as_str(), "User updated by admin");
        Ok(())
    }

    pub async fn revenue_report(&self) -> AppResult<RevenueReport> {
        let RevenueSummary {
            success_count,
            failed_count,
            total_success_amount,
        } = self.payments.revenue_summary().await?;
        Ok(RevenueReport {
            total_users: self.users.count(None).await?,
            success_count,
            failed_count,
            total_success_amount,
            recent_payments: self.payments.list_recent(RECENT_PAYMENTS_LIMIT).await?,
        })
    }

    pub async fn settings(&self) -> AppResult<Vec<(String, String)>> {
        self.settings.all().await
    }

    pub async fn update_setting(&self, key: &str, value: &str) -> AppResult<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::InvalidInput("Ключ настройки пуст.".into()));
        }
        self.settings.upsert(key, value).await?;
        info!(key, "Setting updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::role::RoleName;
    use crate::domain::entities::subscription::SubscriptionStatus;
    use crate::test_utils::{
        InMemoryPaymentRepo, InMemorySettingsRepo, InMemoryUserRepo, test_user,
    };

    fn admin_stack() -> (AdminUseCases, Arc<InMemoryUserRepo>, Arc<InMemorySettingsRepo>) {
        let users = Arc::new(InMemoryUserRepo::default());
        let payments = Arc::new(InMemoryPaymentRepo::default());
        let settings = Arc::new(InMemorySettingsRepo::default());
        (
            AdminUseCases::new(users.clone(), payments, settings.clone()),
            users,
            settings,
        )
    }

    #[tokio::test]
    async fn list_users_paginates_and_counts() {
        let (admin, users, _) = admin_stack();
        for _ in 0..3 {
            users.insert(test_user()).await;
        }
        let page = admin.list_users(None, 1).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.users.len(), 3);
        // Page below 1 clamps.
        let page = admin.list_users(None, -5).await.unwrap();
        assert_eq!(page.page, 1);
    }

    #[tokio::test]
    async fn search_filters_by_email() {
        let (admin, users, _) = admin_stack();
        let mut target = test_user();
        target.email = "needle@example.kz".into();
        users.insert(target).await;
        users.insert(test_user()).await;

        let page = admin.list_users(Some("needle"), 1).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.users[0].email, "needle@example.kz");
    }

    #[tokio::test]
    async fn update_user_applies_role_and_status() {
        let (admin, users, _) = admin_stack();
        let user = users.insert(test_user()).await;

        admin
            .update_user(
                user.id,
                AdminUserUpdate {
                    first_name: "Аружан".into(),
                    last_name: "Ахметова".into(),
                    role: RoleName::Admin,
                    subscription_status: SubscriptionStatus::Active,
                    is_email_verified: true,
                },
            )
            .await
            .unwrap();

        let stored = users.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.role_name, Some(RoleName::Admin));
        assert_eq!(stored.subscription_status, SubscriptionStatus::Active);
        assert!(stored.is_email_verified);
    }

    #[tokio::test]
    async fn update_unknown_user_is_not_found() {
        let (admin, _, _) = admin_stack();
        let err = admin
            .update_user(
                Uuid::new_v4(),
                AdminUserUpdate {
                    first_name: "А".into(),
                    last_name: "Б".into(),
                    role: RoleName::User,
                    subscription_status: SubscriptionStatus::Inactive,
                    is_email_verified: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let (admin, _, _) = admin_stack();
        admin.update_setting("maintenance_banner", "завтра работы").await.unwrap();
        admin.update_setting("maintenance_banner", "обновлено").await.unwrap();
        let all = admin.settings().await.unwrap();
        assert_eq!(
            all,
            vec![("maintenance_banner".to_string(), "обновлено".to_string())]
        );
        assert!(admin.update_setting("  ", "x").await.is_err());
    }
}
