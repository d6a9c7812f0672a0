use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::signing,
    application::use_cases::auth::{SubscriptionStateUpdate, UserRepo},
    domain::entities::{
        payment::{Payment, PaymentStatus},
        subscription::{Subscription, SubscriptionStatus},
        user::UserProfile,
    },
};

pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub merchant_order_id: String,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub customer_email: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub return_url: String,
}

#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub gateway_order_id: String,
    pub payment_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOrderState {
    /// Funds captured (single-stage scheme).
    Charged,
    /// Funds held (two-stage scheme); treated as paid.
    Authorized,
    Other(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, order: &OrderRequest) -> AppResult<CreatedOrder>;
    async fn order_status(&self, gateway_order_id: &str) -> AppResult<GatewayOrderState>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RevenueSummary {
    pub success_count: i64,
    pub failed_count: i64,
    /// Minor units, successful payments only.
    pub total_success_amount: i64,
}

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    async fn create(&self, payment: &Payment) -> AppResult<()>;
    async fn set_gateway_info(
        &self,
        id: Uuid,
        gateway_order_id: Option<&str>,
        status: PaymentStatus,
    ) -> AppResult<()>;
    async fn get_by_gateway_order(&self, gateway_order_id: &str) -> AppResult<Option<Payment>>;
    async fn update_status_by_gateway_order(
        &self,
        gateway_order_id: &str,
        status: PaymentStatus,
    ) -> AppResult<bool>;
    async fn revenue_summary(&self) -> AppResult<RevenueSummary>;
    async fn list_recent(&self, limit: i64) -> AppResult<Vec<Payment>>;
}

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn upsert(&self, subscription: &Subscription) -> AppResult<()>;
    async fn get_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<Subscription>>;
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>>;
}

/// Gateway notification body. JSON, signed with an HMAC of the raw bytes.
#[derive(Debug, Deserialize)]
pub struct WebhookNotification {
    pub order_id: String,
    #[serde(default)]
    pub payment_id: String,
    pub status: String,
    #[serde(default)]
    pub amount: i64,
}

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-signature";

#[derive(Clone)]
pub struct BillingConfig {
    pub plan_id: String,
    /// Minor units per month.
    pub monthly_amount: i64,
    pub currency: String,
    pub return_url: String,
    pub webhook_secret: SecretString,
}

#[derive(Clone)]
pub struct BillingUseCases {
    payments: Arc<dyn PaymentRepo>,
    subscriptions: Arc<dyn SubscriptionRepo>,
    users: Arc<dyn UserRepo>,
    gateway: Arc<dyn PaymentGateway>,
    config: BillingConfig,
}

impl BillingUseCases {
    pub fn new(
        payments: Arc<dyn PaymentRepo>,
        subscriptions: Arc<dyn SubscriptionRepo>,
        users: Arc<dyn UserRepo>,
        gateway: Arc<dyn PaymentGateway>,
        config: BillingConfig,
    ) -> Self {
        Self {
            payments,
            subscriptions,
            users,
            gateway,
            config,
        }
    }

    /// Creates a pending payment, registers the order with the gateway and
    /// returns the URL the user should be redirected to.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn create_payment(&self, user: &UserProfile) -> AppResult<String> {
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: user.id,
            amount: self.config.monthly_amount,
            currency: self.config.currency.clone(),
            status: PaymentStatus::Pending,
            gateway_name: "bcc".into(),
            gateway_order_id: None,
            description: format!("Оплата подписки: {}", self.config.plan_id),
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        };
        self.payments.create(&payment).await?;

        let order = OrderRequest {
            merchant_order_id: payment.id.to_string(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            description: payment.description.clone(),
            customer_email: user.email.clone(),
            customer_name: user.full_name(),
            customer_phone: user.phone.clone(),
            return_url: self.config.return_url.clone(),
        };

        let created = match self.gateway.create_order(&order).await {
            Ok(created) => created,
            Err(e) => {
                error!(payment_id = %payment.id, error = %e, "Gateway order creation failed");
                self.payments
                    .set_gateway_info(payment.id, None, PaymentStatus::Failed)
                    .await?;
                return Err(e);
            }
        };

        self.payments
            .set_gateway_info(
                payment.id,
                Some(&created.gateway_order_id),
                PaymentStatus::Processing,
            )
            .await?;

        info!(payment_id = %payment.id, gateway_order_id = %created.gateway_order_id, "Payment order created");
        Ok(created.payment_url)
    }

    /// Return-URL handler support: re-queries the gateway for the real
    /// order state instead of trusting redirect parameters.
    #[instrument(skip(self))]
    pub async fn confirm_return(&self, gateway_order_id: &str) -> AppResult<bool> {
        let state = self.gateway.order_status(gateway_order_id).await?;
        match state {
            GatewayOrderState::Charged | GatewayOrderState::Authorized => {
                let payment = self
                    .payments
                    .get_by_gateway_order(gateway_order_id)
                    .await?
                    .ok_or_else(|| {
                        error!(gateway_order_id, "Paid order has no matching payment record");
                        AppError::NotFound
                    })?;
                self.settle_successful_payment(&payment, gateway_order_id)
                    .await?;
                Ok(true)
            }
            GatewayOrderState::Other(status) => {
                warn!(gateway_order_id, status, "Order not paid on return");
                self.payments
                    .update_status_by_gateway_order(gateway_order_id, PaymentStatus::Failed)
                    .await?;
                Ok(false)
            }
        }
    }

    /// Signature verification is mandatory: unsigned or badly signed
    /// notifications are rejected before the body is even parsed.
    #[instrument(skip(self, raw_body, signature))]
    pub async fn process_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<()> {
        let Some(signature) = signature else {
            warn!("Webhook without signature rejected");
            return Err(AppError::Forbidden);
        };
        if !signing::verify_hex_hmac(
            self.config.webhook_secret.expose_secret().as_bytes(),
            raw_body,
            signature,
        ) {
            warn!("Webhook signature mismatch");
            return Err(AppError::Forbidden);
        }

        let notification: WebhookNotification = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::InvalidInput(format!("malformed webhook body: {e}")))?;

        match notification.status.as_str() {
            "charged" | "success" => {
                let payment = self
                    .payments
                    .get_by_gateway_order(&notification.order_id)
                    .await?
                    .ok_or_else(|| {
                        error!(order_id = %notification.order_id, "Webhook for unknown order");
                        AppError::NotFound
                    })?;
                self.settle_successful_payment(&payment, &notification.order_id)
                    .await
            }
            "failed" | "canceled" | "refunded" => {
                self.payments
                    .update_status_by_gateway_order(&notification.order_id, PaymentStatus::Failed)
                    .await?;
                info!(order_id = %notification.order_id, status = %notification.status, "Payment marked failed");
                Ok(())
            }
            other => {
                // Intermediate gateway states are acknowledged and ignored.
                info!(order_id = %notification.order_id, status = other, "Ignoring webhook status");
                Ok(())
            }
        }
    }

    /// Marks the payment successful, opens a fresh 30-day period and resets
    /// the user's token counters with a new billing anchor.
    async fn settle_successful_payment(
        &self,
        payment: &Payment,
        gateway_order_id: &str,
    ) -> AppResult<()> {
        if payment.status == PaymentStatus::Success {
            // Return-URL check and webhook can both land; settle once.
            return Ok(());
        }
        self.payments
            .update_status_by_gateway_order(gateway_order_id, PaymentStatus::Success)
            .await?;

        let now = Utc::now().naive_utc();
        let period_end = now + Duration::days(SUBSCRIPTION_PERIOD_DAYS);

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: payment.user_id,
            gateway_subscription_id: gateway_order_id.to_string(),
            plan_id: self.config.plan_id.clone(),
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date: None,
            current_period_start: now,
            current_period_end: period_end,
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        };
        self.subscriptions.upsert(&subscription).await?;

        self.users
            .apply_subscription_state(
                payment.user_id,
                &SubscriptionStateUpdate {
                    subscription_id: Some(gateway_order_id.to_string()),
                    customer_id: None,
                    status: SubscriptionStatus::Active,
                    start_date: Some(now),
                    end_date: None,
                    current_period_end: Some(period_end),
                    new_billing_anchor: Some(now),
                },
            )
            .await?;

        info!(user_id = %payment.user_id, gateway_order_id, "Subscription activated");
        Ok(())
    }

    /// Turns off auto-renewal. Both the subscription record and the user's
    /// mirror columns flip to canceled; the end date preserves whatever is
    /// left of the paid period.
    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: Uuid) -> AppResult<()> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let Some(gateway_subscription_id) = user.subscription_id.clone() else {
            return Err(AppError::InvalidInput(
                "У вас нет активной подписки для отмены.".into(),
            ));
        };

        let mut subscription = self
            .subscriptions
            .get_by_gateway_id(&gateway_subscription_id)
            .await?
            .ok_or_else(|| {
                error!(%user_id, gateway_subscription_id, "Subscription record missing on cancel");
                AppError::InvalidInput(
                    "Ошибка данных подписки. Свяжитесь с поддержкой.".into(),
                )
            })?;

        let now = Utc::now().naive_utc();
        subscription.status = SubscriptionStatus::Canceled;
        subscription.cancel_at_period_end = true;
        subscription.end_date = Some(subscription.current_period_end.max(now));
        subscription.updated_at = now;
        self.subscriptions.upsert(&subscription).await?;

        self.users
            .apply_subscription_state(
                user_id,
                &SubscriptionStateUpdate {
                    subscription_id: Some(gateway_subscription_id.clone()),
                    customer_id: None,
                    status: SubscriptionStatus::Canceled,
                    start_date: Some(subscription.start_date),
                    end_date: subscription.end_date,
                    current_period_end: Some(subscription.current_period_end),
                    new_billing_anchor: None,
                },
            )
            .await?;

        info!(%user_id, gateway_subscription_id, "Auto-renewal canceled");
        Ok(())
    }

    pub async fn subscription_for_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        self.subscriptions.get_by_user(user_id).await
    }
}
