use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::application::use_cases::billing::{PaymentRepo, RevenueSummary, SubscriptionRepo};
use crate::domain::entities::payment::{Payment, PaymentStatus};
use crate::domain::entities::subscription::{Subscription, SubscriptionStatus};

use super::PostgresPersistence;

const PAYMENT_COLS: &str = "id, user_id, amount, currency, status, gateway_name, \
     gateway_order_id, description, created_at, updated_at";

const SUBSCRIPTION_COLS: &str = "id, user_id, gateway_subscription_id, plan_id, status, \
     start_date, end_date, current_period_start, current_period_end, cancel_at_period_end, \
     created_at, updated_at";

fn row_to_payment(row: &PgRow) -> Payment {
    let status: String = row.get("status");
    Payment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status: PaymentStatus::parse(&status),
        gateway_name: row.get("gateway_name"),
        gateway_order_id: row.get("gateway_order_id"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_subscription(row: &PgRow) -> Subscription {
    let status: String = row.get("status");
    Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        gateway_subscription_id: row.get("gateway_subscription_id"),
        plan_id: row.get("plan_id"),
        status: SubscriptionStatus::parse(&status),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        cancel_at_period_end: row.get("cancel_at_period_end"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl PaymentRepo for PostgresPersistence {
    async fn create(&self, payment: &Payment) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO payments \
               (id, user_id, amount, currency, status, gateway_name, gateway_order_id, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.gateway_name)
        .bind(&payment.gateway_order_id)
        .bind(&payment.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_gateway_info(
        &self,
        id: Uuid,
        gateway_order_id: Option<&str>,
        status: PaymentStatus,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE payments SET gateway_order_id = COALESCE($2, gateway_order_id), \
               status = $3, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1",
        )
        .bind(id)
        .bind(gateway_order_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_gateway_order(&self, gateway_order_id: &str) -> AppResult<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLS} FROM payments WHERE gateway_order_id = $1"
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_payment))
    }

    async fn update_status_by_gateway_order(
        &self,
        gateway_order_id: &str,
        status: PaymentStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE payments SET status = $2, updated_at = CURRENT_TIMESTAMP \
             WHERE gateway_order_id = $1",
        )
        .bind(gateway_order_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revenue_summary(&self) -> AppResult<RevenueSummary> {
        let row = sqlx::query(
            "SELECT \
               COUNT(*) FILTER (WHERE status = 'success') AS success_count, \
               COUNT(*) FILTER (WHERE status = 'failed') AS failed_count, \
               COALESCE(SUM(amount) FILTER (WHERE status = 'success'), 0) AS total_success_amount \
             FROM payments",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(RevenueSummary {
            success_count: row.get("success_count"),
            failed_count: row.get("failed_count"),
            total_success_amount: row.get("total_success_amount"),
        })
    }

    async fn list_recent(&self, limit: i64) -> AppResult<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLS} FROM payments ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_payment).collect())
    }
}

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn upsert(&self, subscription: &Subscription) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO subscriptions \
               (id, user_id, gateway_subscription_id, plan_id, status, start_date, end_date, \
                current_period_start, current_period_end, cancel_at_period_end) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (gateway_subscription_id) DO UPDATE SET \
               status = EXCLUDED.status, end_date = EXCLUDED.end_date, \
               current_period_start = EXCLUDED.current_period_start, \
               current_period_end = EXCLUDED.current_period_end, \
               cancel_at_period_end = EXCLUDED.cancel_at_period_end, \
               updated_at = CURRENT_TIMESTAMP",
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(&subscription.gateway_subscription_id)
        .bind(&subscription.plan_id)
        .bind(subscription.status.as_str())
        .bind(subscription.start_date)
        .bind(subscription.end_date)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.cancel_at_period_end)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLS} FROM subscriptions WHERE gateway_subscription_id = $1"
        ))
        .bind(gateway_subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLS} FROM subscriptions WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_subscription))
    }
}
