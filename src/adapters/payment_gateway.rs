use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument, warn};
use url::Url;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::billing::{
    CreatedOrder, GatewayOrderState, OrderRequest, PaymentGateway,
};
use crate::infra::config::GatewayConfig;
use crate::infra::http_client::build_client;

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    merchant_order_id: &'a str,
    description: &'a str,
    customer: CustomerBody<'a>,
    success_url: &'a str,
    failure_url: &'a str,
}

#[derive(Serialize)]
struct CustomerBody<'a> {
    email: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
}

#[derive(Deserialize)]
struct OrdersEnvelope {
    orders: Vec<OrderBody>,
}

#[derive(Deserialize)]
struct OrderBody {
    id: String,
    #[serde(default)]
    status: String,
}

/// Bank acquiring client. Order creation answers 201 with the payment
/// page in the Location header and the order id in the body; the status
/// endpoint reports "charged" (captured) or "authorized" (held).
pub struct BankPaymentGateway {
    client: Client,
    base_url: Url,
    login: String,
    password: SecretString,
}

impl BankPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: build_client(),
            base_url: config.base_url.clone(),
            login: config.login.clone(),
            password: config.password.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("bad gateway URL: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for BankPaymentGateway {
    #[instrument(skip(self, order), fields(merchant_order_id = %order.merchant_order_id))]
    async fn create_order(&self, order: &OrderRequest) -> AppResult<CreatedOrder> {
        let body = CreateOrderBody {
            amount: order.amount,
            currency: &order.currency,
            merchant_order_id: &order.merchant_order_id,
            description: &order.description,
            customer: CustomerBody {
                email: &order.customer_email,
                name: &order.customer_name,
                phone: order.customer_phone.as_deref(),
            },
            success_url: &order.return_url,
            failure_url: &order.return_url,
        };

        let response = self
            .client
            .post(self.endpoint("orders/create")?)
            .basic_auth(&self.login, Some(self.password.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("gateway request failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            error!(%status, body = text, "Gateway refused order creation");
            return Err(AppError::Upstream(format!("gateway returned {status}")));
        }

        let payment_url = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Upstream("gateway response missing Location header".into())
            })?;

        let envelope: OrdersEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("malformed gateway response: {e}")))?;
        let gateway_order_id = envelope
            .orders
            .into_iter()
            .next()
            .map(|o| o.id)
            .ok_or_else(|| AppError::Upstream("gateway response contained no orders".into()))?;

        Ok(CreatedOrder {
            gateway_order_id,
            payment_url,
        })
    }

    #[instrument(skip(self))]
    async fn order_status(&self, gateway_order_id: &str) -> AppResult<GatewayOrderState> {
        let response = self
            .client
            .get(self.endpoint(&format!("orders/{gateway_order_id}"))?)
            .basic_auth(&self.login, Some(self.password.expose_secret()))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("gateway request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, body = text, "Gateway order lookup failed");
            return Err(AppError::Upstream(format!("gateway returned {status}")));
        }

        let envelope: OrdersEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("malformed gateway response: {e}")))?;
        let order = envelope
            .orders
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Upstream("gateway response contained no orders".into()))?;

        Ok(match order.status.as_str() {
            "charged" => GatewayOrderState::Charged,
            "authorized" => GatewayOrderState::Authorized,
            other => {
                warn!(gateway_order_id, status = other, "Order in non-paid state");
                GatewayOrderState::Other(other.to_string())
            }
        })
    }
}
