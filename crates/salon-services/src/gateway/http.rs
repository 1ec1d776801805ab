//! REST payment gateway adapter
//!
//! Talks to a gateway (or a gateway proxy) exposing:
//!
//! - `POST {base}/payments` `{amount, currency, reference}`
//! - `GET  {base}/payments/{id}`
//! - `POST {base}/payments/{id}/refunds` `{amount}`
//!
//! authenticated with the configured API key as bearer token.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use rust_decimal::Decimal;
use salon_core::{
    config::GatewayConfig,
    models::{GatewayInitiation, GatewayPayload, GatewayRefund, GatewayStatusReport, WebhookEvent},
    traits::PaymentGateway,
    AppError, AppResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, instrument};

use super::status::StatusTable;
use super::webhook;

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    amount: Decimal,
    currency: &'a str,
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentReply {
    id: String,
    order_id: Option<String>,
    redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentStatusReply {
    status: String,
    method: Option<String>,
    failure_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefundBody {
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct RefundReply {
    id: String,
    status: String,
}

/// HTTP payment gateway
pub struct HttpGateway {
    name: String,
    table: StatusTable,
    http_client: Client,
    base_url: String,
    api_key: String,
    webhook_secret: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig, timeout: Duration) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build gateway client: {}", e)))?;

        Ok(Self {
            name: config.name.clone(),
            table: StatusTable::for_gateway(&config.name),
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    /// Send a request and return the decoded body with its raw JSON
    async fn call<R: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> AppResult<(R, GatewayPayload)> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                error!("{} request failed: {}", self.name, e);
                AppError::Gateway(format!("{}: {}", self.name, e))
            })?;

        let status = response.status();
        let raw: Value = response.json().await.map_err(|e| {
            AppError::Gateway(format!("{} returned an unreadable body: {}", self.name, e))
        })?;

        if !status.is_success() {
            error!("{} HTTP error: status={} body={}", self.name, status, raw);
            return Err(AppError::Gateway(format!(
                "{} returned status {}",
                self.name, status
            )));
        }

        let decoded = serde_json::from_value(raw.clone()).map_err(|e| {
            AppError::Gateway(format!("{} returned an unexpected body: {}", self.name, e))
        })?;

        Ok((decoded, GatewayPayload(raw)))
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(gateway = %self.name))]
    async fn initiate_payment(
        &self,
        amount: Decimal,
        currency: &str,
        order_ref: &str,
    ) -> AppResult<GatewayInitiation> {
        let url = format!("{}/payments", self.base_url);
        let body = CreatePaymentBody {
            amount,
            currency,
            reference: order_ref,
        };

        let (reply, raw): (CreatePaymentReply, _) =
            self.call(self.http_client.post(&url).json(&body)).await?;
        debug!("Gateway order created: {}", reply.id);

        Ok(GatewayInitiation {
            gateway_order_id: reply.order_id.unwrap_or_else(|| reply.id.clone()),
            gateway_payment_id: reply.id,
            redirect_url: reply.redirect_url,
            raw,
        })
    }

    #[instrument(skip(self), fields(gateway = %self.name))]
    async fn confirm_payment(&self, gateway_payment_id: &str) -> AppResult<GatewayStatusReport> {
        let url = format!("{}/payments/{}", self.base_url, gateway_payment_id);
        let (reply, raw): (PaymentStatusReply, _) = self.call(self.http_client.get(&url)).await?;

        Ok(GatewayStatusReport {
            native_status: reply.status,
            payment_method: reply.method,
            failure_reason: reply.failure_reason,
            raw,
        })
    }

    #[instrument(skip(self), fields(gateway = %self.name))]
    async fn refund_payment(
        &self,
        gateway_payment_id: &str,
        amount: Decimal,
    ) -> AppResult<GatewayRefund> {
        let url = format!("{}/payments/{}/refunds", self.base_url, gateway_payment_id);
        let (reply, raw): (RefundReply, _) = self
            .call(self.http_client.post(&url).json(&RefundBody { amount }))
            .await?;

        Ok(GatewayRefund {
            gateway_refund_id: reply.id,
            native_status: reply.status,
            raw,
        })
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> AppResult<WebhookEvent> {
        webhook::verify_signature(payload, signature, &self.webhook_secret)?;
        webhook::parse_event(self.table, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gateway(name: &str) -> HttpGateway {
        HttpGateway::new(
            &GatewayConfig {
                name: name.to_string(),
                base_url: "http://127.0.0.1:1/".to_string(),
                api_key: "key".to_string(),
                webhook_secret: "secret".to_string(),
            },
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_webhook_uses_gateway_table() {
        let gw = gateway("razorpay");
        let body = json!({
            "event": "payment.captured",
            "payload": {"payment": {"entity": {"id": "pay_9", "status": "captured"}}}
        })
        .to_string();
        let signature = webhook::sign("secret", body.as_bytes()).unwrap();

        let event = gw.verify_webhook(body.as_bytes(), &signature).unwrap();
        assert_eq!(event.gateway_payment_id, "pay_9");

        let err = gw.verify_webhook(body.as_bytes(), "00ff").unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_gateway_failure() {
        let err = gateway("stripe").confirm_payment("pi_1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
