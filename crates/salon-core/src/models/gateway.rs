//! Values exchanged with payment gateway adapters

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::payment::GatewayPayload;

/// Result of creating an order at the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayInitiation {
    pub gateway_payment_id: String,
    pub gateway_order_id: String,
    pub redirect_url: Option<String>,
    pub raw: GatewayPayload,
}

/// Gateway-native status of a payment or refund
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayStatusReport {
    pub native_status: String,
    pub payment_method: Option<String>,
    pub failure_reason: Option<String>,
    pub raw: GatewayPayload,
}

/// Result of a refund call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub gateway_refund_id: String,
    pub native_status: String,
    pub raw: GatewayPayload,
}

/// What an inbound webhook is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookSubject {
    Payment,
    Refund,
}

/// Authenticated gateway callback in canonical shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub subject: WebhookSubject,
    pub gateway_payment_id: String,
    pub gateway_refund_id: Option<String>,
    pub native_status: String,
    pub amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub failure_reason: Option<String>,
}
