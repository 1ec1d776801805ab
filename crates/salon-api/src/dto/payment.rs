//! Payment DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use salon_core::models::{InitiatePaymentRequest, Payment, PaymentInitiation, PaymentStatus, Refund};
use salon_services::RefundRequest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Payment initiation request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InitiatePaymentDto {
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,

    /// ISO 4217 code
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: String,

    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: String,

    /// Explicit gateway; routed by currency when absent
    pub gateway: Option<String>,

    #[validate(length(max = 50))]
    pub payment_method: Option<String>,
}

impl From<InitiatePaymentDto> for InitiatePaymentRequest {
    fn from(dto: InitiatePaymentDto) -> Self {
        Self {
            booking_id: dto.booking_id,
            user_id: dto.user_id,
            amount: dto.amount,
            currency: dto.currency,
            idempotency_key: dto.idempotency_key,
            gateway: dto.gateway,
            payment_method: dto.payment_method,
        }
    }
}

/// Client confirmation after the gateway redirect
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfirmPaymentDto {
    #[validate(length(min = 1, max = 255))]
    pub gateway_payment_id: String,
}

/// Refund request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefundDto {
    /// Remaining refundable amount when absent
    pub amount: Option<Decimal>,

    #[validate(length(min = 1, max = 500))]
    pub reason: String,

    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: String,
}

impl From<RefundDto> for RefundRequest {
    fn from(dto: RefundDto) -> Self {
        Self {
            amount: dto.amount,
            reason: dto.reason,
            idempotency_key: dto.idempotency_key,
        }
    }
}

/// Payment response
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            booking_id: payment.booking_id,
            user_id: payment.user_id,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            gateway: payment.gateway,
            gateway_payment_id: payment.gateway_payment_id,
            gateway_order_id: payment.gateway_order_id,
            payment_method: payment.payment_method,
            failure_reason: payment.failure_reason,
            expires_at: payment.expires_at,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

/// Initiation response with the gateway redirect
#[derive(Debug, Clone, Serialize)]
pub struct InitiationResponse {
    pub payment: PaymentResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

impl From<PaymentInitiation> for InitiationResponse {
    fn from(initiation: PaymentInitiation) -> Self {
        Self {
            payment: initiation.payment.into(),
            payment_url: initiation.payment_url,
        }
    }
}

/// Refund response
#[derive(Debug, Clone, Serialize)]
pub struct RefundResponse {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_refund_id: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl From<Refund> for RefundResponse {
    fn from(refund: Refund) -> Self {
        Self {
            id: refund.id,
            payment_id: refund.payment_id,
            amount: refund.amount,
            currency: refund.currency,
            status: refund.status,
            gateway_refund_id: refund.gateway_refund_id,
            reason: refund.reason,
            created_at: refund.created_at,
        }
    }
}
