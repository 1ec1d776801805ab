//! Payment, attempt, refund and idempotency models
//!
//! Payments are referenced by bookings but not owned by them: a payment can
//! outlive a canceled booking so it can still be refunded.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Canonical, gateway-agnostic payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created locally, gateway not yet called
    #[default]
    Pending,
    /// Gateway accepted the order, customer has not paid yet
    Initiated,
    /// Money captured
    Success,
    /// Gateway rejected or timed out; may be retried
    Failed,
    /// Abandoned by the customer or expired at the gateway
    Canceled,
    /// Fully refunded
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Initiated => write!(f, "initiated"),
            PaymentStatus::Success => write!(f, "success"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Canceled => write!(f, "canceled"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl PaymentStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "initiated" => Some(PaymentStatus::Initiated),
            "success" => Some(PaymentStatus::Success),
            "failed" => Some(PaymentStatus::Failed),
            "canceled" => Some(PaymentStatus::Canceled),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// A payment never leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Success | PaymentStatus::Refunded | PaymentStatus::Canceled
        )
    }

    /// Waiting on the gateway or the customer
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Initiated)
    }

    /// Counts against the one-live-payment-per-booking rule
    pub fn is_active(&self) -> bool {
        self.is_open() || *self == PaymentStatus::Success
    }

    /// Statuses from which a gateway outcome may still be applied
    pub const OPEN: [PaymentStatus; 2] = [PaymentStatus::Pending, PaymentStatus::Initiated];
}

/// Raw gateway response kept for audit
///
/// Gateway payloads are unstructured by nature; they are stored verbatim and
/// never interpreted outside the gateway adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct GatewayPayload(pub serde_json::Value);

impl GatewayPayload {
    pub fn empty() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

/// Payment entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway: String,
    pub gateway_payment_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub payment_method: Option<String>,

    /// Globally unique client token
    pub idempotency_key: String,

    pub failure_reason: Option<String>,

    /// Open payments past this instant are failed by the sweep
    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Create a new pending payment
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        booking_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
        currency: String,
        gateway: String,
        idempotency_key: String,
        payment_method: Option<String>,
        expiry_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id,
            user_id,
            amount,
            currency,
            status: PaymentStatus::Pending,
            gateway,
            gateway_payment_id: None,
            gateway_order_id: None,
            payment_method,
            idempotency_key,
            failure_reason: None,
            expires_at: now + Duration::minutes(expiry_minutes),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && now > self.expires_at
    }
}

/// Fields written together with a conditional status change
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    pub gateway_payment_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub payment_method: Option<String>,
    pub failure_reason: Option<String>,
}

impl PaymentUpdate {
    pub fn status(status: PaymentStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn gateway_ids(mut self, payment_id: impl Into<String>, order_id: impl Into<String>) -> Self {
        self.gateway_payment_id = Some(payment_id.into());
        self.gateway_order_id = Some(order_id.into());
        self
    }

    pub fn failure(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn method(mut self, method: Option<String>) -> Self {
        self.payment_method = method;
        self
    }
}

/// One gateway call made for a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub payment_id: Uuid,

    /// Monotonic per payment, starting at 1
    pub attempt_number: i32,

    pub gateway: String,
    pub status: PaymentStatus,
    pub error: Option<String>,
    pub response: GatewayPayload,
    pub created_at: DateTime<Utc>,
}

impl PaymentAttempt {
    pub fn new(payment_id: Uuid, attempt_number: i32, gateway: &str, status: PaymentStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            attempt_number,
            gateway: gateway.to_string(),
            status,
            error: None,
            response: GatewayPayload::empty(),
            created_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_response(mut self, response: GatewayPayload) -> Self {
        self.response = response;
        self
    }
}

/// Cached outcome of an idempotent initiation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub idempotency_key: String,
    pub payment_id: Uuid,

    /// Hash of the request payload; a reused key with a different hash is a conflict
    pub request_fingerprint: String,

    /// Serialized response returned verbatim on replay
    pub response_body: String,

    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(
        idempotency_key: String,
        payment_id: Uuid,
        request_fingerprint: String,
        response_body: String,
        ttl_secs: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            idempotency_key,
            payment_id,
            request_fingerprint,
            response_body,
            expires_at: now + Duration::seconds(ttl_secs),
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Refund entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_refund_id: Option<String>,
    pub reason: String,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn new(
        payment_id: Uuid,
        amount: Decimal,
        currency: String,
        reason: String,
        idempotency_key: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            payment_id,
            amount,
            currency,
            status: PaymentStatus::Pending,
            gateway_refund_id: None,
            reason,
            idempotency_key,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to start a payment for a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiatePaymentRequest {
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub idempotency_key: String,
    pub gateway: Option<String>,
    pub payment_method: Option<String>,
}

/// Response of a payment initiation, cached per idempotency key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiation {
    pub payment: Payment,
    pub payment_url: Option<String>,
}
