//! Gateway status translation tables
//!
//! Every gateway reports payments and refunds in its own vocabulary. The
//! tables below are the only place that vocabulary is interpreted; anything
//! not listed translates to `None` and leaves the stored status untouched.

use salon_core::models::PaymentStatus;

/// Which translation table a gateway uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTable {
    Razorpay,
    Stripe,
    /// Gateways reporting canonical names directly
    Generic,
}

impl StatusTable {
    /// Table selected by gateway name
    pub fn for_gateway(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "razorpay" => StatusTable::Razorpay,
            "stripe" => StatusTable::Stripe,
            _ => StatusTable::Generic,
        }
    }

    /// Canonical status of a payment-level native status
    pub fn payment_status(&self, native: &str) -> Option<PaymentStatus> {
        let native = native.to_lowercase();
        match self {
            StatusTable::Razorpay => match native.as_str() {
                "created" | "authorized" => Some(PaymentStatus::Initiated),
                "captured" => Some(PaymentStatus::Success),
                "failed" => Some(PaymentStatus::Failed),
                "refunded" => Some(PaymentStatus::Refunded),
                _ => None,
            },
            StatusTable::Stripe => match native.as_str() {
                "requires_payment_method"
                | "requires_confirmation"
                | "requires_action"
                | "requires_capture"
                | "processing" => Some(PaymentStatus::Initiated),
                "succeeded" => Some(PaymentStatus::Success),
                "payment_failed" => Some(PaymentStatus::Failed),
                "canceled" => Some(PaymentStatus::Canceled),
                _ => None,
            },
            StatusTable::Generic => match native.as_str() {
                "paid" | "completed" => Some(PaymentStatus::Success),
                "cancelled" => Some(PaymentStatus::Canceled),
                other => PaymentStatus::from_str(other),
            },
        }
    }

    /// Canonical status of a refund-level native status
    ///
    /// Refunds only ever end up `pending`, `success` or `failed`.
    pub fn refund_status(&self, native: &str) -> Option<PaymentStatus> {
        let native = native.to_lowercase();
        match self {
            StatusTable::Razorpay => match native.as_str() {
                "created" | "pending" => Some(PaymentStatus::Pending),
                "processed" => Some(PaymentStatus::Success),
                "failed" => Some(PaymentStatus::Failed),
                _ => None,
            },
            StatusTable::Stripe => match native.as_str() {
                "pending" | "requires_action" => Some(PaymentStatus::Pending),
                "succeeded" => Some(PaymentStatus::Success),
                "failed" | "canceled" => Some(PaymentStatus::Failed),
                _ => None,
            },
            StatusTable::Generic => match native.as_str() {
                "pending" | "initiated" => Some(PaymentStatus::Pending),
                "success" | "processed" | "completed" => Some(PaymentStatus::Success),
                "failed" => Some(PaymentStatus::Failed),
                _ => None,
            },
        }
    }
}
