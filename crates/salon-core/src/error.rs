//! Unified error handling for the booking engine
//!
//! Every failure maps onto a stable [`ErrorKind`] so clients can tell
//! "retry is safe" apart from "change the request" and "nothing to retry",
//! and onto an HTTP response through `ResponseError`.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Stable error classification exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input, rejected before any persistence
    Validation,
    /// Referenced entity does not exist
    NotFound,
    /// Business rule breached (cutoffs, slot taken, illegal transition)
    PolicyViolation,
    /// Idempotency key reuse with a different payload, duplicate unique value
    Conflict,
    /// Payment gateway unreachable, timed out or answered with an error
    GatewayFailure,
    /// Persistence or infrastructure failure unrelated to business rules
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::PolicyViolation => write!(f, "policy_violation"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::GatewayFailure => write!(f, "gateway_failure"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Lookup Errors ====================
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Stylist not found: {0}")]
    StylistNotFound(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Refund not found: {0}")]
    RefundNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ==================== Policy Errors ====================
    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Stylist {stylist_id} does not work at branch {branch_id}")]
    StylistBranchMismatch {
        stylist_id: String,
        branch_id: String,
    },

    #[error("Cutoff passed: {0}")]
    CutoffPassed(String),

    #[error("Cannot {action} a booking in status {status}")]
    InvalidTransition { status: String, action: String },

    #[error("Retry limit exceeded: max {max} attempts allowed")]
    RetryLimitExceeded { max: i32 },

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Payment gateway not configured: {0}")]
    GatewayNotConfigured(String),

    // ==================== Conflict Errors ====================
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Idempotency key reused with a different request: {0}")]
    IdempotencyConflict(String),

    // ==================== Gateway Errors ====================
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Payment gateway timed out after {0}s")]
    GatewayTimeout(u64),

    // ==================== Internal Errors ====================
    #[error("Collaborator service error: {0}")]
    Collaborator(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the stable error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_)
            | AppError::InvalidInput(_)
            | AppError::MissingField(_)
            | AppError::InvalidSignature(_)
            | AppError::GatewayNotConfigured(_) => ErrorKind::Validation,

            AppError::UserNotFound(_)
            | AppError::BranchNotFound(_)
            | AppError::ServiceNotFound(_)
            | AppError::StylistNotFound(_)
            | AppError::BookingNotFound(_)
            | AppError::PaymentNotFound(_)
            | AppError::RefundNotFound(_)
            | AppError::NotFound(_) => ErrorKind::NotFound,

            AppError::SlotUnavailable(_)
            | AppError::StylistBranchMismatch { .. }
            | AppError::CutoffPassed(_)
            | AppError::InvalidTransition { .. }
            | AppError::RetryLimitExceeded { .. }
            | AppError::PolicyViolation(_) => ErrorKind::PolicyViolation,

            AppError::Conflict(_) | AppError::AlreadyExists(_) | AppError::IdempotencyConflict(_) => {
                ErrorKind::Conflict
            }

            AppError::Gateway(_) | AppError::GatewayTimeout(_) => ErrorKind::GatewayFailure,

            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Transaction(_)
            | AppError::Cache(_)
            | AppError::CacheConnection(_)
            | AppError::Collaborator(_)
            | AppError::Internal(_)
            | AppError::Config(_)
            | AppError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether the same request may be retried unchanged
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::GatewayFailure
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            AppError::SlotUnavailable(_) => StatusCode::CONFLICT,
            AppError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::PolicyViolation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::GatewayFailure => StatusCode::BAD_GATEWAY,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::UserNotFound(_) => "user_not_found",
            AppError::BranchNotFound(_) => "branch_not_found",
            AppError::ServiceNotFound(_) => "service_not_found",
            AppError::StylistNotFound(_) => "stylist_not_found",
            AppError::BookingNotFound(_) => "booking_not_found",
            AppError::PaymentNotFound(_) => "payment_not_found",
            AppError::RefundNotFound(_) => "refund_not_found",
            AppError::NotFound(_) => "not_found",
            AppError::SlotUnavailable(_) => "slot_unavailable",
            AppError::StylistBranchMismatch { .. } => "stylist_branch_mismatch",
            AppError::CutoffPassed(_) => "cutoff_passed",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::RetryLimitExceeded { .. } => "retry_limit_exceeded",
            AppError::PolicyViolation(_) => "policy_violation",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::MissingField(_) => "missing_field",
            AppError::InvalidSignature(_) => "invalid_signature",
            AppError::GatewayNotConfigured(_) => "gateway_not_configured",
            AppError::Conflict(_) => "conflict",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::IdempotencyConflict(_) => "idempotency_conflict",
            AppError::Gateway(_) => "gateway_error",
            AppError::GatewayTimeout(_) => "gateway_timeout",
            AppError::Collaborator(_) => "collaborator_error",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "kind": self.kind(),
            "retryable": self.is_retryable(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
