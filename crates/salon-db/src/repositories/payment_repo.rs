//! Payment repository implementation
//!
//! Status changes are conditional on the current status so that concurrent
//! confirmations, webhooks and the expiry sweep never overwrite each other.

use super::{is_constraint_conflict, violated_constraint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use salon_core::{
    models::{GatewayPayload, Payment, PaymentAttempt, PaymentStatus, PaymentUpdate},
    traits::PaymentRepository,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of PaymentRepository
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    /// Create a new payment repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse payment status from string
    fn parse_status(s: &str) -> PaymentStatus {
        PaymentStatus::from_str(s).unwrap_or_default()
    }

    fn status_strings(statuses: &[PaymentStatus]) -> Vec<String> {
        statuses.iter().map(ToString::to_string).collect()
    }
}

/// Unique index allowing one pending, initiated or successful payment per booking
const ACTIVE_BOOKING_INDEX: &str = "uq_payments_active_booking";

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    #[instrument(skip(self, payment), fields(payment_id = %payment.id))]
    async fn create(&self, payment: &Payment) -> AppResult<Payment> {
        debug!("Creating payment for booking {}", payment.booking_id);

        let row = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            INSERT INTO payments (
                id, booking_id, user_id, amount, currency, status, gateway,
                gateway_payment_id, gateway_order_id, payment_method,
                idempotency_key, failure_reason, expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING
                id, booking_id, user_id, amount, currency, status, gateway,
                gateway_payment_id, gateway_order_id, payment_method,
                idempotency_key, failure_reason, expires_at, created_at, updated_at
            "#,
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.to_string())
        .bind(&payment.gateway)
        .bind(&payment.gateway_payment_id)
        .bind(&payment.gateway_order_id)
        .bind(&payment.payment_method)
        .bind(&payment.idempotency_key)
        .bind(&payment.failure_reason)
        .bind(payment.expires_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if violated_constraint(&e) == Some(ACTIVE_BOOKING_INDEX) {
                warn!("Booking {} already has an active payment", payment.booking_id);
                AppError::Conflict(format!(
                    "Booking {} already has an active payment",
                    payment.booking_id
                ))
            } else if is_constraint_conflict(&e) {
                warn!("Duplicate idempotency key {}", payment.idempotency_key);
                AppError::AlreadyExists(format!(
                    "Payment with idempotency key {} already exists",
                    payment.idempotency_key
                ))
            } else {
                error!("Database error creating payment: {}", e);
                AppError::Database(format!("Failed to create payment: {}", e))
            }
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Payment>> {
        debug!("Finding payment by id: {}", id);

        let row = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            SELECT
                id, booking_id, user_id, amount, currency, status, gateway,
                gateway_payment_id, gateway_order_id, payment_method,
                idempotency_key, failure_reason, expires_at, created_at, updated_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding payment {}: {}", id, e);
            AppError::Database(format!("Failed to find payment: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_idempotency_key(&self, key: &str) -> AppResult<Option<Payment>> {
        debug!("Finding payment by idempotency key");

        let row = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            SELECT
                id, booking_id, user_id, amount, currency, status, gateway,
                gateway_payment_id, gateway_order_id, payment_method,
                idempotency_key, failure_reason, expires_at, created_at, updated_at
            FROM payments
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding payment by key: {}", e);
            AppError::Database(format!("Failed to find payment: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_active_for_booking(&self, booking_id: Uuid) -> AppResult<Option<Payment>> {
        debug!("Finding active payment of booking {}", booking_id);

        let row = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            SELECT
                id, booking_id, user_id, amount, currency, status, gateway,
                gateway_payment_id, gateway_order_id, payment_method,
                idempotency_key, failure_reason, expires_at, created_at, updated_at
            FROM payments
            WHERE booking_id = $1
                AND status IN ('pending', 'initiated', 'success')
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding active payment: {}", e);
            AppError::Database(format!("Failed to find payment: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_gateway_payment_id(
        &self,
        gateway: &str,
        gateway_payment_id: &str,
    ) -> AppResult<Option<Payment>> {
        debug!("Finding payment by gateway reference {}", gateway_payment_id);

        let row = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            SELECT
                id, booking_id, user_id, amount, currency, status, gateway,
                gateway_payment_id, gateway_order_id, payment_method,
                idempotency_key, failure_reason, expires_at, created_at, updated_at
            FROM payments
            WHERE gateway = $1 AND gateway_payment_id = $2
            "#,
        )
        .bind(gateway)
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding payment by gateway reference: {}", e);
            AppError::Database(format!("Failed to find payment: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update_status(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        update: &PaymentUpdate,
    ) -> AppResult<Option<Payment>> {
        debug!("Updating payment {} status to {}", id, update.status);

        let row = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            UPDATE payments
            SET status = $2,
                gateway_payment_id = COALESCE($3, gateway_payment_id),
                gateway_order_id = COALESCE($4, gateway_order_id),
                payment_method = COALESCE($5, payment_method),
                failure_reason = CASE
                    WHEN $2 = 'failed' THEN COALESCE($6, failure_reason)
                    ELSE NULL
                END,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($7)
            RETURNING
                id, booking_id, user_id, amount, currency, status, gateway,
                gateway_payment_id, gateway_order_id, payment_method,
                idempotency_key, failure_reason, expires_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(update.status.to_string())
        .bind(&update.gateway_payment_id)
        .bind(&update.gateway_order_id)
        .bind(&update.payment_method)
        .bind(&update.failure_reason)
        .bind(Self::status_strings(expected))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if violated_constraint(&e) == Some(ACTIVE_BOOKING_INDEX) {
                warn!("Payment {} cannot reopen: its booking has another active payment", id);
                AppError::Conflict(format!(
                    "Payment {} cannot become {}: its booking has another active payment",
                    id, update.status
                ))
            } else {
                error!("Database error updating payment {}: {}", id, e);
                AppError::Database(format!("Failed to update payment status: {}", e))
            }
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, attempt), fields(payment_id = %attempt.payment_id, attempt = attempt.attempt_number))]
    async fn record_attempt(&self, attempt: &PaymentAttempt) -> AppResult<()> {
        debug!("Recording payment attempt");

        sqlx::query(
            r#"
            INSERT INTO payment_attempts (
                id, payment_id, attempt_number, gateway, status,
                error, response, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.payment_id)
        .bind(attempt.attempt_number)
        .bind(&attempt.gateway)
        .bind(attempt.status.to_string())
        .bind(&attempt.error)
        .bind(&attempt.response.0)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_constraint_conflict(&e) {
                AppError::Conflict(format!(
                    "Attempt {} of payment {} already recorded",
                    attempt.attempt_number, attempt.payment_id
                ))
            } else {
                error!("Database error recording attempt: {}", e);
                AppError::Database(format!("Failed to record payment attempt: {}", e))
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_attempts(&self, payment_id: Uuid) -> AppResult<Vec<PaymentAttempt>> {
        debug!("Listing attempts of payment {}", payment_id);

        let rows = sqlx::query_as::<sqlx::Postgres, AttemptRow>(
            r#"
            SELECT
                id, payment_id, attempt_number, gateway, status,
                error, response, created_at
            FROM payment_attempts
            WHERE payment_id = $1
            ORDER BY attempt_number
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing attempts: {}", e);
            AppError::Database(format!("Failed to list payment attempts: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_expired_open(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<Payment>> {
        debug!("Finding open payments expired before {}", now);

        let rows = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            SELECT
                id, booking_id, user_id, amount, currency, status, gateway,
                gateway_payment_id, gateway_order_id, payment_method,
                idempotency_key, failure_reason, expires_at, created_at, updated_at
            FROM payments
            WHERE status IN ('pending', 'initiated')
                AND expires_at < $1
            ORDER BY expires_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding expired payments: {}", e);
            AppError::Database(format!("Failed to find expired payments: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping payment rows
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    currency: String,
    status: String,
    gateway: String,
    gateway_payment_id: Option<String>,
    gateway_order_id: Option<String>,
    payment_method: Option<String>,
    idempotency_key: String,
    failure_reason: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id,
            booking_id: row.booking_id,
            user_id: row.user_id,
            amount: row.amount,
            currency: row.currency,
            status: PgPaymentRepository::parse_status(&row.status),
            gateway: row.gateway,
            gateway_payment_id: row.gateway_payment_id,
            gateway_order_id: row.gateway_order_id,
            payment_method: row.payment_method,
            idempotency_key: row.idempotency_key,
            failure_reason: row.failure_reason,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Helper struct for mapping attempt rows
#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    payment_id: Uuid,
    attempt_number: i32,
    gateway: String,
    status: String,
    error: Option<String>,
    response: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<AttemptRow> for PaymentAttempt {
    fn from(row: AttemptRow) -> Self {
        Self {
            id: row.id,
            payment_id: row.payment_id,
            attempt_number: row.attempt_number,
            gateway: row.gateway,
            status: PgPaymentRepository::parse_status(&row.status),
            error: row.error,
            response: row.response.map(GatewayPayload).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(
            PgPaymentRepository::parse_status("success"),
            PaymentStatus::Success
        );
        assert_eq!(
            PgPaymentRepository::parse_status("garbage"),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn test_open_statuses_as_strings() {
        assert_eq!(
            PgPaymentRepository::status_strings(&PaymentStatus::OPEN),
            vec!["pending".to_string(), "initiated".to_string()]
        );
    }
}
