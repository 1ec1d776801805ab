//! Refund repository implementation

use super::is_constraint_conflict;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use salon_core::{
    models::{PaymentStatus, Refund},
    traits::RefundRepository,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of RefundRepository
pub struct PgRefundRepository {
    pool: PgPool,
}

impl PgRefundRepository {
    /// Create a new refund repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefundRepository for PgRefundRepository {
    #[instrument(skip(self, refund), fields(refund_id = %refund.id, payment_id = %refund.payment_id))]
    async fn create_within(&self, refund: &Refund, cap: Decimal) -> AppResult<Refund> {
        debug!("Creating refund of {} within {}", refund.amount, cap);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin refund transaction: {}", e);
            AppError::Transaction(format!("Failed to begin transaction: {}", e))
        })?;

        // Concurrent refunds of one payment queue on its row
        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM payments WHERE id = $1 FOR UPDATE")
            .bind(refund.payment_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error locking payment {}: {}", refund.payment_id, e);
                AppError::Database(format!("Failed to lock payment: {}", e))
            })?;
        if locked.is_none() {
            return Err(AppError::PaymentNotFound(refund.payment_id.to_string()));
        }

        let committed: (Option<Decimal>,) = sqlx::query_as(
            r#"
            SELECT SUM(amount)
            FROM refunds
            WHERE payment_id = $1 AND status IN ('pending', 'initiated', 'success')
            "#,
        )
        .bind(refund.payment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error summing refunds: {}", e);
            AppError::Database(format!("Failed to sum refunds: {}", e))
        })?;

        let remaining = cap - committed.0.unwrap_or(Decimal::ZERO);
        if refund.amount > remaining {
            warn!(
                "Refund of {} rejected, only {} of payment {} is refundable",
                refund.amount, remaining, refund.payment_id
            );
            return Err(AppError::Validation(format!(
                "refund {} exceeds refundable amount {}",
                refund.amount, remaining
            )));
        }

        let row = sqlx::query_as::<sqlx::Postgres, RefundRow>(
            r#"
            INSERT INTO refunds (
                id, payment_id, amount, currency, status, gateway_refund_id,
                reason, idempotency_key, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING
                id, payment_id, amount, currency, status, gateway_refund_id,
                reason, idempotency_key, created_at, updated_at
            "#,
        )
        .bind(refund.id)
        .bind(refund.payment_id)
        .bind(refund.amount)
        .bind(&refund.currency)
        .bind(refund.status.to_string())
        .bind(&refund.gateway_refund_id)
        .bind(&refund.reason)
        .bind(&refund.idempotency_key)
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_constraint_conflict(&e) {
                warn!("Duplicate refund idempotency key {}", refund.idempotency_key);
                AppError::AlreadyExists(format!(
                    "Refund with idempotency key {} already exists",
                    refund.idempotency_key
                ))
            } else {
                error!("Database error creating refund: {}", e);
                AppError::Database(format!("Failed to create refund: {}", e))
            }
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit refund transaction: {}", e);
            AppError::Transaction(format!("Failed to commit: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Refund>> {
        debug!("Finding refund by id: {}", id);

        let row = sqlx::query_as::<sqlx::Postgres, RefundRow>(
            r#"
            SELECT
                id, payment_id, amount, currency, status, gateway_refund_id,
                reason, idempotency_key, created_at, updated_at
            FROM refunds
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding refund {}: {}", id, e);
            AppError::Database(format!("Failed to find refund: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_idempotency_key(&self, key: &str) -> AppResult<Option<Refund>> {
        debug!("Finding refund by idempotency key");

        let row = sqlx::query_as::<sqlx::Postgres, RefundRow>(
            r#"
            SELECT
                id, payment_id, amount, currency, status, gateway_refund_id,
                reason, idempotency_key, created_at, updated_at
            FROM refunds
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding refund by key: {}", e);
            AppError::Database(format!("Failed to find refund: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_gateway_refund_id(&self, gateway_refund_id: &str) -> AppResult<Option<Refund>> {
        debug!("Finding refund by gateway reference {}", gateway_refund_id);

        let row = sqlx::query_as::<sqlx::Postgres, RefundRow>(
            r#"
            SELECT
                id, payment_id, amount, currency, status, gateway_refund_id,
                reason, idempotency_key, created_at, updated_at
            FROM refunds
            WHERE gateway_refund_id = $1
            "#,
        )
        .bind(gateway_refund_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding refund by gateway reference: {}", e);
            AppError::Database(format!("Failed to find refund: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        status: PaymentStatus,
        gateway_refund_id: Option<&str>,
    ) -> AppResult<Option<Refund>> {
        debug!("Updating refund {} status to {}", id, status);

        let expected: Vec<String> = expected.iter().map(ToString::to_string).collect();

        let row = sqlx::query_as::<sqlx::Postgres, RefundRow>(
            r#"
            UPDATE refunds
            SET status = $2,
                gateway_refund_id = COALESCE($3, gateway_refund_id),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($4)
            RETURNING
                id, payment_id, amount, currency, status, gateway_refund_id,
                reason, idempotency_key, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(gateway_refund_id)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating refund {}: {}", id, e);
            AppError::Database(format!("Failed to update refund status: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn committed_amount(&self, payment_id: Uuid) -> AppResult<Decimal> {
        let result: (Option<Decimal>,) = sqlx::query_as(
            r#"
            SELECT SUM(amount)
            FROM refunds
            WHERE payment_id = $1 AND status IN ('pending', 'initiated', 'success')
            "#,
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error summing refunds: {}", e);
            AppError::Database(format!("Failed to sum refunds: {}", e))
        })?;

        Ok(result.0.unwrap_or(Decimal::ZERO))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct RefundRow {
    id: Uuid,
    payment_id: Uuid,
    amount: Decimal,
    currency: String,
    status: String,
    gateway_refund_id: Option<String>,
    reason: String,
    idempotency_key: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RefundRow> for Refund {
    fn from(row: RefundRow) -> Self {
        Self {
            id: row.id,
            payment_id: row.payment_id,
            amount: row.amount,
            currency: row.currency,
            status: PaymentStatus::from_str(&row.status).unwrap_or_default(),
            gateway_refund_id: row.gateway_refund_id,
            reason: row.reason,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
