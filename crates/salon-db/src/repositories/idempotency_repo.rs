//! Idempotency record repository implementation
//!
//! Durable copy of initiation responses. Redis holds the hot copy; this table
//! is authoritative when the cache is cold or unavailable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use salon_core::{
    models::IdempotencyRecord, traits::IdempotencyRepository, AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of IdempotencyRepository
pub struct PgIdempotencyRepository {
    pool: PgPool,
}

impl PgIdempotencyRepository {
    /// Create a new idempotency repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepository for PgIdempotencyRepository {
    #[instrument(skip(self))]
    async fn find(&self, key: &str) -> AppResult<Option<IdempotencyRecord>> {
        debug!("Looking up idempotency record");

        let row = sqlx::query_as::<sqlx::Postgres, IdempotencyRow>(
            r#"
            SELECT
                idempotency_key, payment_id, request_fingerprint,
                response_body, expires_at, created_at
            FROM idempotency_records
            WHERE idempotency_key = $1 AND expires_at > NOW()
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding idempotency record: {}", e);
            AppError::Database(format!("Failed to find idempotency record: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, record), fields(payment_id = %record.payment_id))]
    async fn save(&self, record: &IdempotencyRecord) -> AppResult<()> {
        debug!("Saving idempotency record");

        sqlx::query(
            r#"
            INSERT INTO idempotency_records (
                idempotency_key, payment_id, request_fingerprint,
                response_body, expires_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (idempotency_key)
            DO UPDATE SET
                payment_id = EXCLUDED.payment_id,
                request_fingerprint = EXCLUDED.request_fingerprint,
                response_body = EXCLUDED.response_body,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&record.idempotency_key)
        .bind(record.payment_id)
        .bind(&record.request_fingerprint)
        .bind(&record.response_body)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error saving idempotency record: {}", e);
            AppError::Database(format!("Failed to save idempotency record: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error purging idempotency records: {}", e);
                AppError::Database(format!("Failed to purge idempotency records: {}", e))
            })?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!("Purged {} expired idempotency records", purged);
        }

        Ok(purged)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct IdempotencyRow {
    idempotency_key: String,
    payment_id: Uuid,
    request_fingerprint: String,
    response_body: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<IdempotencyRow> for IdempotencyRecord {
    fn from(row: IdempotencyRow) -> Self {
        Self {
            idempotency_key: row.idempotency_key,
            payment_id: row.payment_id,
            request_fingerprint: row.request_fingerprint,
            response_body: row.response_body,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}
