//! Branch configuration repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use salon_core::{
    models::BranchConfig, traits::BranchConfigRepository, AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of BranchConfigRepository
pub struct PgBranchConfigRepository {
    pool: PgPool,
}

impl PgBranchConfigRepository {
    /// Create a new branch configuration repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BranchConfigRepository for PgBranchConfigRepository {
    #[instrument(skip(self))]
    async fn find(&self, branch_id: Uuid) -> AppResult<Option<BranchConfig>> {
        debug!("Finding configuration of branch {}", branch_id);

        let row = sqlx::query_as::<sqlx::Postgres, BranchConfigRow>(
            r#"
            SELECT
                branch_id, buffer_minutes, cancellation_cutoff_hours,
                reschedule_window_hours, max_advance_booking_days,
                booking_fee, tax_percentage, created_at, updated_at
            FROM branch_configurations
            WHERE branch_id = $1
            "#,
        )
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding branch config {}: {}", branch_id, e);
            AppError::Database(format!("Failed to find branch config: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, config), fields(branch_id = %config.branch_id))]
    async fn insert_if_absent(&self, config: &BranchConfig) -> AppResult<BranchConfig> {
        debug!("Persisting default configuration");

        // The no-op update makes RETURNING yield the stored row on conflict
        let row = sqlx::query_as::<sqlx::Postgres, BranchConfigRow>(
            r#"
            INSERT INTO branch_configurations (
                branch_id, buffer_minutes, cancellation_cutoff_hours,
                reschedule_window_hours, max_advance_booking_days,
                booking_fee, tax_percentage, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (branch_id)
            DO UPDATE SET branch_id = branch_configurations.branch_id
            RETURNING
                branch_id, buffer_minutes, cancellation_cutoff_hours,
                reschedule_window_hours, max_advance_booking_days,
                booking_fee, tax_percentage, created_at, updated_at
            "#,
        )
        .bind(config.branch_id)
        .bind(config.buffer_minutes)
        .bind(config.cancellation_cutoff_hours)
        .bind(config.reschedule_window_hours)
        .bind(config.max_advance_booking_days)
        .bind(config.booking_fee)
        .bind(config.tax_percentage)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error inserting branch config: {}", e);
            AppError::Database(format!("Failed to insert branch config: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, config), fields(branch_id = %config.branch_id))]
    async fn update(&self, config: &BranchConfig) -> AppResult<BranchConfig> {
        debug!("Updating branch configuration");

        let row = sqlx::query_as::<sqlx::Postgres, BranchConfigRow>(
            r#"
            INSERT INTO branch_configurations (
                branch_id, buffer_minutes, cancellation_cutoff_hours,
                reschedule_window_hours, max_advance_booking_days,
                booking_fee, tax_percentage, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (branch_id)
            DO UPDATE SET
                buffer_minutes = EXCLUDED.buffer_minutes,
                cancellation_cutoff_hours = EXCLUDED.cancellation_cutoff_hours,
                reschedule_window_hours = EXCLUDED.reschedule_window_hours,
                max_advance_booking_days = EXCLUDED.max_advance_booking_days,
                booking_fee = EXCLUDED.booking_fee,
                tax_percentage = EXCLUDED.tax_percentage,
                updated_at = NOW()
            RETURNING
                branch_id, buffer_minutes, cancellation_cutoff_hours,
                reschedule_window_hours, max_advance_booking_days,
                booking_fee, tax_percentage, created_at, updated_at
            "#,
        )
        .bind(config.branch_id)
        .bind(config.buffer_minutes)
        .bind(config.cancellation_cutoff_hours)
        .bind(config.reschedule_window_hours)
        .bind(config.max_advance_booking_days)
        .bind(config.booking_fee)
        .bind(config.tax_percentage)
        .bind(config.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating branch config: {}", e);
            AppError::Database(format!("Failed to update branch config: {}", e))
        })?;

        Ok(row.into())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct BranchConfigRow {
    branch_id: Uuid,
    buffer_minutes: i32,
    cancellation_cutoff_hours: i32,
    reschedule_window_hours: i32,
    max_advance_booking_days: i32,
    booking_fee: Decimal,
    tax_percentage: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BranchConfigRow> for BranchConfig {
    fn from(row: BranchConfigRow) -> Self {
        Self {
            branch_id: row.branch_id,
            buffer_minutes: row.buffer_minutes,
            cancellation_cutoff_hours: row.cancellation_cutoff_hours,
            reschedule_window_hours: row.reschedule_window_hours,
            max_advance_booking_days: row.max_advance_booking_days,
            booking_fee: row.booking_fee,
            tax_percentage: row.tax_percentage,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
