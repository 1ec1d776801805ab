//! Booking history repository implementation
//!
//! Append-only: entries are inserted and listed, never updated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use salon_core::{
    models::{BookingHistoryEntry, HistoryAction, HistorySnapshot},
    traits::HistoryRepository,
    AppError, AppResult,
};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of HistoryRepository
pub struct PgHistoryRepository {
    pool: PgPool,
}

impl PgHistoryRepository {
    /// Create a new history repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for PgHistoryRepository {
    #[instrument(skip(self, entry), fields(booking_id = %entry.booking_id, action = %entry.action))]
    async fn append(&self, entry: &BookingHistoryEntry) -> AppResult<()> {
        debug!("Appending history entry {}", entry.id);

        sqlx::query(
            r#"
            INSERT INTO booking_history (
                id, booking_id, action, actor_id, reason,
                old_value, new_value, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.booking_id)
        .bind(entry.action.to_string())
        .bind(entry.actor_id)
        .bind(&entry.reason)
        .bind(entry.old_value.as_ref().map(Json))
        .bind(entry.new_value.as_ref().map(Json))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error appending history: {}", e);
            AppError::Database(format!("Failed to append history: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_by_booking(&self, booking_id: Uuid) -> AppResult<Vec<BookingHistoryEntry>> {
        debug!("Listing history of booking {}", booking_id);

        let rows = sqlx::query_as::<sqlx::Postgres, HistoryRow>(
            r#"
            SELECT
                id, booking_id, action, actor_id, reason,
                old_value, new_value, created_at
            FROM booking_history
            WHERE booking_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing history: {}", e);
            AppError::Database(format!("Failed to list history: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    booking_id: Uuid,
    action: String,
    actor_id: Option<Uuid>,
    reason: Option<String>,
    old_value: Option<Json<HistorySnapshot>>,
    new_value: Option<Json<HistorySnapshot>>,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for BookingHistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            booking_id: row.booking_id,
            action: HistoryAction::from_str(&row.action).unwrap_or(HistoryAction::Created),
            actor_id: row.actor_id,
            reason: row.reason,
            old_value: row.old_value.map(|v| v.0),
            new_value: row.new_value.map(|v| v.0),
            created_at: row.created_at,
        }
    }
}
