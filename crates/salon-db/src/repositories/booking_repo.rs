//! Booking repository implementation
//!
//! Bookings and their line items are written in a single transaction. Writers
//! that touch a stylist's calendar take a transaction-scoped advisory lock per
//! stylist (in a fixed order) and re-check buffered conflicts before inserting,
//! so two concurrent requests for overlapping ranges serialize and the second
//! one fails with `SlotUnavailable`. The unique index and exclusion constraint
//! on `booking_line_items` back this up at the schema level.

use super::is_constraint_conflict;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use salon_core::{
    models::{
        Booking, BookingLineItem, BookingPaymentStatus, BookingStatus, PriceSummary, TimeRange,
    },
    traits::{BookingRepository, StatusChange},
    AppError, AppResult,
};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of BookingRepository
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    /// Create a new booking repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse booking status from string
    fn parse_status(s: &str) -> BookingStatus {
        BookingStatus::from_str(s).unwrap_or_default()
    }

    /// Parse booking payment status from string
    fn parse_payment_status(s: &str) -> BookingPaymentStatus {
        BookingPaymentStatus::from_str(s).unwrap_or_default()
    }

    fn status_strings(statuses: &[BookingStatus]) -> Vec<String> {
        statuses.iter().map(ToString::to_string).collect()
    }

    /// Take per-stylist advisory locks in ascending order
    async fn lock_stylists(
        tx: &mut Transaction<'_, Postgres>,
        items: &[BookingLineItem],
    ) -> AppResult<()> {
        let stylists: BTreeSet<Uuid> = items.iter().map(|item| item.stylist_id).collect();

        for stylist_id in stylists {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(stylist_id.to_string())
                .execute(&mut **tx)
                .await
                .map_err(|e| {
                    error!("Failed to lock stylist {}: {}", stylist_id, e);
                    AppError::Transaction(format!("Failed to lock stylist calendar: {}", e))
                })?;
        }

        Ok(())
    }

    /// Re-check buffered conflicts of each item against other bookings
    async fn ensure_free(
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
        items: &[BookingLineItem],
        buffer_minutes: i64,
    ) -> AppResult<()> {
        for item in items {
            let window = item.window().expand(buffer_minutes);

            let clash: Option<(Uuid,)> = sqlx::query_as(
                r#"
                SELECT id
                FROM booking_line_items
                WHERE stylist_id = $1
                    AND is_active
                    AND booking_id <> $2
                    AND start_time < $4
                    AND end_time > $3
                LIMIT 1
                "#,
            )
            .bind(item.stylist_id)
            .bind(booking_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| {
                error!("Database error checking stylist conflicts: {}", e);
                AppError::Database(format!("Failed to check conflicts: {}", e))
            })?;

            if let Some((existing,)) = clash {
                warn!(
                    stylist_id = %item.stylist_id,
                    existing_item = %existing,
                    "Slot taken while booking was in flight"
                );
                return Err(AppError::SlotUnavailable(format!(
                    "Stylist {} is not available at {}",
                    item.stylist_id, item.start_time
                )));
            }
        }

        Ok(())
    }

    async fn insert_items(
        tx: &mut Transaction<'_, Postgres>,
        items: &[BookingLineItem],
    ) -> AppResult<()> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO booking_line_items (
                    id, booking_id, service_id, stylist_id,
                    start_time, end_time, price, is_active, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8)
                "#,
            )
            .bind(item.id)
            .bind(item.booking_id)
            .bind(item.service_id)
            .bind(item.stylist_id)
            .bind(item.start_time)
            .bind(item.end_time)
            .bind(item.price)
            .bind(item.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if is_constraint_conflict(&e) {
                    warn!("Reservation constraint rejected item {}: {}", item.id, e);
                    AppError::SlotUnavailable(format!(
                        "Stylist {} is not available at {}",
                        item.stylist_id, item.start_time
                    ))
                } else {
                    error!("Database error inserting line item: {}", e);
                    AppError::Database(format!("Failed to insert line item: {}", e))
                }
            })?;
        }

        Ok(())
    }

    async fn fetch_items(
        &self,
        booking_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, Vec<BookingLineItem>>> {
        let rows = sqlx::query_as::<sqlx::Postgres, LineItemRow>(
            r#"
            SELECT
                id, booking_id, service_id, stylist_id,
                start_time, end_time, price, created_at
            FROM booking_line_items
            WHERE booking_id = ANY($1)
            ORDER BY start_time
            "#,
        )
        .bind(booking_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching line items: {}", e);
            AppError::Database(format!("Failed to fetch line items: {}", e))
        })?;

        let mut grouped: HashMap<Uuid, Vec<BookingLineItem>> = HashMap::new();
        for row in rows {
            grouped.entry(row.booking_id).or_default().push(row.into());
        }

        Ok(grouped)
    }

    fn commit_error(e: sqlx::Error) -> AppError {
        if is_constraint_conflict(&e) {
            AppError::SlotUnavailable(format!("Reservation conflict on commit: {}", e))
        } else {
            error!("Failed to commit booking transaction: {}", e);
            AppError::Transaction(format!("Failed to commit: {}", e))
        }
    }

    fn begin_error(e: sqlx::Error) -> AppError {
        error!("Failed to begin booking transaction: {}", e);
        AppError::Transaction(format!("Failed to begin transaction: {}", e))
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Booking>> {
        debug!("Finding booking by id: {}", id);

        let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(
            r#"
            SELECT
                id, user_id, salon_id, branch_id, status, payment_status,
                subtotal, fee_amount, tax_amount, total_amount,
                note, payment_id, created_at, updated_at
            FROM bookings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding booking {}: {}", id, e);
            AppError::Database(format!("Failed to find booking: {}", e))
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut items = self.fetch_items(&[id]).await?;
        Ok(Some(row.into_booking(items.remove(&id).unwrap_or_default())))
    }

    #[instrument(skip(self))]
    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        debug!(
            "Listing bookings of user {} with limit {} offset {}",
            user_id, limit, offset
        );

        let rows = sqlx::query_as::<sqlx::Postgres, BookingRow>(
            r#"
            SELECT
                id, user_id, salon_id, branch_id, status, payment_status,
                subtotal, fee_amount, tax_amount, total_amount,
                note, payment_id, created_at, updated_at
            FROM bookings
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing bookings: {}", e);
            AppError::Database(format!("Failed to list bookings: {}", e))
        })?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting bookings: {}", e);
                AppError::Database(format!("Failed to count bookings: {}", e))
            })?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut items = self.fetch_items(&ids).await?;

        let bookings = rows
            .into_iter()
            .map(|row| {
                let line_items = items.remove(&row.id).unwrap_or_default();
                row.into_booking(line_items)
            })
            .collect();

        Ok((bookings, total.0))
    }

    #[instrument(skip(self))]
    async fn find_reservations(
        &self,
        stylist_id: Uuid,
        window: TimeRange,
        exclude_booking: Option<Uuid>,
    ) -> AppResult<Vec<BookingLineItem>> {
        debug!(
            "Finding reservations of stylist {} between {} and {}",
            stylist_id, window.start, window.end
        );

        let rows = sqlx::query_as::<sqlx::Postgres, LineItemRow>(
            r#"
            SELECT
                id, booking_id, service_id, stylist_id,
                start_time, end_time, price, created_at
            FROM booking_line_items
            WHERE stylist_id = $1
                AND is_active
                AND start_time < $3
                AND end_time > $2
                AND ($4::uuid IS NULL OR booking_id <> $4)
            ORDER BY start_time
            "#,
        )
        .bind(stylist_id)
        .bind(window.start)
        .bind(window.end)
        .bind(exclude_booking)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding reservations: {}", e);
            AppError::Database(format!("Failed to find reservations: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, booking), fields(booking_id = %booking.id))]
    async fn create_with_items(&self, booking: &Booking, buffer_minutes: i64) -> AppResult<Booking> {
        debug!(
            "Creating booking {} with {} line items",
            booking.id,
            booking.line_items.len()
        );

        let mut tx = self.pool.begin().await.map_err(Self::begin_error)?;

        Self::lock_stylists(&mut tx, &booking.line_items).await?;
        Self::ensure_free(&mut tx, booking.id, &booking.line_items, buffer_minutes).await?;

        let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(
            r#"
            INSERT INTO bookings (
                id, user_id, salon_id, branch_id, status, payment_status,
                subtotal, fee_amount, tax_amount, total_amount,
                note, payment_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING
                id, user_id, salon_id, branch_id, status, payment_status,
                subtotal, fee_amount, tax_amount, total_amount,
                note, payment_id, created_at, updated_at
            "#,
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.salon_id)
        .bind(booking.branch_id)
        .bind(booking.status.to_string())
        .bind(booking.payment_status.to_string())
        .bind(booking.subtotal)
        .bind(booking.fee_amount)
        .bind(booking.tax_amount)
        .bind(booking.total_amount)
        .bind(&booking.note)
        .bind(booking.payment_id)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error creating booking: {}", e);
            if is_constraint_conflict(&e) {
                AppError::AlreadyExists(format!("Booking {} already exists", booking.id))
            } else {
                AppError::Database(format!("Failed to create booking: {}", e))
            }
        })?;

        Self::insert_items(&mut tx, &booking.line_items).await?;

        tx.commit().await.map_err(Self::commit_error)?;

        Ok(row.into_booking(booking.line_items.clone()))
    }

    #[instrument(skip(self, items, summary))]
    async fn replace_items(
        &self,
        booking_id: Uuid,
        expected: &[BookingStatus],
        new_status: BookingStatus,
        items: &[BookingLineItem],
        summary: &PriceSummary,
        buffer_minutes: i64,
    ) -> AppResult<Option<Booking>> {
        debug!(
            "Replacing {} line items of booking {}",
            items.len(),
            booking_id
        );

        let mut tx = self.pool.begin().await.map_err(Self::begin_error)?;

        Self::lock_stylists(&mut tx, items).await?;

        let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(
            r#"
            UPDATE bookings
            SET status = $2,
                subtotal = $3,
                fee_amount = $4,
                tax_amount = $5,
                total_amount = $6,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($7)
            RETURNING
                id, user_id, salon_id, branch_id, status, payment_status,
                subtotal, fee_amount, tax_amount, total_amount,
                note, payment_id, created_at, updated_at
            "#,
        )
        .bind(booking_id)
        .bind(new_status.to_string())
        .bind(summary.subtotal)
        .bind(summary.fee)
        .bind(summary.tax)
        .bind(summary.total)
        .bind(Self::status_strings(expected))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error updating booking {}: {}", booking_id, e);
            AppError::Database(format!("Failed to update booking: {}", e))
        })?;

        let Some(row) = row else {
            tx.rollback().await.map_err(|e| {
                AppError::Transaction(format!("Failed to roll back: {}", e))
            })?;
            return Ok(None);
        };

        Self::ensure_free(&mut tx, booking_id, items, buffer_minutes).await?;

        sqlx::query("DELETE FROM booking_line_items WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error removing old line items: {}", e);
                AppError::Database(format!("Failed to remove line items: {}", e))
            })?;

        Self::insert_items(&mut tx, items).await?;

        tx.commit().await.map_err(Self::commit_error)?;

        Ok(Some(row.into_booking(items.to_vec())))
    }

    #[instrument(skip(self))]
    async fn transition(&self, booking_id: Uuid, change: &StatusChange) -> AppResult<Option<Booking>> {
        debug!("Moving booking {} to {}", booking_id, change.to);

        let mut tx = self.pool.begin().await.map_err(Self::begin_error)?;

        let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(
            r#"
            UPDATE bookings
            SET status = $2,
                payment_status = COALESCE($3, payment_status),
                payment_id = COALESCE($4, payment_id),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            RETURNING
                id, user_id, salon_id, branch_id, status, payment_status,
                subtotal, fee_amount, tax_amount, total_amount,
                note, payment_id, created_at, updated_at
            "#,
        )
        .bind(booking_id)
        .bind(change.to.to_string())
        .bind(change.payment_status.map(|s| s.to_string()))
        .bind(change.payment_id)
        .bind(Self::status_strings(&change.from))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error transitioning booking {}: {}", booking_id, e);
            AppError::Database(format!("Failed to update booking status: {}", e))
        })?;

        let Some(row) = row else {
            tx.rollback().await.map_err(|e| {
                AppError::Transaction(format!("Failed to roll back: {}", e))
            })?;
            return Ok(None);
        };

        if change.to == BookingStatus::Canceled {
            let released = sqlx::query(
                "UPDATE booking_line_items SET is_active = FALSE WHERE booking_id = $1",
            )
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error releasing line items: {}", e);
                AppError::Database(format!("Failed to release line items: {}", e))
            })?;

            debug!(
                "Released {} reservations of booking {}",
                released.rows_affected(),
                booking_id
            );
        }

        tx.commit().await.map_err(Self::commit_error)?;

        let mut items = self.fetch_items(&[booking_id]).await?;
        Ok(Some(row.into_booking(
            items.remove(&booking_id).unwrap_or_default(),
        )))
    }
}

/// Helper struct for mapping booking rows
#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    salon_id: Uuid,
    branch_id: Uuid,
    status: String,
    payment_status: String,
    subtotal: Decimal,
    fee_amount: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    note: Option<String>,
    payment_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self, line_items: Vec<BookingLineItem>) -> Booking {
        Booking {
            id: self.id,
            user_id: self.user_id,
            salon_id: self.salon_id,
            branch_id: self.branch_id,
            status: PgBookingRepository::parse_status(&self.status),
            payment_status: PgBookingRepository::parse_payment_status(&self.payment_status),
            subtotal: self.subtotal,
            fee_amount: self.fee_amount,
            tax_amount: self.tax_amount,
            total_amount: self.total_amount,
            note: self.note,
            payment_id: self.payment_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            line_items,
        }
    }
}

/// Helper struct for mapping line item rows
#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    id: Uuid,
    booking_id: Uuid,
    service_id: Uuid,
    stylist_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    price: Decimal,
    created_at: DateTime<Utc>,
}

impl From<LineItemRow> for BookingLineItem {
    fn from(row: LineItemRow) -> Self {
        Self {
            id: row.id,
            booking_id: row.booking_id,
            service_id: row.service_id,
            stylist_id: row.stylist_id,
            start_time: row.start_time,
            end_time: row.end_time,
            price: row.price,
            created_at: row.created_at,
        }
    }
}
