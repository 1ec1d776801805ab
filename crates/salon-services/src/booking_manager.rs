//! Booking lifecycle manager
//!
//! Owns the booking state machine:
//!
//! ```text
//! initiated ──confirm──▶ confirmed ──reschedule──▶ rescheduled ─┐
//!     │                      │                        ▲  │      │
//!     │                      │                        └──┘      │
//!     └──────cancel──────────┴────────cancel────────────────────┴─▶ canceled
//! ```
//!
//! Creation is all-or-nothing: every requested item is validated before
//! anything is written. History and notifications never fail a transition.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use salon_core::{
    models::{
        Booking, BookingHistoryEntry, BookingLineItem, BookingNotice, BookingStatus, Branch,
        BranchConfig, HistoryAction, HistorySnapshot, NotificationEvent, StylistSchedule,
        TimeRange,
    },
    traits::{
        BookingLifecycle, BookingRepository, CacheService, CatalogService, Clock,
        HistoryRepository, IdentityService, PaginatedResponse, Pagination, PaginationMeta,
        StatusChange,
    },
    AppError, AppResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::availability::{fits_schedule, AvailabilityService};
use crate::branch_policy::BranchPolicyResolver;
use crate::notification::NotificationQueue;
use crate::pricing::{round_amount, summarize};

/// One requested (service, stylist, start) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingItemRequest {
    pub service_id: Uuid,
    pub stylist_id: Uuid,
    pub start_time: DateTime<Utc>,
}

/// Input of [`BookingManager::create`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub user_id: Uuid,
    pub branch_id: Uuid,
    pub items: Vec<BookingItemRequest>,
    pub note: Option<String>,
}

/// Input of [`BookingManager::reschedule`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub items: Vec<BookingItemRequest>,
    pub actor_id: Option<Uuid>,
    pub reason: Option<String>,
}

/// Booking lifecycle manager
pub struct BookingManager<C: CacheService> {
    bookings: Arc<dyn BookingRepository>,
    history: Arc<dyn HistoryRepository>,
    identity: Arc<dyn IdentityService>,
    catalog: Arc<dyn CatalogService>,
    policy: Arc<BranchPolicyResolver<C>>,
    availability: Arc<AvailabilityService<C>>,
    notifications: NotificationQueue,
    clock: Arc<dyn Clock>,
}

impl<C: CacheService> BookingManager<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        history: Arc<dyn HistoryRepository>,
        identity: Arc<dyn IdentityService>,
        catalog: Arc<dyn CatalogService>,
        policy: Arc<BranchPolicyResolver<C>>,
        availability: Arc<AvailabilityService<C>>,
        notifications: NotificationQueue,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            history,
            identity,
            catalog,
            policy,
            availability,
            notifications,
            clock,
        }
    }

    /// Create a booking in `initiated` status
    ///
    /// # Errors
    ///
    /// - `UserNotFound`, `BranchNotFound`, `ServiceNotFound`, `StylistNotFound`
    /// - `StylistBranchMismatch` when a stylist works elsewhere
    /// - `SlotUnavailable` when an item conflicts with the schedule, another
    ///   reservation or another item of the same request
    #[instrument(skip(self, request), fields(user_id = %request.user_id, branch_id = %request.branch_id))]
    pub async fn create(&self, request: CreateBookingRequest) -> AppResult<Booking> {
        self.identity.validate_user(request.user_id).await?;
        let branch = self.catalog.get_branch(request.branch_id).await?;
        let policy = self.policy.resolve(branch.id).await?;

        let booking_id = Booking::new_id();
        let items = self
            .validate_items(&branch, &policy, booking_id, &request.items, None)
            .await?;

        let prices: Vec<_> = items.iter().map(|item| item.price).collect();
        let summary = summarize(&prices, &policy);

        let booking = Booking::new(
            booking_id,
            request.user_id,
            branch.salon_id,
            branch.id,
            request.note,
            items,
            summary,
        );

        let saved = self
            .bookings
            .create_with_items(&booking, i64::from(policy.buffer_minutes))
            .await?;

        self.record_history(
            BookingHistoryEntry::new(saved.id, HistoryAction::Created)
                .actor(Some(saved.user_id))
                .new_value(status_snapshot(&saved)),
        )
        .await;

        info!(
            "Created booking {} with {} items, total {}",
            saved.id,
            saved.line_items.len(),
            saved.total_amount
        );

        Ok(saved)
    }

    /// Mark an `initiated` booking as paid
    #[instrument(skip(self))]
    pub async fn confirm(&self, booking_id: Uuid, payment_id: Uuid) -> AppResult<Booking> {
        let booking = self.get(booking_id).await?;
        if booking.status != BookingStatus::Initiated {
            return Err(invalid_transition(booking.status, "confirm"));
        }

        let change = StatusChange::new(&[BookingStatus::Initiated], BookingStatus::Confirmed)
            .paid_with(payment_id);
        let updated = match self.bookings.transition(booking_id, &change).await? {
            Some(updated) => updated,
            None => return Err(self.lost_race(booking_id, "confirm").await),
        };

        self.record_history(
            BookingHistoryEntry::new(booking_id, HistoryAction::Confirmed)
                .actor(Some(updated.user_id))
                .old_value(status_snapshot(&booking))
                .new_value(status_snapshot(&updated)),
        )
        .await;

        self.notify(&updated, |notice| NotificationEvent::BookingConfirmed { notice });

        info!("Confirmed booking {} with payment {}", booking_id, payment_id);
        Ok(updated)
    }

    /// Cancel a booking and release its slots
    ///
    /// Accepted up to and including `earliest start - cancellation cutoff`.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        actor_id: Option<Uuid>,
        reason: Option<String>,
    ) -> AppResult<Booking> {
        let booking = self.get(booking_id).await?;
        if !BookingStatus::CANCELABLE.contains(&booking.status) {
            return Err(invalid_transition(booking.status, "cancel"));
        }

        let policy = self.policy.resolve(booking.branch_id).await?;
        self.check_cutoff(&booking, policy.cancellation_cutoff_hours, "cancellation")?;

        let change = StatusChange::new(&BookingStatus::CANCELABLE, BookingStatus::Canceled);
        let updated = match self.bookings.transition(booking_id, &change).await? {
            Some(updated) => updated,
            None => return Err(self.lost_race(booking_id, "cancel").await),
        };

        let mut entry = BookingHistoryEntry::new(booking_id, HistoryAction::Canceled)
            .actor(actor_id)
            .old_value(status_snapshot(&booking))
            .new_value(status_snapshot(&updated));
        if let Some(reason) = &reason {
            entry = entry.reason(reason.clone());
        }
        self.record_history(entry).await;

        self.notify(&updated, |notice| NotificationEvent::BookingCanceled {
            notice,
            reason: reason.clone(),
        });

        info!("Canceled booking {}", booking_id);
        Ok(updated)
    }

    /// Move a confirmed booking onto new slots
    ///
    /// Every new item is validated before the old ones are touched; the swap
    /// itself is a single storage transaction.
    #[instrument(skip(self, request))]
    pub async fn reschedule(
        &self,
        booking_id: Uuid,
        request: RescheduleRequest,
    ) -> AppResult<Booking> {
        let booking = self.get(booking_id).await?;
        if !BookingStatus::RESCHEDULABLE.contains(&booking.status) {
            return Err(invalid_transition(booking.status, "reschedule"));
        }

        let branch = self.catalog.get_branch(booking.branch_id).await?;
        let policy = self.policy.resolve(branch.id).await?;
        self.check_cutoff(&booking, policy.reschedule_window_hours, "reschedule window")?;

        let items = self
            .validate_items(&branch, &policy, booking_id, &request.items, Some(booking_id))
            .await?;
        let prices: Vec<_> = items.iter().map(|item| item.price).collect();
        let summary = summarize(&prices, &policy);

        let updated = self
            .bookings
            .replace_items(
                booking_id,
                &BookingStatus::RESCHEDULABLE,
                BookingStatus::Rescheduled,
                &items,
                &summary,
                i64::from(policy.buffer_minutes),
            )
            .await?;
        let updated = match updated {
            Some(updated) => updated,
            None => return Err(self.lost_race(booking_id, "reschedule").await),
        };

        let mut entry = BookingHistoryEntry::new(booking_id, HistoryAction::Rescheduled)
            .actor(request.actor_id)
            .old_value(HistorySnapshot::LineItems {
                items: booking.line_items.clone(),
                total: booking.total_amount,
            })
            .new_value(HistorySnapshot::LineItems {
                items: updated.line_items.clone(),
                total: updated.total_amount,
            });
        if let Some(reason) = request.reason {
            entry = entry.reason(reason);
        }
        self.record_history(entry).await;

        info!(
            "Rescheduled booking {}: total {} -> {}",
            booking_id, booking.total_amount, updated.total_amount
        );
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))
    }

    /// A user's bookings, newest first
    #[instrument(skip(self))]
    pub async fn list_by_user(
        &self,
        user_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Booking>> {
        let (data, total) = self
            .bookings
            .list_by_user(user_id, pagination.limit(), pagination.offset())
            .await?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
        })
    }

    /// Audit trail of a booking in chronological order
    #[instrument(skip(self))]
    pub async fn history(&self, booking_id: Uuid) -> AppResult<Vec<BookingHistoryEntry>> {
        self.get(booking_id).await?;
        self.history.list_by_booking(booking_id).await
    }

    /// Validate requested items and turn them into priced line items
    async fn validate_items(
        &self,
        branch: &Branch,
        policy: &BranchConfig,
        booking_id: Uuid,
        requested: &[BookingItemRequest],
        exclude_booking: Option<Uuid>,
    ) -> AppResult<Vec<BookingLineItem>> {
        if requested.is_empty() {
            return Err(AppError::Validation(
                "at least one service is required".to_string(),
            ));
        }

        let now = self.clock.now();
        let latest_start = now + Duration::days(i64::from(policy.max_advance_booking_days));
        let buffer = i64::from(policy.buffer_minutes);

        let mut schedules: HashMap<(Uuid, NaiveDate), StylistSchedule> = HashMap::new();
        let mut accepted: Vec<BookingLineItem> = Vec::with_capacity(requested.len());

        for item in requested {
            let service = self.catalog.get_service(item.service_id).await?;
            if service.salon_id != branch.salon_id {
                return Err(AppError::Validation(format!(
                    "service {} is not offered by salon {}",
                    service.id, branch.salon_id
                )));
            }
            if service.duration_minutes <= 0 {
                return Err(AppError::Validation(format!(
                    "service {} has no duration",
                    service.id
                )));
            }

            let stylist = self.catalog.get_stylist(item.stylist_id).await?;
            if stylist.branch_id != branch.id {
                return Err(AppError::StylistBranchMismatch {
                    stylist_id: stylist.id.to_string(),
                    branch_id: branch.id.to_string(),
                });
            }

            let window =
                TimeRange::with_minutes(item.start_time, i64::from(service.duration_minutes));
            if window.start <= now {
                return Err(AppError::Validation(format!(
                    "start time {} is not in the future",
                    window.start
                )));
            }
            if window.start > latest_start {
                return Err(AppError::PolicyViolation(format!(
                    "start time {} is more than {} days ahead",
                    window.start, policy.max_advance_booking_days
                )));
            }

            let date = window.start.date_naive();
            if !schedules.contains_key(&(stylist.id, date)) {
                let schedule = self.catalog.get_stylist_schedule(stylist.id, date).await?;
                schedules.insert((stylist.id, date), schedule);
            }
            let fits = schedules
                .get(&(stylist.id, date))
                .map(|schedule| fits_schedule(&window, schedule))
                .unwrap_or(false);
            if !fits {
                return Err(AppError::SlotUnavailable(format!(
                    "stylist {} is not working at {}",
                    stylist.id, window.start
                )));
            }

            let clashes_within_request = accepted.iter().any(|other| {
                other.stylist_id == stylist.id && other.window().expand(buffer).overlaps(&window)
            });
            if clashes_within_request {
                return Err(AppError::SlotUnavailable(format!(
                    "items for stylist {} overlap at {}",
                    stylist.id, window.start
                )));
            }

            let free = self
                .availability
                .is_stylist_available(stylist.id, window, buffer, exclude_booking)
                .await?;
            if !free {
                return Err(AppError::SlotUnavailable(format!(
                    "stylist {} is booked at {}",
                    stylist.id, window.start
                )));
            }

            accepted.push(BookingLineItem::new(
                booking_id,
                service.id,
                stylist.id,
                window,
                round_amount(service.price),
            ));
        }

        debug!("Validated {} items for booking {}", accepted.len(), booking_id);
        Ok(accepted)
    }

    /// Reject once `now` is past `earliest start - hours`
    fn check_cutoff(&self, booking: &Booking, hours: i32, label: &str) -> AppResult<()> {
        let Some(first_start) = booking.earliest_start() else {
            return Ok(());
        };

        let deadline = first_start - Duration::hours(i64::from(hours));
        if self.clock.now() > deadline {
            return Err(AppError::CutoffPassed(format!(
                "{} closed at {} ({}h before the first appointment)",
                label, deadline, hours
            )));
        }
        Ok(())
    }

    /// Error for a conditional update that matched nothing
    async fn lost_race(&self, booking_id: Uuid, action: &str) -> AppError {
        match self.bookings.find_by_id(booking_id).await {
            Ok(Some(current)) => invalid_transition(current.status, action),
            Ok(None) => AppError::BookingNotFound(booking_id.to_string()),
            Err(e) => e,
        }
    }

    async fn record_history(&self, entry: BookingHistoryEntry) {
        if let Err(e) = self.history.append(&entry).await {
            warn!(
                "Failed to record {} history for booking {}: {}",
                entry.action, entry.booking_id, e
            );
        }
    }

    fn notify<F>(&self, booking: &Booking, build: F)
    where
        F: FnOnce(BookingNotice) -> NotificationEvent,
    {
        self.notifications.enqueue(build(BookingNotice::new(booking)));
    }
}

#[async_trait::async_trait]
impl<C: CacheService> BookingLifecycle for BookingManager<C> {
    async fn confirm_booking(&self, booking_id: Uuid, payment_id: Uuid) -> AppResult<Booking> {
        self.confirm(booking_id, payment_id).await
    }

    async fn get_booking(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.get(booking_id).await
    }
}

fn status_snapshot(booking: &Booking) -> HistorySnapshot {
    HistorySnapshot::Status {
        status: booking.status,
        payment_status: booking.payment_status,
        payment_id: booking.payment_id,
    }
}

fn invalid_transition(status: BookingStatus, action: &str) -> AppError {
    AppError::InvalidTransition {
        status: status.to_string(),
        action: action.to_string(),
    }
}
