//! Common traits for repositories, collaborators and services
//!
//! Storage traits are implemented in `salon-db`; collaborator traits describe
//! the external identity, catalog, payment gateway and notification systems.

use crate::error::AppError;
use crate::models::{
    Booking, BookingHistoryEntry, BookingLineItem, BookingPaymentStatus, BookingStatus, Branch,
    BranchConfig, GatewayInitiation, GatewayRefund, GatewayStatusReport, IdempotencyRecord,
    NotificationEvent, Payment, PaymentAttempt, PaymentStatus, PaymentUpdate, PriceSummary,
    Refund, SalonService, Stylist, StylistSchedule, TimeRange, UserInfo, WebhookEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

/// Conditional booking status change
///
/// Applied only while the stored status is one of `from`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub from: Vec<BookingStatus>,
    pub to: BookingStatus,
    pub payment_status: Option<BookingPaymentStatus>,
    pub payment_id: Option<Uuid>,
}

impl StatusChange {
    pub fn new(from: &[BookingStatus], to: BookingStatus) -> Self {
        Self {
            from: from.to_vec(),
            to,
            payment_status: None,
            payment_id: None,
        }
    }

    pub fn paid_with(mut self, payment_id: Uuid) -> Self {
        self.payment_status = Some(BookingPaymentStatus::Paid);
        self.payment_id = Some(payment_id);
        self
    }
}

/// Booking repository
///
/// Implementations must make `create_with_items` and `replace_items` exclusive
/// per stylist at the storage layer: two concurrent writers for overlapping
/// ranges can never both succeed.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Find booking (with line items) by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, AppError>;

    /// List a user's bookings, newest first, with the total count
    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Booking>, i64), AppError>;

    /// Active line items of a stylist intersecting `window`
    async fn find_reservations(
        &self,
        stylist_id: Uuid,
        window: TimeRange,
        exclude_booking: Option<Uuid>,
    ) -> Result<Vec<BookingLineItem>, AppError>;

    /// Persist booking and items in one transaction
    ///
    /// Re-validates buffered conflicts under storage exclusivity and fails
    /// with `AppError::SlotUnavailable` when another booking won the slot.
    async fn create_with_items(
        &self,
        booking: &Booking,
        buffer_minutes: i64,
    ) -> Result<Booking, AppError>;

    /// Swap all line items and totals in one transaction
    ///
    /// Returns `None` when the stored status is no longer in `expected`.
    async fn replace_items(
        &self,
        booking_id: Uuid,
        expected: &[BookingStatus],
        new_status: BookingStatus,
        items: &[BookingLineItem],
        summary: &PriceSummary,
        buffer_minutes: i64,
    ) -> Result<Option<Booking>, AppError>;

    /// Conditional status transition; moving to `Canceled` releases the slots
    ///
    /// Returns `None` when the stored status is not in `change.from`.
    async fn transition(
        &self,
        booking_id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<Booking>, AppError>;
}

/// Append-only booking history
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, entry: &BookingHistoryEntry) -> Result<(), AppError>;

    /// Entries of a booking in chronological order
    async fn list_by_booking(&self, booking_id: Uuid)
        -> Result<Vec<BookingHistoryEntry>, AppError>;
}

/// Branch configuration repository
#[async_trait]
pub trait BranchConfigRepository: Send + Sync {
    async fn find(&self, branch_id: Uuid) -> Result<Option<BranchConfig>, AppError>;

    /// Insert unless a row exists; returns whichever row is stored afterwards
    async fn insert_if_absent(&self, config: &BranchConfig) -> Result<BranchConfig, AppError>;

    async fn update(&self, config: &BranchConfig) -> Result<BranchConfig, AppError>;
}

/// Payment and payment attempt repository
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Insert a payment; `AppError::AlreadyExists` when the idempotency key is taken
    async fn create(&self, payment: &Payment) -> Result<Payment, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, AppError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>, AppError>;

    /// The `pending`, `initiated` or `success` payment of a booking, if any
    ///
    /// At most one exists; storage rejects a second one with `AppError::Conflict`.
    async fn find_active_for_booking(&self, booking_id: Uuid) -> Result<Option<Payment>, AppError>;

    async fn find_by_gateway_payment_id(
        &self,
        gateway: &str,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>, AppError>;

    /// Conditional update: applied only while the status is one of `expected`
    ///
    /// A `failure_reason` is kept only while the new status is `failed`.
    async fn update_status(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        update: &PaymentUpdate,
    ) -> Result<Option<Payment>, AppError>;

    async fn record_attempt(&self, attempt: &PaymentAttempt) -> Result<(), AppError>;

    /// Attempts ordered by attempt number
    async fn list_attempts(&self, payment_id: Uuid) -> Result<Vec<PaymentAttempt>, AppError>;

    /// Open payments whose expiry passed
    async fn find_expired_open(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, AppError>;
}

/// Refund repository
#[async_trait]
pub trait RefundRepository: Send + Sync {
    /// Insert a refund while the payment's committed refunds plus this one
    /// stay within `cap`
    ///
    /// The sum and the insert are serialized per payment. Exceeding the cap is
    /// `AppError::Validation`; a taken idempotency key is `AppError::AlreadyExists`.
    async fn create_within(&self, refund: &Refund, cap: Decimal) -> Result<Refund, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Refund>, AppError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Refund>, AppError>;

    async fn find_by_gateway_refund_id(
        &self,
        gateway_refund_id: &str,
    ) -> Result<Option<Refund>, AppError>;

    /// Conditional update: applied only while the status is one of `expected`
    async fn update_status(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        status: PaymentStatus,
        gateway_refund_id: Option<&str>,
    ) -> Result<Option<Refund>, AppError>;

    /// Sum of pending and successful refunds of a payment
    async fn committed_amount(&self, payment_id: Uuid) -> Result<Decimal, AppError>;
}

/// Idempotency record repository
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Find a record that has not expired yet
    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>, AppError>;

    /// Insert or overwrite the record of a key
    async fn save(&self, record: &IdempotencyRecord) -> Result<(), AppError>;

    /// Delete expired records, returning how many were removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Identity collaborator
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// `AppError::UserNotFound` when the user does not exist
    async fn validate_user(&self, user_id: Uuid) -> Result<UserInfo, AppError>;
}

/// Salon catalog collaborator
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_branch(&self, branch_id: Uuid) -> Result<Branch, AppError>;

    async fn get_service(&self, service_id: Uuid) -> Result<SalonService, AppError>;

    async fn get_stylist(&self, stylist_id: Uuid) -> Result<Stylist, AppError>;

    /// Working hours and breaks of a stylist on `date`; empty on days off
    async fn get_stylist_schedule(
        &self,
        stylist_id: Uuid,
        date: NaiveDate,
    ) -> Result<StylistSchedule, AppError>;
}

/// Payment gateway capability
///
/// Each gateway speaks its own status vocabulary; callers translate
/// `native_status` values through the gateway's status table.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Name used for selection and status table lookup
    fn name(&self) -> &str;

    async fn initiate_payment(
        &self,
        amount: Decimal,
        currency: &str,
        order_ref: &str,
    ) -> Result<GatewayInitiation, AppError>;

    async fn confirm_payment(
        &self,
        gateway_payment_id: &str,
    ) -> Result<GatewayStatusReport, AppError>;

    async fn refund_payment(
        &self,
        gateway_payment_id: &str,
        amount: Decimal,
    ) -> Result<GatewayRefund, AppError>;

    /// `AppError::InvalidSignature` when the signature does not match
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent, AppError>;
}

/// Notification collaborator
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: &NotificationEvent) -> Result<(), AppError>;
}

/// Booking confirmation callback used by the payment flow
#[async_trait]
pub trait BookingLifecycle: Send + Sync {
    async fn confirm_booking(&self, booking_id: Uuid, payment_id: Uuid)
        -> Result<Booking, AppError>;

    async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, AppError>;
}

/// Cache service trait
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get value from cache
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Set value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError>;

    /// Delete value from cache
    async fn delete(&self, key: &str) -> Result<bool, AppError>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
