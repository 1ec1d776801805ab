//! In-memory storage and mock collaborators for service tests
//!
//! `MemoryBookings` serializes writers behind one mutex and re-checks buffered
//! conflicts before inserting, which is the same guarantee the PostgreSQL
//! repository gets from advisory locks and the exclusion constraint.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use salon_core::{
    config::{BookingConfig, PaymentsConfig},
    models::{
        Booking, BookingHistoryEntry, BookingLineItem, BookingStatus, Branch, BranchConfig,
        GatewayInitiation, GatewayPayload, GatewayRefund, GatewayStatusReport, IdempotencyRecord,
        NotificationEvent, Payment, PaymentAttempt, PaymentStatus, PaymentUpdate, PriceSummary,
        Refund, SalonService, Stylist, StylistSchedule, TimeRange, UserInfo, WebhookEvent,
    },
    traits::{
        BookingLifecycle, BookingRepository, BranchConfigRepository, CacheService, CatalogService,
        Clock, HistoryRepository, IdempotencyRepository, IdentityService, PaymentGateway,
        PaymentRepository, RefundRepository, StatusChange,
    },
    AppError, AppResult,
};
use salon_services::{
    gateway::{webhook, GatewayRegistry, StatusTable},
    AvailabilityService, BookingItemRequest, BookingManager, BranchPolicyResolver,
    CreateBookingRequest, NotificationQueue, PaymentOrchestrator,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const GATEWAY: &str = "razorpay";
pub const WEBHOOK_SECRET: &str = "whsec_test";

// ==================== Clock ====================

pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ==================== Storage ====================

#[derive(Default)]
pub struct MemoryBookings {
    bookings: Mutex<HashMap<Uuid, Booking>>,
}

impl MemoryBookings {
    fn conflicts(
        bookings: &HashMap<Uuid, Booking>,
        items: &[BookingLineItem],
        buffer: i64,
        exclude: Option<Uuid>,
    ) -> bool {
        bookings
            .values()
            .filter(|b| b.status != BookingStatus::Canceled && Some(b.id) != exclude)
            .flat_map(|b| b.line_items.iter())
            .any(|existing| {
                items.iter().any(|item| {
                    item.stylist_id == existing.stylist_id
                        && existing.window().expand(buffer).overlaps(&item.window())
                })
            })
    }

    pub fn count(&self) -> usize {
        self.bookings.lock().unwrap().len()
    }
}

#[async_trait]
impl BookingRepository for MemoryBookings {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Booking>> {
        Ok(self.bookings.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<Booking>, i64)> {
        let mut all: Vec<Booking> = self
            .bookings
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn find_reservations(
        &self,
        stylist_id: Uuid,
        window: TimeRange,
        exclude_booking: Option<Uuid>,
    ) -> AppResult<Vec<BookingLineItem>> {
        Ok(self
            .bookings
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.status != BookingStatus::Canceled && Some(b.id) != exclude_booking)
            .flat_map(|b| b.line_items.iter())
            .filter(|item| item.stylist_id == stylist_id && item.window().overlaps(&window))
            .cloned()
            .collect())
    }

    async fn create_with_items(&self, booking: &Booking, buffer_minutes: i64) -> AppResult<Booking> {
        let mut bookings = self.bookings.lock().unwrap();
        if Self::conflicts(&bookings, &booking.line_items, buffer_minutes, None) {
            return Err(AppError::SlotUnavailable("slot taken concurrently".to_string()));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(booking.clone())
    }

    async fn replace_items(
        &self,
        booking_id: Uuid,
        expected: &[BookingStatus],
        new_status: BookingStatus,
        items: &[BookingLineItem],
        summary: &PriceSummary,
        buffer_minutes: i64,
    ) -> AppResult<Option<Booking>> {
        let mut bookings = self.bookings.lock().unwrap();
        match bookings.get(&booking_id) {
            Some(b) if expected.contains(&b.status) => {}
            _ => return Ok(None),
        }
        if Self::conflicts(&bookings, items, buffer_minutes, Some(booking_id)) {
            return Err(AppError::SlotUnavailable("slot taken concurrently".to_string()));
        }

        let Some(booking) = bookings.get_mut(&booking_id) else {
            return Ok(None);
        };
        booking.line_items = items.to_vec();
        booking.status = new_status;
        booking.subtotal = summary.subtotal;
        booking.fee_amount = summary.fee;
        booking.tax_amount = summary.tax;
        booking.total_amount = summary.total;
        booking.updated_at = Utc::now();
        Ok(Some(booking.clone()))
    }

    async fn transition(&self, booking_id: Uuid, change: &StatusChange) -> AppResult<Option<Booking>> {
        let mut bookings = self.bookings.lock().unwrap();
        let Some(booking) = bookings.get_mut(&booking_id) else {
            return Ok(None);
        };
        if !change.from.contains(&booking.status) {
            return Ok(None);
        }
        booking.status = change.to;
        if let Some(status) = change.payment_status {
            booking.payment_status = status;
        }
        if let Some(payment_id) = change.payment_id {
            booking.payment_id = Some(payment_id);
        }
        booking.updated_at = Utc::now();
        Ok(Some(booking.clone()))
    }
}

#[derive(Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<BookingHistoryEntry>>,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl HistoryRepository for MemoryHistory {
    async fn append(&self, entry: &BookingHistoryEntry) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("history table unavailable".to_string()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn list_by_booking(&self, booking_id: Uuid) -> AppResult<Vec<BookingHistoryEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.booking_id == booking_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryBranchConfigs {
    configs: Mutex<HashMap<Uuid, BranchConfig>>,
}

impl MemoryBranchConfigs {
    pub fn stored(&self, branch_id: Uuid) -> Option<BranchConfig> {
        self.configs.lock().unwrap().get(&branch_id).cloned()
    }
}

#[async_trait]
impl BranchConfigRepository for MemoryBranchConfigs {
    async fn find(&self, branch_id: Uuid) -> AppResult<Option<BranchConfig>> {
        Ok(self.stored(branch_id))
    }

    async fn insert_if_absent(&self, config: &BranchConfig) -> AppResult<BranchConfig> {
        Ok(self
            .configs
            .lock()
            .unwrap()
            .entry(config.branch_id)
            .or_insert_with(|| config.clone())
            .clone())
    }

    async fn update(&self, config: &BranchConfig) -> AppResult<BranchConfig> {
        self.configs
            .lock()
            .unwrap()
            .insert(config.branch_id, config.clone());
        Ok(config.clone())
    }
}

#[derive(Default)]
pub struct MemoryPayments {
    payments: Mutex<HashMap<Uuid, Payment>>,
    attempts: Mutex<Vec<PaymentAttempt>>,
}

impl MemoryPayments {
    pub fn count(&self) -> usize {
        self.payments.lock().unwrap().len()
    }

    pub fn by_key(&self, key: &str) -> Option<Payment> {
        self.payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.idempotency_key == key)
            .cloned()
    }

    /// Force a stored payment's expiry, as time passing would
    pub fn expire(&self, payment_id: Uuid, at: DateTime<Utc>) {
        if let Some(p) = self.payments.lock().unwrap().get_mut(&payment_id) {
            p.expires_at = at;
        }
    }
}

#[async_trait]
impl PaymentRepository for MemoryPayments {
    async fn create(&self, payment: &Payment) -> AppResult<Payment> {
        let mut payments = self.payments.lock().unwrap();
        if payments
            .values()
            .any(|p| p.idempotency_key == payment.idempotency_key)
        {
            return Err(AppError::AlreadyExists(payment.idempotency_key.clone()));
        }
        if payment.status.is_active() && has_active(&payments, payment.booking_id, payment.id) {
            return Err(AppError::Conflict(format!(
                "booking {} already has an active payment",
                payment.booking_id
            )));
        }
        payments.insert(payment.id, payment.clone());
        Ok(payment.clone())
    }

    async fn find_active_for_booking(&self, booking_id: Uuid) -> AppResult<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.booking_id == booking_id && p.status.is_active())
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Payment>> {
        Ok(self.payments.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> AppResult<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.idempotency_key == key)
            .cloned())
    }

    async fn find_by_gateway_payment_id(
        &self,
        gateway: &str,
        gateway_payment_id: &str,
    ) -> AppResult<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.gateway == gateway && p.gateway_payment_id.as_deref() == Some(gateway_payment_id))
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        update: &PaymentUpdate,
    ) -> AppResult<Option<Payment>> {
        let mut payments = self.payments.lock().unwrap();
        let Some(booking_id) = payments
            .get(&id)
            .filter(|p| expected.contains(&p.status))
            .map(|p| p.booking_id)
        else {
            return Ok(None);
        };
        if update.status.is_active() && has_active(&payments, booking_id, id) {
            return Err(AppError::Conflict(format!(
                "booking {} already has an active payment",
                booking_id
            )));
        }
        let Some(payment) = payments.get_mut(&id) else {
            return Ok(None);
        };
        payment.status = update.status;
        if update.gateway_payment_id.is_some() {
            payment.gateway_payment_id = update.gateway_payment_id.clone();
        }
        if update.gateway_order_id.is_some() {
            payment.gateway_order_id = update.gateway_order_id.clone();
        }
        if update.payment_method.is_some() {
            payment.payment_method = update.payment_method.clone();
        }
        if update.status != PaymentStatus::Failed {
            payment.failure_reason = None;
        } else if update.failure_reason.is_some() {
            payment.failure_reason = update.failure_reason.clone();
        }
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn record_attempt(&self, attempt: &PaymentAttempt) -> AppResult<()> {
        let mut attempts = self.attempts.lock().unwrap();
        if attempts
            .iter()
            .any(|a| a.payment_id == attempt.payment_id && a.attempt_number == attempt.attempt_number)
        {
            return Err(AppError::AlreadyExists(format!(
                "attempt {} of {}",
                attempt.attempt_number, attempt.payment_id
            )));
        }
        attempts.push(attempt.clone());
        Ok(())
    }

    async fn list_attempts(&self, payment_id: Uuid) -> AppResult<Vec<PaymentAttempt>> {
        let mut attempts: Vec<_> = self
            .attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.payment_id == payment_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.attempt_number);
        Ok(attempts)
    }

    async fn find_expired_open(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_expired(now))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Another payment of the booking is pending, initiated or successful
fn has_active(payments: &HashMap<Uuid, Payment>, booking_id: Uuid, except: Uuid) -> bool {
    payments
        .values()
        .any(|p| p.booking_id == booking_id && p.id != except && p.status.is_active())
}

fn committed(refunds: &HashMap<Uuid, Refund>, payment_id: Uuid) -> Decimal {
    refunds
        .values()
        .filter(|r| {
            r.payment_id == payment_id
                && matches!(
                    r.status,
                    PaymentStatus::Pending | PaymentStatus::Initiated | PaymentStatus::Success
                )
        })
        .map(|r| r.amount)
        .sum()
}

#[derive(Default)]
pub struct MemoryRefunds {
    refunds: Mutex<HashMap<Uuid, Refund>>,
}

impl MemoryRefunds {
    pub fn count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }
}

#[async_trait]
impl RefundRepository for MemoryRefunds {
    async fn create_within(&self, refund: &Refund, cap: Decimal) -> AppResult<Refund> {
        let mut refunds = self.refunds.lock().unwrap();
        if refunds
            .values()
            .any(|r| r.idempotency_key == refund.idempotency_key)
        {
            return Err(AppError::AlreadyExists(refund.idempotency_key.clone()));
        }
        let remaining = cap - committed(&refunds, refund.payment_id);
        if refund.amount > remaining {
            return Err(AppError::Validation(format!(
                "refund {} exceeds refundable amount {}",
                refund.amount, remaining
            )));
        }
        refunds.insert(refund.id, refund.clone());
        Ok(refund.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Refund>> {
        Ok(self.refunds.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> AppResult<Option<Refund>> {
        Ok(self
            .refunds
            .lock()
            .unwrap()
            .values()
            .find(|r| r.idempotency_key == key)
            .cloned())
    }

    async fn find_by_gateway_refund_id(&self, gateway_refund_id: &str) -> AppResult<Option<Refund>> {
        Ok(self
            .refunds
            .lock()
            .unwrap()
            .values()
            .find(|r| r.gateway_refund_id.as_deref() == Some(gateway_refund_id))
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        status: PaymentStatus,
        gateway_refund_id: Option<&str>,
    ) -> AppResult<Option<Refund>> {
        let mut refunds = self.refunds.lock().unwrap();
        let Some(refund) = refunds.get_mut(&id) else {
            return Ok(None);
        };
        if !expected.contains(&refund.status) {
            return Ok(None);
        }
        refund.status = status;
        if let Some(gateway_refund_id) = gateway_refund_id {
            refund.gateway_refund_id = Some(gateway_refund_id.to_string());
        }
        refund.updated_at = Utc::now();
        Ok(Some(refund.clone()))
    }

    async fn committed_amount(&self, payment_id: Uuid) -> AppResult<Decimal> {
        let sum = committed(&self.refunds.lock().unwrap(), payment_id);
        // A separate round trip: other refunds may land before the caller acts
        tokio::task::yield_now().await;
        Ok(sum)
    }
}

#[derive(Default)]
pub struct MemoryIdempotency {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl MemoryIdempotency {
    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl IdempotencyRepository for MemoryIdempotency {
    async fn find(&self, key: &str) -> AppResult<Option<IdempotencyRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(key)
            .filter(|r| !r.is_expired(Utc::now()))
            .cloned())
    }

    async fn save(&self, record: &IdempotencyRecord) -> AppResult<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.idempotency_key.clone(), record.clone());
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.entries.lock().unwrap().get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, _ttl_secs: u64) -> AppResult<()> {
        let raw = serde_json::to_string(value)?;
        self.entries.lock().unwrap().insert(key.to_string(), raw);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }
}

// ==================== Collaborators ====================

#[derive(Default)]
pub struct MockIdentity {
    users: Mutex<HashMap<Uuid, UserInfo>>,
}

impl MockIdentity {
    pub fn add(&self, user_id: Uuid, name: &str) {
        self.users.lock().unwrap().insert(
            user_id,
            UserInfo {
                id: user_id,
                name: name.to_string(),
                email: Some(format!("{}@example.com", name.to_lowercase())),
                phone: None,
            },
        );
    }

    pub fn remove(&self, user_id: Uuid) {
        self.users.lock().unwrap().remove(&user_id);
    }
}

#[async_trait]
impl IdentityService for MockIdentity {
    async fn validate_user(&self, user_id: Uuid) -> AppResult<UserInfo> {
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }
}

/// Catalog where every stylist works 09:00-18:00 UTC with a 13:00-14:00 break
#[derive(Default)]
pub struct MockCatalog {
    branches: Mutex<HashMap<Uuid, Branch>>,
    services: Mutex<HashMap<Uuid, SalonService>>,
    stylists: Mutex<HashMap<Uuid, Stylist>>,
    days_off: Mutex<Vec<NaiveDate>>,
}

impl MockCatalog {
    pub fn add_branch(&self, branch: Branch) {
        self.branches.lock().unwrap().insert(branch.id, branch);
    }

    pub fn add_service(&self, service: SalonService) {
        self.services.lock().unwrap().insert(service.id, service);
    }

    pub fn add_stylist(&self, stylist: Stylist) {
        self.stylists.lock().unwrap().insert(stylist.id, stylist);
    }

    pub fn day_off(&self, date: NaiveDate) {
        self.days_off.lock().unwrap().push(date);
    }
}

fn on(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()).and_utc()
}

#[async_trait]
impl CatalogService for MockCatalog {
    async fn get_branch(&self, branch_id: Uuid) -> AppResult<Branch> {
        self.branches
            .lock()
            .unwrap()
            .get(&branch_id)
            .cloned()
            .ok_or_else(|| AppError::BranchNotFound(branch_id.to_string()))
    }

    async fn get_service(&self, service_id: Uuid) -> AppResult<SalonService> {
        self.services
            .lock()
            .unwrap()
            .get(&service_id)
            .cloned()
            .ok_or_else(|| AppError::ServiceNotFound(service_id.to_string()))
    }

    async fn get_stylist(&self, stylist_id: Uuid) -> AppResult<Stylist> {
        self.stylists
            .lock()
            .unwrap()
            .get(&stylist_id)
            .cloned()
            .ok_or_else(|| AppError::StylistNotFound(stylist_id.to_string()))
    }

    async fn get_stylist_schedule(&self, stylist_id: Uuid, date: NaiveDate) -> AppResult<StylistSchedule> {
        self.get_stylist(stylist_id).await?;
        if self.days_off.lock().unwrap().contains(&date) {
            return Ok(StylistSchedule::default());
        }
        Ok(StylistSchedule {
            working_hours: vec![TimeRange::new(on(date, 9), on(date, 18))],
            breaks: vec![TimeRange::new(on(date, 13), on(date, 14))],
        })
    }
}

/// Gateway double with scripted outcomes
pub struct MockGateway {
    name: String,
    pub initiations: AtomicUsize,
    pub refunds: AtomicUsize,
    /// Number of upcoming initiations to reject
    pub failures_left: AtomicUsize,
    /// Delay every call by this long
    pub delay: Mutex<Option<std::time::Duration>>,
    pub confirm_status: Mutex<String>,
    pub refund_status: Mutex<String>,
}

impl MockGateway {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            initiations: AtomicUsize::new(0),
            refunds: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            delay: Mutex::new(None),
            confirm_status: Mutex::new("captured".to_string()),
            refund_status: Mutex::new("processed".to_string()),
        }
    }

    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initiate_payment(&self, _amount: Decimal, _currency: &str, order_ref: &str) -> AppResult<GatewayInitiation> {
        self.pause().await;
        let n = self.initiations.fetch_add(1, Ordering::SeqCst) + 1;

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::Gateway("card network unavailable".to_string()));
        }

        Ok(GatewayInitiation {
            gateway_payment_id: format!("pay_{}", n),
            gateway_order_id: format!("order_{}", order_ref),
            redirect_url: Some(format!("https://pay.example/{}", n)),
            raw: GatewayPayload(serde_json::json!({ "id": format!("pay_{}", n) })),
        })
    }

    async fn confirm_payment(&self, _gateway_payment_id: &str) -> AppResult<GatewayStatusReport> {
        self.pause().await;
        Ok(GatewayStatusReport {
            native_status: self.confirm_status.lock().unwrap().clone(),
            payment_method: Some("upi".to_string()),
            failure_reason: None,
            raw: GatewayPayload::empty(),
        })
    }

    async fn refund_payment(&self, _gateway_payment_id: &str, _amount: Decimal) -> AppResult<GatewayRefund> {
        self.pause().await;
        let n = self.refunds.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayRefund {
            gateway_refund_id: format!("rfnd_{}", n),
            native_status: self.refund_status.lock().unwrap().clone(),
            raw: GatewayPayload::empty(),
        })
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> AppResult<WebhookEvent> {
        webhook::verify_signature(payload, signature, WEBHOOK_SECRET)?;
        webhook::parse_event(StatusTable::for_gateway(&self.name), payload)
    }
}

// ==================== Harness ====================

pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub bookings: Arc<MemoryBookings>,
    pub history: Arc<MemoryHistory>,
    pub branch_configs: Arc<MemoryBranchConfigs>,
    pub payment_repo: Arc<MemoryPayments>,
    pub refund_repo: Arc<MemoryRefunds>,
    pub idempotency: Arc<MemoryIdempotency>,
    pub cache: Arc<MemoryCache>,
    pub identity: Arc<MockIdentity>,
    pub catalog: Arc<MockCatalog>,
    pub gateway: Arc<MockGateway>,
    pub policy: Arc<BranchPolicyResolver<MemoryCache>>,
    pub availability: Arc<AvailabilityService<MemoryCache>>,
    pub manager: Arc<BookingManager<MemoryCache>>,
    pub payments: PaymentOrchestrator<MemoryCache>,
    pub notifications: mpsc::Receiver<NotificationEvent>,

    /// Appointment day, nine days after the harness starts
    pub day: NaiveDate,

    pub user_id: Uuid,
    pub salon_id: Uuid,
    pub branch_id: Uuid,
    pub stylist_id: Uuid,
    pub other_stylist_id: Uuid,
    pub foreign_stylist_id: Uuid,
    /// 30 minutes, 500.00
    pub haircut_id: Uuid,
    /// 60 minutes, 1200.00
    pub coloring_id: Uuid,
}

/// Booking defaults: buffer 15 min, fee 50, tax 10%, cancel cutoff 24h,
/// reschedule window 12h, 90 days ahead
pub fn booking_defaults() -> BookingConfig {
    BookingConfig {
        default_buffer_minutes: 15,
        default_cancellation_cutoff_hours: 24,
        default_reschedule_window_hours: 12,
        default_max_advance_booking_days: 90,
        default_booking_fee: 50.0,
        default_tax_percentage: 10.0,
        slot_interval_minutes: 30,
    }
}

pub fn payments_config() -> PaymentsConfig {
    PaymentsConfig {
        max_attempts: 3,
        gateway_timeout_secs: 1,
        ..Default::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        let start = Utc::now();
        let clock = Arc::new(FixedClock::new(start));
        let bookings = Arc::new(MemoryBookings::default());
        let history = Arc::new(MemoryHistory::default());
        let branch_configs = Arc::new(MemoryBranchConfigs::default());
        let payment_repo = Arc::new(MemoryPayments::default());
        let refund_repo = Arc::new(MemoryRefunds::default());
        let idempotency = Arc::new(MemoryIdempotency::default());
        let cache = Arc::new(MemoryCache::default());
        let identity = Arc::new(MockIdentity::default());
        let catalog = Arc::new(MockCatalog::default());
        let gateway = Arc::new(MockGateway::new(GATEWAY));

        let user_id = Uuid::new_v4();
        let salon_id = Uuid::new_v4();
        let branch_id = Uuid::new_v4();
        let other_branch_id = Uuid::new_v4();
        let stylist_id = Uuid::new_v4();
        let other_stylist_id = Uuid::new_v4();
        let foreign_stylist_id = Uuid::new_v4();
        let haircut_id = Uuid::new_v4();
        let coloring_id = Uuid::new_v4();

        identity.add(user_id, "Ana");
        catalog.add_branch(Branch {
            id: branch_id,
            salon_id,
            name: "Downtown".to_string(),
        });
        catalog.add_branch(Branch {
            id: other_branch_id,
            salon_id,
            name: "Uptown".to_string(),
        });
        for (id, branch, name) in [
            (stylist_id, branch_id, "Marta"),
            (other_stylist_id, branch_id, "Luis"),
            (foreign_stylist_id, other_branch_id, "Iris"),
        ] {
            catalog.add_stylist(Stylist {
                id,
                branch_id: branch,
                name: name.to_string(),
            });
        }
        catalog.add_service(SalonService {
            id: haircut_id,
            salon_id,
            name: "Haircut".to_string(),
            duration_minutes: 30,
            price: dec!(500),
        });
        catalog.add_service(SalonService {
            id: coloring_id,
            salon_id,
            name: "Coloring".to_string(),
            duration_minutes: 60,
            price: dec!(1200),
        });

        let policy = Arc::new(BranchPolicyResolver::new(
            branch_configs.clone(),
            cache.clone(),
            booking_defaults(),
        ));
        let availability = Arc::new(AvailabilityService::new(
            catalog.clone(),
            bookings.clone(),
            policy.clone(),
            clock.clone(),
            30,
        ));
        let (queue, notifications) = NotificationQueue::new(64);
        let manager = Arc::new(BookingManager::new(
            bookings.clone(),
            history.clone(),
            identity.clone(),
            catalog.clone(),
            policy.clone(),
            availability.clone(),
            queue,
            clock.clone(),
        ));

        let config = payments_config();
        let mut registry = GatewayRegistry::new(&config);
        registry.register(gateway.clone());

        let lifecycle: Arc<dyn BookingLifecycle> = manager.clone();
        let payments = PaymentOrchestrator::new(
            payment_repo.clone(),
            refund_repo.clone(),
            idempotency.clone(),
            cache.clone(),
            Arc::new(registry),
            lifecycle,
            clock.clone(),
            config,
        );

        Self {
            clock,
            bookings,
            history,
            branch_configs,
            payment_repo,
            refund_repo,
            idempotency,
            cache,
            identity,
            catalog,
            gateway,
            policy,
            availability,
            manager,
            payments,
            notifications,
            day: (start + Duration::days(9)).date_naive(),
            user_id,
            salon_id,
            branch_id,
            stylist_id,
            other_stylist_id,
            foreign_stylist_id,
            haircut_id,
            coloring_id,
        }
    }

    /// `hour:minute` UTC on the appointment day
    pub fn at(&self, hour: u32, minute: u32) -> DateTime<Utc> {
        self.day
            .and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
            .and_utc()
    }

    pub fn item(&self, service_id: Uuid, stylist_id: Uuid, start: DateTime<Utc>) -> BookingItemRequest {
        BookingItemRequest {
            service_id,
            stylist_id,
            start_time: start,
        }
    }

    pub fn request(&self, items: Vec<BookingItemRequest>) -> CreateBookingRequest {
        CreateBookingRequest {
            user_id: self.user_id,
            branch_id: self.branch_id,
            items,
            note: None,
        }
    }

    /// Haircut with the main stylist at `start`
    pub async fn book_haircut(&self, start: DateTime<Utc>) -> AppResult<Booking> {
        let request = self.request(vec![self.item(self.haircut_id, self.stylist_id, start)]);
        self.manager.create(request).await
    }

    /// Haircut booked, paid and confirmed
    pub async fn confirmed_haircut(&self, start: DateTime<Utc>) -> (Booking, Payment) {
        let booking = self.book_haircut(start).await.unwrap();
        let initiation = self
            .payments
            .initiate(self.payment_request(&booking, &format!("pay-{}", booking.id)))
            .await
            .unwrap();
        let gateway_payment_id = initiation.payment.gateway_payment_id.clone().unwrap();
        let payment = self
            .payments
            .confirm(initiation.payment.id, &gateway_payment_id)
            .await
            .unwrap();
        let booking = self.manager.get(booking.id).await.unwrap();
        (booking, payment)
    }

    pub fn payment_request(&self, booking: &Booking, key: &str) -> salon_core::models::InitiatePaymentRequest {
        salon_core::models::InitiatePaymentRequest {
            booking_id: booking.id,
            user_id: booking.user_id,
            amount: booking.total_amount,
            currency: "INR".to_string(),
            idempotency_key: key.to_string(),
            gateway: None,
            payment_method: None,
        }
    }

    /// Drain queued notifications
    pub fn drain_notifications(&mut self) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.notifications.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance_to(&self, now: DateTime<Utc>) {
        self.clock.set(now);
    }

    pub fn hours_before(&self, instant: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
        instant - Duration::hours(hours)
    }
}
