//! Payment orchestrator
//!
//! Drives payments through pluggable gateways:
//!
//! 1. **Initiate**: idempotent per client key. The first successful response
//!    is stored (PostgreSQL record, Redis fast path) and replayed verbatim.
//! 2. **Confirm / webhook**: the gateway's native status is translated through
//!    the gateway's table; a successful payment confirms its booking.
//! 3. **Retry**: a failed payment gets new attempts up to the ceiling.
//! 4. **Refund**: partial or full, never above the refundable remainder.
//!
//! Every status change is a conditional update, so concurrent confirmations
//! and replayed webhooks settle on a single outcome.

use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use salon_cache::keys::idempotency_key as idempotency_cache_key;
use salon_core::{
    config::PaymentsConfig,
    models::{
        BookingStatus, IdempotencyRecord, InitiatePaymentRequest, Payment, PaymentAttempt,
        PaymentInitiation, PaymentStatus, PaymentUpdate, Refund, WebhookEvent, WebhookSubject,
    },
    traits::{
        BookingLifecycle, CacheService, Clock, IdempotencyRepository, PaymentGateway,
        PaymentRepository, RefundRepository,
    },
    AppError, AppResult,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::constants::EXPIRED_SWEEP_BATCH;
use crate::gateway::{GatewayRegistry, StatusTable};
use crate::pricing::round_amount;

/// Input of [`PaymentOrchestrator::refund`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Defaults to the remaining refundable amount
    pub amount: Option<Decimal>,
    pub reason: String,
    pub idempotency_key: String,
}

/// What a webhook did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// A status change was applied
    Applied,
    /// Already in that status, terminal, or an untranslatable status
    Unchanged,
    /// No payment or refund carries the referenced gateway id
    UnknownReference,
}

/// Result of an expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub purged_idempotency_records: u64,
    pub expired_payments: usize,
}

/// Request fingerprint: SHA-256 over the fields that identify a payment
///
/// The gateway preference is left out; it only affects routing.
pub fn fingerprint(
    booking_id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    currency: &str,
    payment_method: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(booking_id.as_bytes());
    hasher.update(user_id.as_bytes());
    hasher.update(amount.normalize().to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(currency.to_uppercase().as_bytes());
    hasher.update(b"|");
    hasher.update(payment_method.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

fn request_fingerprint(request: &InitiatePaymentRequest) -> String {
    fingerprint(
        request.booking_id,
        request.user_id,
        request.amount,
        &request.currency,
        request.payment_method.as_deref(),
    )
}

fn payment_fingerprint(payment: &Payment) -> String {
    fingerprint(
        payment.booking_id,
        payment.user_id,
        payment.amount,
        &payment.currency,
        payment.payment_method.as_deref(),
    )
}

/// Payment orchestrator
pub struct PaymentOrchestrator<C: CacheService> {
    payments: Arc<dyn PaymentRepository>,
    refunds: Arc<dyn RefundRepository>,
    idempotency: Arc<dyn IdempotencyRepository>,
    cache: Arc<C>,
    gateways: Arc<GatewayRegistry>,
    bookings: Arc<dyn BookingLifecycle>,
    clock: Arc<dyn Clock>,
    config: PaymentsConfig,
}

impl<C: CacheService> PaymentOrchestrator<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        refunds: Arc<dyn RefundRepository>,
        idempotency: Arc<dyn IdempotencyRepository>,
        cache: Arc<C>,
        gateways: Arc<GatewayRegistry>,
        bookings: Arc<dyn BookingLifecycle>,
        clock: Arc<dyn Clock>,
        config: PaymentsConfig,
    ) -> Self {
        Self {
            payments,
            refunds,
            idempotency,
            cache,
            gateways,
            bookings,
            clock,
            config,
        }
    }

    /// Start a payment for an `initiated` booking
    ///
    /// Replays of the same key and payload return the stored response; a
    /// replay with a different payload is `IdempotencyConflict`. A key whose
    /// payment failed is treated as a retry of that payment. A booking has at
    /// most one pending, initiated or successful payment.
    #[instrument(skip(self, request), fields(booking_id = %request.booking_id, key = %request.idempotency_key))]
    pub async fn initiate(&self, request: InitiatePaymentRequest) -> AppResult<PaymentInitiation> {
        validate_initiation(&request)?;
        let fp = request_fingerprint(&request);

        if let Some(cached) = self.cached_response(&request.idempotency_key, &fp).await? {
            let current = self.get(cached.payment.id).await?;
            if current.status != PaymentStatus::Failed {
                debug!("Replaying stored response for key {}", request.idempotency_key);
                return Ok(cached);
            }

            info!(
                "Stored response for key {} belongs to failed payment {}, retrying",
                request.idempotency_key, current.id
            );
            self.forget_cached_response(&request.idempotency_key).await;
            return self.retry(current.id).await;
        }

        if let Some(existing) = self
            .payments
            .find_by_idempotency_key(&request.idempotency_key)
            .await?
        {
            if payment_fingerprint(&existing) != fp {
                return Err(AppError::IdempotencyConflict(request.idempotency_key));
            }
            if existing.status == PaymentStatus::Failed {
                info!("Key {} belongs to failed payment {}, retrying", request.idempotency_key, existing.id);
                return self.retry(existing.id).await;
            }
            return Ok(PaymentInitiation {
                payment: existing,
                payment_url: None,
            });
        }

        let booking = self.bookings.get_booking(request.booking_id).await?;
        if booking.status != BookingStatus::Initiated {
            return Err(AppError::InvalidTransition {
                status: booking.status.to_string(),
                action: "pay for".to_string(),
            });
        }
        if booking.user_id != request.user_id {
            return Err(AppError::Validation(format!(
                "booking {} does not belong to user {}",
                booking.id, request.user_id
            )));
        }
        if round_amount(request.amount) != booking.total_amount {
            return Err(AppError::Validation(format!(
                "amount {} does not match booking total {}",
                request.amount, booking.total_amount
            )));
        }

        self.ensure_no_active_payment(booking.id).await?;

        let gateway = self
            .gateways
            .select(request.gateway.as_deref(), &request.currency)?;

        let payment = Payment::new(
            booking.id,
            request.user_id,
            booking.total_amount,
            request.currency.to_uppercase(),
            gateway.name().to_string(),
            request.idempotency_key.clone(),
            request.payment_method.clone(),
            self.config.payment_expiry_minutes,
        );
        let payment = match self.payments.create(&payment).await {
            Ok(payment) => payment,
            Err(AppError::AlreadyExists(_)) => {
                return Err(AppError::Conflict(format!(
                    "a request with key {} is already in progress",
                    request.idempotency_key
                )))
            }
            Err(e) => return Err(e),
        };

        info!(
            "Created payment {} for booking {} via {}",
            payment.id, booking.id, payment.gateway
        );

        let initiation = self.attempt_initiation(&payment, gateway.as_ref(), 1).await?;
        self.store_response(&initiation, fp).await;
        Ok(initiation)
    }

    /// Check the gateway and apply its verdict
    ///
    /// A successful payment confirms the booking; replaying a confirmation of
    /// an already successful payment is a no-op.
    #[instrument(skip(self))]
    pub async fn confirm(&self, payment_id: Uuid, gateway_payment_id: &str) -> AppResult<Payment> {
        let payment = self.get(payment_id).await?;
        if payment.gateway_payment_id.as_deref() != Some(gateway_payment_id) {
            return Err(AppError::Validation(format!(
                "gateway payment id {} does not belong to payment {}",
                gateway_payment_id, payment_id
            )));
        }

        match payment.status {
            PaymentStatus::Success => {
                self.confirm_booking_for(&payment).await?;
                return Ok(payment);
            }
            PaymentStatus::Initiated => {}
            other => {
                return Err(AppError::PolicyViolation(format!(
                    "payment {} is {} and cannot be confirmed",
                    payment_id, other
                )))
            }
        }

        let gateway = self.gateways.get(&payment.gateway)?;
        let report = self
            .call_gateway(gateway.confirm_payment(gateway_payment_id))
            .await?;

        let status = StatusTable::for_gateway(gateway.name()).payment_status(&report.native_status);
        let (updated, _) = self
            .apply_payment_status(&payment, status, report.payment_method, report.failure_reason)
            .await?;

        if updated.status == PaymentStatus::Success {
            self.confirm_booking_for(&updated).await?;
        }
        Ok(updated)
    }

    /// New gateway attempt for a failed payment
    #[instrument(skip(self))]
    pub async fn retry(&self, payment_id: Uuid) -> AppResult<PaymentInitiation> {
        let payment = self.get(payment_id).await?;
        if payment.status != PaymentStatus::Failed {
            return Err(AppError::PolicyViolation(format!(
                "payment {} is {}; only failed payments can be retried",
                payment_id, payment.status
            )));
        }

        let attempts = self.payments.list_attempts(payment_id).await?.len() as i32;
        if attempts >= self.config.max_attempts {
            warn!("Payment {} exhausted {} attempts", payment_id, attempts);
            return Err(AppError::RetryLimitExceeded {
                max: self.config.max_attempts,
            });
        }

        let booking = self.bookings.get_booking(payment.booking_id).await?;
        if booking.status != BookingStatus::Initiated {
            return Err(AppError::InvalidTransition {
                status: booking.status.to_string(),
                action: "pay for".to_string(),
            });
        }
        self.ensure_no_active_payment(booking.id).await?;

        // Claim the payment so concurrent retries cannot both reach the gateway
        let claimed = self
            .payments
            .update_status(
                payment_id,
                &[PaymentStatus::Failed],
                &PaymentUpdate::status(PaymentStatus::Pending),
            )
            .await?
            .ok_or_else(|| AppError::Conflict(format!("payment {} is already being retried", payment_id)))?;

        let gateway = self.gateways.get(&claimed.gateway)?;
        let initiation = self
            .attempt_initiation(&claimed, gateway.as_ref(), attempts + 1)
            .await?;

        self.store_response(&initiation, payment_fingerprint(&claimed))
            .await;
        Ok(initiation)
    }

    /// Refund part or all of a successful payment
    ///
    /// Replaying a key returns the refund created for it.
    #[instrument(skip(self, request), fields(key = %request.idempotency_key))]
    pub async fn refund(&self, payment_id: Uuid, request: RefundRequest) -> AppResult<Refund> {
        if request.idempotency_key.trim().is_empty() {
            return Err(AppError::MissingField("idempotency_key".to_string()));
        }

        if let Some(existing) = self
            .refunds
            .find_by_idempotency_key(&request.idempotency_key)
            .await?
        {
            if existing.payment_id != payment_id {
                return Err(AppError::IdempotencyConflict(request.idempotency_key));
            }
            return Ok(existing);
        }

        let payment = self.get(payment_id).await?;
        if payment.status != PaymentStatus::Success {
            return Err(AppError::PolicyViolation(format!(
                "payment {} is {}; only successful payments can be refunded",
                payment_id, payment.status
            )));
        }

        let committed = self.refunds.committed_amount(payment_id).await?;
        let remaining = payment.amount - committed;
        let amount = request.amount.map(round_amount).unwrap_or(remaining);

        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(if request.amount.is_some() {
                "refund amount must be positive".to_string()
            } else {
                format!("payment {} is already fully refunded", payment_id)
            }));
        }
        if amount > remaining {
            return Err(AppError::Validation(format!(
                "refund {} exceeds refundable amount {}",
                amount, remaining
            )));
        }

        let gateway_payment_id = payment.gateway_payment_id.clone().ok_or_else(|| {
            AppError::PolicyViolation(format!("payment {} has no gateway reference", payment_id))
        })?;

        let refund = Refund::new(
            payment_id,
            amount,
            payment.currency.clone(),
            request.reason,
            request.idempotency_key.clone(),
        );
        // The remaining amount is re-checked under the payment's row lock
        let refund = match self.refunds.create_within(&refund, payment.amount).await {
            Ok(refund) => refund,
            Err(AppError::AlreadyExists(_)) => {
                return self
                    .refunds
                    .find_by_idempotency_key(&request.idempotency_key)
                    .await?
                    .ok_or_else(|| AppError::Conflict(request.idempotency_key.clone()))
            }
            Err(e) => return Err(e),
        };

        let gateway = self.gateways.get(&payment.gateway)?;
        let outcome = self
            .call_gateway(gateway.refund_payment(&gateway_payment_id, amount))
            .await;

        match outcome {
            Ok(gateway_refund) => {
                let status = StatusTable::for_gateway(gateway.name())
                    .refund_status(&gateway_refund.native_status)
                    .unwrap_or(PaymentStatus::Pending);

                let updated = self
                    .refunds
                    .update_status(
                        refund.id,
                        &[PaymentStatus::Pending],
                        status,
                        Some(&gateway_refund.gateway_refund_id),
                    )
                    .await?
                    .unwrap_or(refund);

                if updated.status == PaymentStatus::Success {
                    self.settle_if_fully_refunded(&payment).await?;
                }

                info!(
                    "Refund {} of {} for payment {} is {}",
                    updated.id, amount, payment_id, updated.status
                );
                Ok(updated)
            }
            Err(e) => {
                error!("Refund {} failed at gateway: {}", refund.id, e);
                self.refunds
                    .update_status(refund.id, &[PaymentStatus::Pending], PaymentStatus::Failed, None)
                    .await?;
                Err(e)
            }
        }
    }

    /// Authenticate and apply a gateway callback
    #[instrument(skip(self, payload, signature))]
    pub async fn handle_webhook(
        &self,
        gateway_name: &str,
        payload: &[u8],
        signature: &str,
    ) -> AppResult<WebhookOutcome> {
        let gateway = self.gateways.get(gateway_name)?;
        let event = gateway.verify_webhook(payload, signature).map_err(|e| {
            warn!("Rejected {} webhook: {}", gateway_name, e);
            e
        })?;

        debug!("Webhook {} for {:?}", event.event_id, event.subject);
        let table = StatusTable::for_gateway(gateway.name());

        match event.subject {
            WebhookSubject::Payment => self.apply_payment_event(gateway.as_ref(), table, event).await,
            WebhookSubject::Refund => self.apply_refund_event(table, event).await,
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, payment_id: Uuid) -> AppResult<Payment> {
        self.payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::PaymentNotFound(payment_id.to_string()))
    }

    /// Gateway attempts of a payment, oldest first
    #[instrument(skip(self))]
    pub async fn attempts(&self, payment_id: Uuid) -> AppResult<Vec<PaymentAttempt>> {
        self.get(payment_id).await?;
        self.payments.list_attempts(payment_id).await
    }

    /// Purge expired idempotency records and fail abandoned payments
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> AppResult<SweepReport> {
        let now = self.clock.now();
        let purged = self.idempotency.purge_expired(now).await?;

        let stale = self.payments.find_expired_open(now, EXPIRED_SWEEP_BATCH).await?;
        let mut expired = 0;
        for payment in stale {
            let update = PaymentUpdate::status(PaymentStatus::Failed).failure("payment expired");
            if self
                .payments
                .update_status(payment.id, &PaymentStatus::OPEN, &update)
                .await?
                .is_some()
            {
                expired += 1;
            }
        }

        if purged > 0 || expired > 0 {
            info!(
                "Sweep purged {} idempotency records, expired {} payments",
                purged, expired
            );
        }

        Ok(SweepReport {
            purged_idempotency_records: purged,
            expired_payments: expired,
        })
    }

    /// One gateway initiation call on a `pending` payment
    ///
    /// Timeouts and gateway errors mark the payment `failed` and surface.
    async fn attempt_initiation(
        &self,
        payment: &Payment,
        gateway: &dyn PaymentGateway,
        attempt_number: i32,
    ) -> AppResult<PaymentInitiation> {
        let order_ref = payment.id.to_string();
        let outcome = self
            .call_gateway(gateway.initiate_payment(payment.amount, &payment.currency, &order_ref))
            .await;

        match outcome {
            Ok(initiation) => {
                let attempt =
                    PaymentAttempt::new(payment.id, attempt_number, gateway.name(), PaymentStatus::Initiated)
                        .with_response(initiation.raw.clone());
                self.payments.record_attempt(&attempt).await?;

                let update = PaymentUpdate::status(PaymentStatus::Initiated).gateway_ids(
                    initiation.gateway_payment_id.clone(),
                    initiation.gateway_order_id.clone(),
                );
                let updated = self
                    .payments
                    .update_status(payment.id, &[PaymentStatus::Pending], &update)
                    .await?
                    .ok_or_else(|| {
                        AppError::Conflict(format!("payment {} changed during initiation", payment.id))
                    })?;

                info!(
                    "Payment {} initiated at {} as {} (attempt {})",
                    payment.id,
                    gateway.name(),
                    initiation.gateway_payment_id,
                    attempt_number
                );

                Ok(PaymentInitiation {
                    payment: updated,
                    payment_url: initiation.redirect_url,
                })
            }
            Err(e) => {
                error!(
                    "Payment {} attempt {} failed at {}: {}",
                    payment.id,
                    attempt_number,
                    gateway.name(),
                    e
                );

                let attempt =
                    PaymentAttempt::new(payment.id, attempt_number, gateway.name(), PaymentStatus::Failed)
                        .with_error(e.to_string());
                self.payments.record_attempt(&attempt).await?;

                let update = PaymentUpdate::status(PaymentStatus::Failed).failure(e.to_string());
                self.payments
                    .update_status(payment.id, &[PaymentStatus::Pending], &update)
                    .await?;

                Err(e)
            }
        }
    }

    /// Reject a second live payment for a booking
    async fn ensure_no_active_payment(&self, booking_id: Uuid) -> AppResult<()> {
        match self.payments.find_active_for_booking(booking_id).await? {
            Some(active) => {
                warn!(
                    "Booking {} already has {} payment {}",
                    booking_id, active.status, active.id
                );
                Err(AppError::Conflict(format!(
                    "booking {} already has {} payment {}",
                    booking_id, active.status, active.id
                )))
            }
            None => Ok(()),
        }
    }

    /// Bound a gateway call by the configured timeout
    async fn call_gateway<T, F>(&self, call: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let secs = self.config.gateway_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::GatewayTimeout(secs)),
        }
    }

    /// Apply a translated gateway status to a payment
    ///
    /// Terminal payments only move from `success` to `refunded`. Returns the
    /// stored payment and whether anything changed.
    async fn apply_payment_status(
        &self,
        payment: &Payment,
        status: Option<PaymentStatus>,
        payment_method: Option<String>,
        failure_reason: Option<String>,
    ) -> AppResult<(Payment, bool)> {
        let Some(status) = status else {
            warn!("Untranslatable gateway status for payment {}", payment.id);
            return Ok((payment.clone(), false));
        };

        let allowed = !payment.status.is_terminal()
            || (payment.status == PaymentStatus::Success && status == PaymentStatus::Refunded);
        if status == payment.status || !allowed {
            debug!(
                "Payment {} stays {} (gateway reported {})",
                payment.id, payment.status, status
            );
            return Ok((payment.clone(), false));
        }

        let mut update = PaymentUpdate::status(status).method(payment_method);
        if status == PaymentStatus::Failed {
            update = update.failure(failure_reason.unwrap_or_else(|| "declined by gateway".to_string()));
        }

        match self
            .payments
            .update_status(payment.id, &[payment.status], &update)
            .await?
        {
            Some(updated) => {
                info!("Payment {}: {} -> {}", payment.id, payment.status, updated.status);
                Ok((updated, true))
            }
            None => {
                debug!("Payment {} changed concurrently", payment.id);
                Ok((self.get(payment.id).await?, false))
            }
        }
    }

    /// Make sure the booking of a successful payment is confirmed
    async fn confirm_booking_for(&self, payment: &Payment) -> AppResult<()> {
        let booking = self.bookings.get_booking(payment.booking_id).await?;
        if booking.status.is_confirmed_equivalent() && booking.payment_id == Some(payment.id) {
            return Ok(());
        }
        self.bookings
            .confirm_booking(payment.booking_id, payment.id)
            .await?;
        Ok(())
    }

    async fn apply_payment_event(
        &self,
        gateway: &dyn PaymentGateway,
        table: StatusTable,
        event: WebhookEvent,
    ) -> AppResult<WebhookOutcome> {
        let Some(payment) = self
            .payments
            .find_by_gateway_payment_id(gateway.name(), &event.gateway_payment_id)
            .await?
        else {
            warn!(
                "Webhook {} references unknown payment {}",
                event.event_id, event.gateway_payment_id
            );
            return Ok(WebhookOutcome::UnknownReference);
        };

        let status = table.payment_status(&event.native_status);
        let (updated, changed) = self
            .apply_payment_status(&payment, status, event.payment_method, event.failure_reason)
            .await?;

        if updated.status == PaymentStatus::Success {
            // The gateway has been paid either way; a booking that can no longer
            // be confirmed is left for a refund
            if let Err(e) = self.confirm_booking_for(&updated).await {
                error!(
                    "Payment {} succeeded but booking {} was not confirmed: {}",
                    updated.id, updated.booking_id, e
                );
            }
        }

        Ok(if changed {
            WebhookOutcome::Applied
        } else {
            WebhookOutcome::Unchanged
        })
    }

    async fn apply_refund_event(
        &self,
        table: StatusTable,
        event: WebhookEvent,
    ) -> AppResult<WebhookOutcome> {
        let gateway_refund_id = event.gateway_refund_id.as_deref().ok_or_else(|| {
            AppError::Validation("refund webhook without refund id".to_string())
        })?;

        let Some(refund) = self.refunds.find_by_gateway_refund_id(gateway_refund_id).await? else {
            warn!(
                "Webhook {} references unknown refund {}",
                event.event_id, gateway_refund_id
            );
            return Ok(WebhookOutcome::UnknownReference);
        };

        let Some(status) = table.refund_status(&event.native_status) else {
            warn!("Untranslatable refund status {} for {}", event.native_status, refund.id);
            return Ok(WebhookOutcome::Unchanged);
        };

        let settled = matches!(refund.status, PaymentStatus::Success | PaymentStatus::Failed);
        if status == refund.status || settled {
            return Ok(WebhookOutcome::Unchanged);
        }

        let updated = self
            .refunds
            .update_status(refund.id, &[refund.status], status, None)
            .await?;
        let Some(updated) = updated else {
            return Ok(WebhookOutcome::Unchanged);
        };

        info!("Refund {}: {} -> {}", refund.id, refund.status, updated.status);
        if updated.status == PaymentStatus::Success {
            let payment = self.get(updated.payment_id).await?;
            self.settle_if_fully_refunded(&payment).await?;
        }

        Ok(WebhookOutcome::Applied)
    }

    /// Move a payment to `refunded` once refunds cover its amount
    async fn settle_if_fully_refunded(&self, payment: &Payment) -> AppResult<()> {
        let committed = self.refunds.committed_amount(payment.id).await?;
        if committed < payment.amount {
            return Ok(());
        }

        let update = PaymentUpdate::status(PaymentStatus::Refunded);
        if self
            .payments
            .update_status(payment.id, &[PaymentStatus::Success], &update)
            .await?
            .is_some()
        {
            info!("Payment {} fully refunded", payment.id);
        }
        Ok(())
    }

    /// Stored response for `key`, checking Redis before PostgreSQL
    async fn cached_response(&self, key: &str, fp: &str) -> AppResult<Option<PaymentInitiation>> {
        let cache_key = idempotency_cache_key(key);

        let cached = match self.cache.get::<IdempotencyRecord>(&cache_key).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Cache error for idempotency key {}: {}", key, e);
                None
            }
        };

        let record = match cached {
            Some(record) => record,
            None => match self.idempotency.find(key).await? {
                Some(record) => {
                    self.cache_record(&record).await;
                    record
                }
                None => return Ok(None),
            },
        };

        if record.request_fingerprint != fp {
            return Err(AppError::IdempotencyConflict(key.to_string()));
        }

        Ok(Some(serde_json::from_str(&record.response_body)?))
    }

    /// Persist a successful initiation under its idempotency key
    async fn store_response(&self, initiation: &PaymentInitiation, fp: String) {
        let body = match serde_json::to_string(initiation) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize initiation of {}: {}", initiation.payment.id, e);
                return;
            }
        };

        let record = IdempotencyRecord::new(
            initiation.payment.idempotency_key.clone(),
            initiation.payment.id,
            fp,
            body,
            self.config.idempotency_ttl_secs,
        );

        // The payment row still guards the key if this write is lost
        if let Err(e) = self.idempotency.save(&record).await {
            warn!(
                "Failed to store idempotency record {}: {}",
                record.idempotency_key, e
            );
        }
        self.cache_record(&record).await;
    }

    /// Drop the Redis copy of a stored response; the PostgreSQL record is
    /// overwritten once the retry succeeds
    async fn forget_cached_response(&self, key: &str) {
        if let Err(e) = self.cache.delete(&idempotency_cache_key(key)).await {
            warn!("Failed to evict idempotency key {}: {}", key, e);
        }
    }

    async fn cache_record(&self, record: &IdempotencyRecord) {
        let remaining = record.expires_at - self.clock.now();
        if remaining <= ChronoDuration::zero() {
            return;
        }

        let ttl = remaining.num_seconds().max(1) as u64;
        let key = idempotency_cache_key(&record.idempotency_key);
        if let Err(e) = self.cache.set(&key, record, ttl).await {
            warn!("Failed to cache idempotency record {}: {}", record.idempotency_key, e);
        }
    }
}

fn validate_initiation(request: &InitiatePaymentRequest) -> AppResult<()> {
    if request.idempotency_key.trim().is_empty() {
        return Err(AppError::MissingField("idempotency_key".to_string()));
    }
    if request.amount <= Decimal::ZERO {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }
    let currency_ok =
        request.currency.len() == 3 && request.currency.chars().all(|c| c.is_ascii_alphabetic());
    if !currency_ok {
        return Err(AppError::Validation(format!(
            "invalid currency code: {}",
            request.currency
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> InitiatePaymentRequest {
        InitiatePaymentRequest {
            booking_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: dec!(605),
            currency: "INR".to_string(),
            idempotency_key: "key-1".to_string(),
            gateway: None,
            payment_method: None,
        }
    }

    #[test]
    fn test_fingerprint_ignores_representation() {
        let a = request();
        let mut b = a.clone();
        b.amount = dec!(605.00);
        b.currency = "inr".to_string();
        b.gateway = Some("razorpay".to_string());
        b.idempotency_key = "another".to_string();

        assert_eq!(request_fingerprint(&a), request_fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_detects_payload_change() {
        let a = request();
        let mut b = a.clone();
        b.amount = dec!(600);
        assert_ne!(request_fingerprint(&a), request_fingerprint(&b));
    }

    #[test]
    fn test_payment_and_request_fingerprints_agree() {
        let req = request();
        let payment = Payment::new(
            req.booking_id,
            req.user_id,
            req.amount,
            req.currency.clone(),
            "razorpay".to_string(),
            req.idempotency_key.clone(),
            None,
            30,
        );
        assert_eq!(payment_fingerprint(&payment), request_fingerprint(&req));
    }

    #[test]
    fn test_validate_initiation() {
        assert!(validate_initiation(&request()).is_ok());

        let mut bad = request();
        bad.idempotency_key = "  ".to_string();
        assert!(matches!(validate_initiation(&bad), Err(AppError::MissingField(_))));

        let mut bad = request();
        bad.amount = Decimal::ZERO;
        assert!(matches!(validate_initiation(&bad), Err(AppError::Validation(_))));

        let mut bad = request();
        bad.currency = "RUPEE".to_string();
        assert!(matches!(validate_initiation(&bad), Err(AppError::Validation(_))));
    }
}
