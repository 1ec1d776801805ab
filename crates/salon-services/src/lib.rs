//! Business logic services for the salon booking engine
//!
//! This crate holds everything between the HTTP layer and storage: slot
//! generation, pricing, branch policy resolution, the booking state machine
//! and the payment orchestration protocol, plus the HTTP adapters for the
//! external collaborators.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Storage and collaborators are injected as `Arc<dyn Trait>`
//! - The cache is a type parameter (`CacheService` is not object safe)
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//!
//! # Services
//!
//! - `AvailabilityService` - Bookable slots and conflict checks
//! - `BranchPolicyResolver` - Per-branch policy with lazy defaults
//! - `BookingManager` - Booking lifecycle state machine
//! - `PaymentOrchestrator` - Idempotent payments, webhooks, refunds
//! - `GatewayRegistry` - Payment gateway selection
//! - `NotificationQueue` - Bounded outbound notification queue

pub mod availability;
pub mod booking_manager;
pub mod branch_policy;
pub mod clients;
pub mod gateway;
pub mod notification;
pub mod payment_orchestrator;
pub mod pricing;

pub use availability::AvailabilityService;
pub use booking_manager::{
    BookingItemRequest, BookingManager, CreateBookingRequest, RescheduleRequest,
};
pub use branch_policy::BranchPolicyResolver;
pub use clients::{HttpCatalogClient, HttpIdentityClient};
pub use gateway::{GatewayRegistry, HttpGateway};
pub use notification::{spawn_worker, LogNotifier, NotificationQueue, WebhookNotifier};
pub use payment_orchestrator::{PaymentOrchestrator, RefundRequest, SweepReport, WebhookOutcome};

/// Business logic constants
pub mod constants {
    /// Step between candidate slots when none is configured
    pub const DEFAULT_SLOT_INTERVAL_MINUTES: i64 = 30;

    /// Money is kept in cents
    pub const MONEY_DECIMAL_PLACES: u32 = 2;

    /// Expired payments failed per sweep run
    pub const EXPIRED_SWEEP_BATCH: i64 = 500;
}
