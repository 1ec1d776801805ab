//! Repository implementations
//!
//! This module contains concrete implementations of the repository traits
//! defined in salon-core, using sqlx for PostgreSQL access.

pub mod booking_repo;
pub mod branch_config_repo;
pub mod history_repo;
pub mod idempotency_repo;
pub mod payment_repo;
pub mod refund_repo;

pub use booking_repo::PgBookingRepository;
pub use branch_config_repo::PgBranchConfigRepository;
pub use history_repo::PgHistoryRepository;
pub use idempotency_repo::PgIdempotencyRepository;
pub use payment_repo::PgPaymentRepository;
pub use refund_repo::PgRefundRepository;

/// SQLSTATE codes of unique and exclusion constraint violations
const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";

/// Whether a write was rejected by a unique or exclusion constraint
pub(crate) fn is_constraint_conflict(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == UNIQUE_VIOLATION || code == EXCLUSION_VIOLATION)
        .unwrap_or(false)
}

/// Name of the constraint or unique index a conflicting write hit
pub(crate) fn violated_constraint(e: &sqlx::Error) -> Option<&str> {
    if !is_constraint_conflict(e) {
        return None;
    }
    e.as_database_error().and_then(|db| db.constraint())
}
