//! Salon Booking Database Layer
//!
//! This crate provides PostgreSQL access and repository implementations
//! for the booking engine. It includes:
//!
//! - Connection pool management with sqlx
//! - Embedded schema migrations
//! - Repository implementations for bookings, history, branch policy,
//!   payments, refunds and idempotency records
//! - Per-stylist storage exclusivity for reservations

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use salon_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
