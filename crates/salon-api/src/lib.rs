//! API layer for the salon booking engine
//!
//! HTTP handlers for bookings, availability, branch policy, payments and
//! gateway webhooks. Handlers are generic over the cache backend so the
//! server and tests can plug different ones in.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;
pub mod state;

pub use dto::{ApiResponse, PaginationParams};
pub use state::AppState;

use actix_web::web;
use salon_core::traits::CacheService;

/// Mount every route under `/api/v1`
pub fn configure<C: CacheService + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health_check))
            .configure(handlers::configure_bookings::<C>)
            .configure(handlers::configure_branches::<C>)
            .configure(handlers::configure_payments::<C>)
            .configure(handlers::configure_webhooks::<C>),
    );
}
