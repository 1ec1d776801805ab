//! HTTP request handlers

pub mod booking;
pub mod branch;
pub mod health;
pub mod payment;
pub mod webhook;

pub use booking::configure as configure_bookings;
pub use branch::configure as configure_branches;
pub use health::health_check;
pub use payment::configure as configure_payments;
pub use webhook::configure as configure_webhooks;
