//! Salon Booking Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the booking orchestration engine. It includes:
//!
//! - Domain models (Booking, BranchConfig, Payment, Refund, etc.)
//! - Repository traits and external collaborator contracts
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::{AppError, ErrorKind};

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
