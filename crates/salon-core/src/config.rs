//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    pub collaborators: CollaboratorsConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_timeout() -> u64 {
    30
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Default TTL for cached items in seconds
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    300
}

/// System-wide booking defaults
///
/// Branches without a stored configuration get these values the first time
/// they are referenced.
#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    /// Minutes padded around each reservation when checking conflicts
    #[serde(default = "default_buffer_minutes")]
    pub default_buffer_minutes: i32,

    /// Hours before the first appointment after which cancellation is refused
    #[serde(default = "default_cancellation_cutoff")]
    pub default_cancellation_cutoff_hours: i32,

    /// Hours before the first appointment after which rescheduling is refused
    #[serde(default = "default_reschedule_window")]
    pub default_reschedule_window_hours: i32,

    /// How far ahead a booking may be placed
    #[serde(default = "default_max_advance_days")]
    pub default_max_advance_booking_days: i32,

    /// Flat fee added to each booking
    #[serde(default)]
    pub default_booking_fee: f64,

    /// Tax percentage applied to the subtotal
    #[serde(default)]
    pub default_tax_percentage: f64,

    /// Step between candidate slots
    #[serde(default = "default_slot_interval")]
    pub slot_interval_minutes: i64,
}

fn default_buffer_minutes() -> i32 {
    15
}

fn default_cancellation_cutoff() -> i32 {
    24
}

fn default_reschedule_window() -> i32 {
    12
}

fn default_max_advance_days() -> i32 {
    90
}

fn default_slot_interval() -> i64 {
    30
}

impl BookingConfig {
    /// Default booking fee as a decimal amount
    pub fn booking_fee(&self) -> Decimal {
        Decimal::try_from(self.default_booking_fee)
            .unwrap_or(Decimal::ZERO)
            .round_dp(2)
    }

    /// Default tax percentage as a decimal
    pub fn tax_percentage(&self) -> Decimal {
        Decimal::try_from(self.default_tax_percentage)
            .unwrap_or(Decimal::ZERO)
            .round_dp(4)
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            default_buffer_minutes: 15,
            default_cancellation_cutoff_hours: 24,
            default_reschedule_window_hours: 12,
            default_max_advance_booking_days: 90,
            default_booking_fee: 0.0,
            default_tax_percentage: 0.0,
            slot_interval_minutes: 30,
        }
    }
}

/// Payment orchestration configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    /// Maximum gateway attempts per payment (initial attempt included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Upper bound for a single gateway call
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    /// How long cached idempotent responses are kept
    #[serde(default = "default_idempotency_ttl")]
    pub idempotency_ttl_secs: i64,

    /// Minutes an unconfirmed payment stays open before the sweep fails it
    #[serde(default = "default_payment_expiry")]
    pub payment_expiry_minutes: i64,

    /// Interval of the expiry sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Currency routed to the domestic gateway
    #[serde(default = "default_domestic_currency")]
    pub domestic_currency: String,

    /// Gateway preferred for the domestic currency
    #[serde(default = "default_domestic_gateway")]
    pub domestic_gateway: String,

    /// Gateway preferred for every other currency
    #[serde(default = "default_international_gateway")]
    pub international_gateway: String,

    /// Configured gateways
    #[serde(default)]
    pub gateways: Vec<GatewayConfig>,
}

fn default_max_attempts() -> i32 {
    3
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_idempotency_ttl() -> i64 {
    86400 // 24 hours
}

fn default_payment_expiry() -> i64 {
    30
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_domestic_currency() -> String {
    "INR".to_string()
}

fn default_domestic_gateway() -> String {
    "razorpay".to_string()
}

fn default_international_gateway() -> String {
    "stripe".to_string()
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            gateway_timeout_secs: default_gateway_timeout(),
            idempotency_ttl_secs: default_idempotency_ttl(),
            payment_expiry_minutes: default_payment_expiry(),
            sweep_interval_secs: default_sweep_interval(),
            domestic_currency: default_domestic_currency(),
            domestic_gateway: default_domestic_gateway(),
            international_gateway: default_international_gateway(),
            gateways: Vec::new(),
        }
    }
}

/// Individual payment gateway configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Gateway name, also selects the status translation table
    pub name: String,

    /// REST endpoint of the gateway
    pub base_url: String,

    /// API credential sent as bearer token
    pub api_key: String,

    /// Shared secret for webhook HMAC signatures
    pub webhook_secret: String,
}

/// External collaborator endpoints
#[derive(Debug, Deserialize, Clone)]
pub struct CollaboratorsConfig {
    /// Identity service base URL
    pub identity_url: String,

    /// Catalog service base URL
    pub catalog_url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_collaborator_timeout")]
    pub timeout_ms: u64,
}

fn default_collaborator_timeout() -> u64 {
    5000
}

/// Notification dispatch configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    /// Bounded queue size between the lifecycle manager and the dispatcher
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Endpoint receiving booking events
    pub webhook_url: Option<String>,
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            webhook_url: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("server.timeout_secs", 30)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("redis.default_ttl_secs", 300)?
            .set_default("booking.default_buffer_minutes", 15)?
            .set_default("booking.default_cancellation_cutoff_hours", 24)?
            .set_default("booking.default_reschedule_window_hours", 12)?
            .set_default("booking.default_max_advance_booking_days", 90)?
            .set_default("booking.default_booking_fee", 0.0)?
            .set_default("booking.default_tax_percentage", 0.0)?
            .set_default("booking.slot_interval_minutes", 30)?
            .set_default("payments.max_attempts", 3)?
            .set_default("payments.gateway_timeout_secs", 30)?
            .set_default("payments.idempotency_ttl_secs", 86400)?
            .set_default("payments.payment_expiry_minutes", 30)?
            .set_default("payments.sweep_interval_secs", 300)?
            .set_default("payments.domestic_currency", "INR")?
            .set_default("payments.domestic_gateway", "razorpay")?
            .set_default("payments.international_gateway", "stripe")?
            .set_default("collaborators.timeout_ms", 5000)?
            .set_default("notifications.queue_capacity", 1024)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with SALON_ prefix
            .add_source(
                Environment::with_prefix("SALON")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("SALON").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
