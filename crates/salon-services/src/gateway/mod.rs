//! Payment gateway registry
//!
//! Gateways are looked up by name. When the caller does not name one, the
//! currency decides: the domestic currency goes to the domestic gateway,
//! anything else to the international gateway, and if the preferred gateway is
//! not configured any configured gateway is used.

pub mod http;
pub mod status;
pub mod webhook;

use salon_core::{config::PaymentsConfig, traits::PaymentGateway, AppError, AppResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use http::HttpGateway;
pub use status::StatusTable;

/// Configured gateways keyed by lowercase name
pub struct GatewayRegistry {
    gateways: BTreeMap<String, Arc<dyn PaymentGateway>>,
    domestic_currency: String,
    domestic_gateway: String,
    international_gateway: String,
}

impl GatewayRegistry {
    /// Empty registry using the routing preferences of `config`
    pub fn new(config: &PaymentsConfig) -> Self {
        Self {
            gateways: BTreeMap::new(),
            domestic_currency: config.domestic_currency.to_uppercase(),
            domestic_gateway: config.domestic_gateway.to_lowercase(),
            international_gateway: config.international_gateway.to_lowercase(),
        }
    }

    /// Registry with an HTTP adapter per configured gateway
    pub fn from_config(config: &PaymentsConfig) -> AppResult<Self> {
        let mut registry = Self::new(config);
        let timeout = Duration::from_secs(config.gateway_timeout_secs);

        for gateway in &config.gateways {
            registry.register(Arc::new(HttpGateway::new(gateway, timeout)?));
        }

        info!("Payment gateways configured: {:?}", registry.names());
        Ok(registry)
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.name().to_lowercase(), gateway);
    }

    pub fn names(&self) -> Vec<&str> {
        self.gateways.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> AppResult<Arc<dyn PaymentGateway>> {
        self.gateways
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| AppError::GatewayNotConfigured(name.to_string()))
    }

    /// Pick the gateway for a payment
    pub fn select(&self, explicit: Option<&str>, currency: &str) -> AppResult<Arc<dyn PaymentGateway>> {
        if let Some(name) = explicit {
            return self.get(name);
        }

        let preferred = if currency.eq_ignore_ascii_case(&self.domestic_currency) {
            &self.domestic_gateway
        } else {
            &self.international_gateway
        };

        if let Some(gateway) = self.gateways.get(preferred) {
            return Ok(gateway.clone());
        }

        debug!("Preferred gateway {} not configured, falling back", preferred);
        self.gateways
            .values()
            .next()
            .cloned()
            .ok_or_else(|| AppError::GatewayNotConfigured("no gateway configured".to_string()))
    }
}
