//! HTTP clients for the identity and catalog collaborators
//!
//! Both speak plain JSON over GET. A 404 maps to the matching NotFound error;
//! any other failure is a collaborator error.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, ClientBuilder, StatusCode};
use salon_core::{
    config::CollaboratorsConfig,
    models::{Branch, SalonService, Stylist, StylistSchedule, UserInfo},
    traits::{CatalogService, IdentityService},
    AppError, AppResult,
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// Minimal JSON-over-HTTP client shared by the collaborator adapters
struct JsonClient {
    http_client: Client,
    base_url: String,
    timeout_ms: u64,
}

impl JsonClient {
    fn new(base_url: &str, timeout_ms: u64) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
        })
    }

    /// GET `{base}{path}` and decode the body; `None` on 404
    async fn get<R: DeserializeOwned>(&self, path: &str) -> AppResult<Option<R>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                error!("Collaborator request timed out: {}", url);
                AppError::Collaborator(format!(
                    "Request to {} exceeded {}ms",
                    url, self.timeout_ms
                ))
            } else {
                error!("Collaborator request failed: {}", e);
                AppError::Collaborator(format!("Request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            error!("Collaborator HTTP error: status={} url={}", status, url);
            return Err(AppError::Collaborator(format!(
                "{} returned status {}",
                url, status
            )));
        }

        let body = response
            .json::<R>()
            .await
            .map_err(|e| AppError::Collaborator(format!("Invalid response from {}: {}", url, e)))?;

        Ok(Some(body))
    }
}

/// Identity service over HTTP
pub struct HttpIdentityClient {
    client: JsonClient,
}

impl HttpIdentityClient {
    pub fn new(config: &CollaboratorsConfig) -> AppResult<Self> {
        Ok(Self {
            client: JsonClient::new(&config.identity_url, config.timeout_ms)?,
        })
    }
}

#[async_trait]
impl IdentityService for HttpIdentityClient {
    #[instrument(skip(self))]
    async fn validate_user(&self, user_id: Uuid) -> AppResult<UserInfo> {
        self.client
            .get(&format!("/users/{}", user_id))
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }
}

/// Catalog service over HTTP
pub struct HttpCatalogClient {
    client: JsonClient,
}

impl HttpCatalogClient {
    pub fn new(config: &CollaboratorsConfig) -> AppResult<Self> {
        Ok(Self {
            client: JsonClient::new(&config.catalog_url, config.timeout_ms)?,
        })
    }
}

#[async_trait]
impl CatalogService for HttpCatalogClient {
    #[instrument(skip(self))]
    async fn get_branch(&self, branch_id: Uuid) -> AppResult<Branch> {
        self.client
            .get(&format!("/branches/{}", branch_id))
            .await?
            .ok_or_else(|| AppError::BranchNotFound(branch_id.to_string()))
    }

    #[instrument(skip(self))]
    async fn get_service(&self, service_id: Uuid) -> AppResult<SalonService> {
        self.client
            .get(&format!("/services/{}", service_id))
            .await?
            .ok_or_else(|| AppError::ServiceNotFound(service_id.to_string()))
    }

    #[instrument(skip(self))]
    async fn get_stylist(&self, stylist_id: Uuid) -> AppResult<Stylist> {
        self.client
            .get(&format!("/stylists/{}", stylist_id))
            .await?
            .ok_or_else(|| AppError::StylistNotFound(stylist_id.to_string()))
    }

    #[instrument(skip(self))]
    async fn get_stylist_schedule(
        &self,
        stylist_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<StylistSchedule> {
        // A stylist without a schedule entry for the day is off
        Ok(self
            .client
            .get(&format!(
                "/stylists/{}/schedule?date={}",
                stylist_id,
                date.format("%Y-%m-%d")
            ))
            .await?
            .unwrap_or_default())
    }
}
