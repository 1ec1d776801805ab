//! Branch policy resolver
//!
//! Resolves the booking policy of a branch through a Redis read-through cache.
//! Branches without a stored configuration get the system defaults, which are
//! persisted on first use. Cache failures are logged and treated as misses.

use salon_cache::keys::{branch_config_key, BRANCH_CONFIG_TTL_SECS};
use salon_core::{
    config::BookingConfig,
    models::{BranchConfig, BranchConfigUpdate},
    traits::{BranchConfigRepository, CacheService},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Per-branch policy lookup with lazy default persistence
pub struct BranchPolicyResolver<C: CacheService> {
    repo: Arc<dyn BranchConfigRepository>,
    cache: Arc<C>,
    defaults: BookingConfig,
}

impl<C: CacheService> BranchPolicyResolver<C> {
    pub fn new(repo: Arc<dyn BranchConfigRepository>, cache: Arc<C>, defaults: BookingConfig) -> Self {
        Self {
            repo,
            cache,
            defaults,
        }
    }

    async fn get_from_cache(&self, branch_id: Uuid) -> Option<BranchConfig> {
        match self.cache.get::<BranchConfig>(&branch_config_key(branch_id)).await {
            Ok(config) => config,
            Err(e) => {
                warn!("Cache error for branch {}: {}", branch_id, e);
                None
            }
        }
    }

    async fn store_in_cache(&self, config: &BranchConfig) {
        let key = branch_config_key(config.branch_id);
        if let Err(e) = self.cache.set(&key, config, BRANCH_CONFIG_TTL_SECS).await {
            warn!("Failed to cache config for branch {}: {}", config.branch_id, e);
        }
    }

    /// Effective policy of a branch
    #[instrument(skip(self))]
    pub async fn resolve(&self, branch_id: Uuid) -> AppResult<BranchConfig> {
        if let Some(config) = self.get_from_cache(branch_id).await {
            return Ok(config);
        }

        let config = match self.repo.find(branch_id).await? {
            Some(config) => config,
            None => {
                info!("Branch {} has no configuration, persisting defaults", branch_id);
                let defaults = BranchConfig::from_defaults(branch_id, &self.defaults);
                self.repo.insert_if_absent(&defaults).await?
            }
        };

        self.store_in_cache(&config).await;
        Ok(config)
    }

    /// Apply an explicit configuration update
    #[instrument(skip(self, update))]
    pub async fn update(&self, branch_id: Uuid, update: &BranchConfigUpdate) -> AppResult<BranchConfig> {
        update.validate()?;
        update.validate_amounts().map_err(AppError::Validation)?;

        let mut config = self.resolve(branch_id).await?;
        config.apply(update);

        let saved = self.repo.update(&config).await?;
        debug!("Branch {} configuration updated", branch_id);

        self.store_in_cache(&saved).await;

        Ok(saved)
    }
}
