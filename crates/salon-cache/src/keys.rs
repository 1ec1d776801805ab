//! Cache key constants and builders
//!
//! # Key Patterns
//!
//! - `branch_config:{branch_id}` - Resolved booking policy of a branch
//! - `idempotency:{key}` - Cached payment initiation response
//!
//! # Example
//!
//! ```
//! use salon_cache::keys;
//!
//! let key = keys::idempotency_key("order-42");
//! assert_eq!(key, "idempotency:order-42");
//! ```

use std::fmt::Display;

/// Prefix for cached branch configurations
///
/// Format: `branch_config:{branch_id}`
pub const BRANCH_CONFIG_PREFIX: &str = "branch_config";

/// Prefix for idempotent payment responses
///
/// Format: `idempotency:{key}`
pub const IDEMPOTENCY_PREFIX: &str = "idempotency";

/// Default TTL for branch configurations (5 minutes)
pub const BRANCH_CONFIG_TTL_SECS: u64 = 300;

/// Build a cache key for a branch configuration
///
/// # Example
///
/// ```
/// use salon_cache::keys::branch_config_key;
///
/// let key = branch_config_key("b-1");
/// assert_eq!(key, "branch_config:b-1");
/// ```
pub fn branch_config_key(branch_id: impl Display) -> String {
    format!("{}:{}", BRANCH_CONFIG_PREFIX, branch_id)
}

/// Build a cache key for an idempotency token
pub fn idempotency_key(key: &str) -> String {
    format!("{}:{}", IDEMPOTENCY_PREFIX, key)
}

/// Build a pattern for matching all keys with a given prefix
///
/// # Warning
///
/// Use with caution in production. Scanning keys can be expensive on large datasets.
pub fn pattern(prefix: &str) -> String {
    format!("{}:*", prefix)
}
