//! # Pipeline Graph Configuration
//!
//! Typed configuration for the analysis core, layered from built-in defaults, an optional
//! TOML file and `PIPELINE_GRAPH__SECTION__KEY` environment overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pipeline_graph::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().cache.wait_timeout();
//! let version = manager.config().status.api_version;
//! # let _ = (timeout, version);
//! # Ok(())
//! # }
//! ```
//!
//! ## File format
//!
//! ```toml
//! [status]
//! api_version = "v1"
//!
//! [tree]
//! collapse_same_name_wrappers = true
//! drop_skipped_children = true
//!
//! [cache]
//! enabled = true
//! wait_timeout_ms = 30000
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::system;
use crate::status::StatusApiVersion;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub status: StatusConfig,
    pub tree: TreeConfig,
    pub cache: CacheConfig,
}

impl GraphConfig {
    /// Check cross-field constraints the types cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        self.cache.validate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Status vocabulary served to legacy consumers
    pub api_version: StatusApiVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Collapse a wrapper whose only child is a same-named stage or branch
    pub collapse_same_name_wrappers: bool,
    /// Remove nodes recorded below stages that never ran
    pub drop_skipped_children: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            collapse_same_name_wrappers: true,
            drop_skipped_children: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Coalesce concurrent requests for the same run
    pub enabled: bool,
    /// How long a caller waits on a shared computation before giving up
    pub wait_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wait_timeout_ms: system::DEFAULT_CACHE_WAIT_TIMEOUT_MS,
        }
    }
}

impl CacheConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.wait_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.wait_timeout_ms",
                "0",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::default();
        assert_eq!(config.status.api_version, StatusApiVersion::V1);
        assert!(config.tree.collapse_same_name_wrappers);
        assert!(config.tree.drop_skipped_children);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.wait_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_wait_timeout_is_rejected() {
        let mut config = GraphConfig::default();
        config.cache.wait_timeout_ms = 0;
        let error = config.validate().unwrap_err();
        assert!(matches!(error, ConfigurationError::InvalidValue { .. }));
        assert!(error.to_string().contains("cache.wait_timeout_ms"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: GraphConfig =
            serde_json::from_str(r#"{"cache": {"wait_timeout_ms": 500}}"#).unwrap();
        assert_eq!(config.cache.wait_timeout_ms, 500);
        assert!(config.cache.enabled);
        assert_eq!(config.tree, TreeConfig::default());
    }
}
