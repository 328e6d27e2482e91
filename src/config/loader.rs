//! Configuration Loader
//!
//! Environment-aware configuration loading built on the `config` crate. Layers, lowest
//! precedence first:
//!
//! 1. Built-in defaults ([`GraphConfig::default`])
//! 2. A TOML file, from `PIPELINE_GRAPH_CONFIG_PATH` or an explicit path
//! 3. `PIPELINE_GRAPH__SECTION__KEY` environment variables

use ::config as cfg;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::GraphConfig;
use crate::constants::env as env_keys;

#[derive(Debug)]
pub struct ConfigManager {
    config: GraphConfig,
    environment: String,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let path = env::var(env_keys::CONFIG_PATH).ok().map(PathBuf::from);
        Self::load_from_sources(path.as_deref(), true)
    }

    /// Load configuration from a specific TOML file, which must exist
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_sources(Some(path.as_ref()), true)
    }

    /// Load configuration from explicit layers
    ///
    /// Useful in tests that must not depend on the process environment.
    pub fn load_from_sources(
        file: Option<&Path>,
        environment_overrides: bool,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();

        let defaults = cfg::Config::try_from(&GraphConfig::default())
            .map_err(ConfigurationError::validation_error)?;
        let mut builder = cfg::Config::builder().add_source(defaults);

        if let Some(path) = file {
            if !path.is_file() {
                return Err(ConfigurationError::file_not_found(path.display().to_string()));
            }
            debug!(path = %path.display(), "Adding configuration file layer");
            builder = builder.add_source(
                cfg::File::from(path.to_path_buf())
                    .format(cfg::FileFormat::Toml)
                    .required(true),
            );
        }

        if environment_overrides {
            builder = builder.add_source(
                cfg::Environment::with_prefix(env_keys::CONFIG_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let layered = builder
            .build()
            .map_err(|e| Self::classify_error(file, e))?;
        let config: GraphConfig = layered
            .try_deserialize()
            .map_err(|e| Self::classify_error(file, e))?;

        config.validate()?;

        info!(
            environment = %environment,
            source = ?file.map(|p| p.display().to_string()),
            status_api_version = %config.status.api_version,
            cache_enabled = config.cache.enabled,
            wait_timeout_ms = config.cache.wait_timeout_ms,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source: file.map(Path::to_path_buf),
        }))
    }

    /// Wrap an already built configuration, validating it first
    pub fn from_config(config: GraphConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// File the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Current environment from `PIPELINE_GRAPH_ENV`, defaulting to `development`
    pub fn detect_environment() -> String {
        env::var(env_keys::ENVIRONMENT).unwrap_or_else(|_| "development".to_string())
    }

    fn classify_error(file: Option<&Path>, error: cfg::ConfigError) -> ConfigurationError {
        match (&error, file) {
            (cfg::ConfigError::FileParse { .. }, Some(path)) | (cfg::ConfigError::Foreign(_), Some(path)) => {
                ConfigurationError::parse_error(path.display().to_string(), &error)
            }
            (cfg::ConfigError::Type { key: Some(key), .. }, _) => {
                ConfigurationError::environment_override_error(key.clone(), &error)
            }
            _ => ConfigurationError::validation_error(&error),
        }
    }
}
