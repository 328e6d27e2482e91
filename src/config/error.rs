//! Configuration Error Types
//!
//! Error handling for configuration loading and validation, with messages naming the
//! offending file, key or field.

use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Explicitly requested configuration file does not exist
    #[error("Configuration file not found: {file_path}")]
    FileNotFound { file_path: String },

    /// File could not be read or parsed
    #[error("Parse Error for file {file_path}: {reason}")]
    ParseError { file_path: String, reason: String },

    /// A `PIPELINE_GRAPH__*` variable that does not fit the configuration shape
    #[error("Environment override error for key {key}: {reason}")]
    EnvironmentOverrideError { key: String, reason: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Layered configuration could not be assembled or deserialized
    #[error("Configuration validation failed: {error}")]
    ValidationError { error: String },
}

impl ConfigurationError {
    pub fn file_not_found<P: Into<String>>(file_path: P) -> Self {
        Self::FileNotFound {
            file_path: file_path.into(),
        }
    }

    pub fn parse_error<P: Into<String>, E: std::fmt::Display>(file_path: P, reason: E) -> Self {
        Self::ParseError {
            file_path: file_path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn environment_override_error<K: Into<String>, E: std::fmt::Display>(
        key: K,
        reason: E,
    ) -> Self {
        Self::EnvironmentOverrideError {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    /// Create a validation error
    pub fn validation_error<E: std::fmt::Display>(error: E) -> Self {
        Self::ValidationError {
            error: error.to_string(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;
