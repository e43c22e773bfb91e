//! Configuration error types
//!
//! This module provides the error types for configuration management.

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable not found: {key}{}", context.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
    EnvVarNotFound { key: String, context: Option<String> },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Validation failed: {message}")]
    ValidationFailed(String),

    #[error("Parsing error for {field} ({source}): {message}")]
    ParseError {
        message: String,
        source: String,
        field: String,
    },

    #[error("Required field missing: {0}")]
    RequiredFieldMissing(String),
}

impl ConfigError {
    pub fn env_var_not_found(key: impl Into<String>, context: Option<String>) -> Self {
        ConfigError::EnvVarNotFound {
            key: key.into(),
            context,
        }
    }

    pub fn parse_error(message: impl Into<String>, source: impl Into<String>, field: impl Into<String>) -> Self {
        ConfigError::ParseError {
            message: message.into(),
            source: source.into(),
            field: field.into(),
        }
    }

    pub fn validation_failed(
        message: impl Into<String>,
        _category: impl Into<String>,
        _hint: impl Into<String>,
        _fields: Vec<(String, String)>,
    ) -> Self {
        ConfigError::ValidationFailed(message.into())
    }

    pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
