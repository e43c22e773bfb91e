//! Environment configuration utilities
//!
//! Utilities for loading and validating environment variables with type
//! conversion and default value handling, used by [`super::EngineConfig`] and
//! the `workflow-engine-app` binary's bootstrap.

use std::env;
use std::str::FromStr;

use crate::config::{ConfigError, ConfigResult};

/// Environment variable loader with type conversion and validation
pub struct EnvLoader;

impl EnvLoader {
    /// Load a required environment variable
    pub fn load_required<T>(key: &str) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = env::var(key).map_err(|_| ConfigError::env_var_not_found(key, None))?;

        value
            .parse()
            .map_err(|e| ConfigError::parse_error(format!("{}: {}", key, e), "environment variable", key))
    }

    /// Load an optional environment variable with a default value
    pub fn load_with_default<T>(key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Clone,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::parse_error(format!("{}: {}", key, e), "environment variable", key)),
            Err(_) => Ok(default),
        }
    }

    /// Load an optional environment variable
    pub fn load_optional<T>(key: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => {
                let parsed = value
                    .parse()
                    .map_err(|e| ConfigError::parse_error(format!("{}: {}", key, e), "environment variable", key))?;
                Ok(Some(parsed))
            }
            Err(_) => Ok(None),
        }
    }

    /// Load a boolean environment variable with string variations
    pub fn load_bool(key: &str, default: bool) -> bool {
        match env::var(key).as_deref() {
            Ok("true" | "True" | "TRUE" | "1" | "yes" | "Yes" | "YES" | "on" | "On" | "ON") => true,
            Ok("false" | "False" | "FALSE" | "0" | "no" | "No" | "NO" | "off" | "Off" | "OFF") => false,
            _ => default,
        }
    }

    /// Load a comma-separated list of values
    pub fn load_list<T>(key: &str) -> ConfigResult<Vec<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => {
                if value.trim().is_empty() {
                    return Ok(Vec::new());
                }

                value
                    .split(',')
                    .map(|s| {
                        s.trim()
                            .parse()
                            .map_err(|e| ConfigError::parse_error(format!("{}: {}", key, e), "environment variable", key))
                    })
                    .collect()
            }
            Err(_) => Ok(Vec::new()),
        }
    }

    /// Load a duration in seconds
    pub fn load_duration_seconds(key: &str, default_seconds: u64) -> ConfigResult<std::time::Duration> {
        let seconds = Self::load_with_default(key, default_seconds)?;
        Ok(std::time::Duration::from_secs(seconds))
    }

    /// Validate that a required environment variable is set (without parsing)
    pub fn validate_present(key: &str) -> ConfigResult<()> {
        env::var(key).map(|_| ()).map_err(|_| ConfigError::env_var_not_found(key, None))
    }

    /// Validate an environment variable against a set of allowed values
    pub fn validate_enum(key: &str, allowed_values: &[&str]) -> ConfigResult<()> {
        match env::var(key) {
            Ok(value) => {
                if allowed_values.contains(&value.as_str()) {
                    Ok(())
                } else {
                    Err(ConfigError::invalid_value(
                        key,
                        format!("{} (expected one of: {})", value, allowed_values.join(", ")),
                    ))
                }
            }
            Err(_) => Ok(()), // Optional validation - OK if not present
        }
    }
}

/// Deployment environment, used to pick the observability default per spec §6
/// ("observability default (on in dev, off in prod unless requested)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Development,
    Production,
}

impl Deployment {
    pub fn from_env() -> Self {
        match env::var("ENVIRONMENT").as_deref() {
            Ok("production") | Ok("prod") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn default_observability(&self) -> bool {
        matches!(self, Self::Development)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn env_loader_required() {
        env::set_var("TEST_REQUIRED_CORE", "42");
        let result: ConfigResult<i32> = EnvLoader::load_required("TEST_REQUIRED_CORE");
        assert_eq!(result.unwrap(), 42);

        env::remove_var("TEST_REQUIRED_CORE");
        let result: ConfigResult<i32> = EnvLoader::load_required("TEST_REQUIRED_CORE");
        assert!(result.is_err());
    }

    #[test]
    fn env_loader_with_default() {
        env::set_var("TEST_DEFAULT_CORE", "100");
        let result: ConfigResult<i32> = EnvLoader::load_with_default("TEST_DEFAULT_CORE", 50);
        assert_eq!(result.unwrap(), 100);

        env::remove_var("TEST_DEFAULT_CORE");
        let result: ConfigResult<i32> = EnvLoader::load_with_default("TEST_DEFAULT_CORE", 50);
        assert_eq!(result.unwrap(), 50);
    }

    #[test]
    fn env_loader_bool() {
        env::set_var("TEST_BOOL_TRUE_CORE", "true");
        assert!(EnvLoader::load_bool("TEST_BOOL_TRUE_CORE", false));

        env::set_var("TEST_BOOL_FALSE_CORE", "false");
        assert!(!EnvLoader::load_bool("TEST_BOOL_FALSE_CORE", true));

        env::remove_var("TEST_BOOL_MISSING_CORE");
        assert!(EnvLoader::load_bool("TEST_BOOL_MISSING_CORE", true));
    }

    #[test]
    fn env_loader_list() {
        env::set_var("TEST_LIST_CORE", "a,b,c");
        let result: ConfigResult<Vec<String>> = EnvLoader::load_list("TEST_LIST_CORE");
        assert_eq!(result.unwrap(), vec!["a", "b", "c"]);

        env::remove_var("TEST_LIST_MISSING_CORE");
        let result: ConfigResult<Vec<String>> = EnvLoader::load_list("TEST_LIST_MISSING_CORE");
        assert!(result.unwrap().is_empty());
    }

    #[test]
    fn env_validator_enum() {
        env::set_var("TEST_ENUM_CORE", "valid");
        assert!(EnvLoader::validate_enum("TEST_ENUM_CORE", &["valid", "also_valid"]).is_ok());

        env::set_var("TEST_ENUM_CORE", "invalid");
        assert!(EnvLoader::validate_enum("TEST_ENUM_CORE", &["valid", "also_valid"]).is_err());

        env::remove_var("TEST_ENUM_CORE");
        assert!(EnvLoader::validate_enum("TEST_ENUM_CORE", &["valid", "also_valid"]).is_ok());
    }

    #[test]
    fn deployment_picks_observability_default() {
        env::set_var("ENVIRONMENT", "production");
        assert!(!Deployment::from_env().default_observability());

        env::set_var("ENVIRONMENT", "development");
        assert!(Deployment::from_env().default_observability());
    }
}
