//! Configuration management for the orchestration engine
//!
//! [`EngineConfig`] loads provider names, API keys, per-service model names,
//! temperatures, the HTTP port, and the observability default from the
//! environment (spec §6 "Environment configuration"), validating eagerly so a
//! misconfigured deployment fails at startup rather than mid-run.

pub mod env_utils;
pub mod error;
pub mod validation;

pub use env_utils::{Deployment, EnvLoader};
pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};

/// Top-level engine configuration, composed at process start by
/// `workflow-engine-app` and threaded into the orchestrator and effector
/// providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub providers: ProviderConfig,
    pub http: HttpConfig,
    pub observability: ObservabilityConfig,
}

/// Provider names, API keys, and default model/temperature settings for the
/// LLM and embeddings effectors (spec §4.C, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub llm_provider: String,
    pub llm_api_key: String,
    pub llm_default_model: String,
    pub llm_default_temperature: f64,
    pub embeddings_provider: String,
    pub embeddings_api_key: String,
    pub embeddings_default_model: String,
    /// Confidence threshold τ for intent detection (spec §4.G, default 0.4).
    pub intent_confidence_threshold: f64,
    /// Sampling temperature T for the router's workflow selection (spec
    /// §4.G); distinct from `llm_default_temperature`, which governs node
    /// completions rather than routing.
    pub routing_temperature: f64,
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

/// Observability defaults: on in dev, off in prod unless requested per-call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub default_enabled: bool,
    pub log_level: String,
}

impl EngineConfig {
    pub fn from_env() -> ConfigResult<Self> {
        let deployment = Deployment::from_env();
        Ok(Self {
            providers: ProviderConfig::from_env()?,
            http: HttpConfig::from_env()?,
            observability: ObservabilityConfig::from_env(deployment)?,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.providers.validate()?;
        self.http.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

impl ProviderConfig {
    fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            llm_provider: EnvLoader::load_with_default("LLM_PROVIDER", "anthropic".to_string())?,
            llm_api_key: EnvLoader::load_required("LLM_API_KEY")?,
            llm_default_model: EnvLoader::load_with_default(
                "LLM_DEFAULT_MODEL",
                "claude-3-5-sonnet-20241022".to_string(),
            )?,
            llm_default_temperature: EnvLoader::load_with_default("LLM_DEFAULT_TEMPERATURE", 0.2)?,
            embeddings_provider: EnvLoader::load_with_default("EMBEDDINGS_PROVIDER", "openai".to_string())?,
            embeddings_api_key: EnvLoader::load_required("EMBEDDINGS_API_KEY")?,
            embeddings_default_model: EnvLoader::load_with_default(
                "EMBEDDINGS_DEFAULT_MODEL",
                "text-embedding-3-small".to_string(),
            )?,
            intent_confidence_threshold: EnvLoader::load_with_default("INTENT_CONFIDENCE_THRESHOLD", 0.4)?,
            routing_temperature: EnvLoader::load_with_default("ROUTING_TEMPERATURE", 1.0)?,
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty_string(&self.llm_api_key, "LLM_API_KEY")?;
        validation::validate_non_empty_string(&self.embeddings_api_key, "EMBEDDINGS_API_KEY")?;
        validation::validate_range(self.llm_default_temperature, 0.0, 2.0, "LLM_DEFAULT_TEMPERATURE")?;
        validation::validate_range(self.intent_confidence_threshold, 0.0, 1.0, "INTENT_CONFIDENCE_THRESHOLD")?;
        if self.routing_temperature < 0.0 {
            return Err(ConfigError::invalid_value(
                "ROUTING_TEMPERATURE",
                self.routing_temperature.to_string(),
            ));
        }
        Ok(())
    }
}

impl HttpConfig {
    fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            host: EnvLoader::load_with_default("HOST", "127.0.0.1".to_string())?,
            port: EnvLoader::load_with_default("PORT", 8080u16)?,
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.port == 0 {
            return Err(ConfigError::invalid_value("PORT", self.port.to_string()));
        }
        Ok(())
    }
}

impl ObservabilityConfig {
    fn from_env(deployment: Deployment) -> ConfigResult<Self> {
        Ok(Self {
            default_enabled: EnvLoader::load_bool("OBSERVABILITY_DEFAULT", deployment.default_observability()),
            log_level: EnvLoader::load_with_default("LOG_LEVEL", "info".to_string())?,
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid_value("LOG_LEVEL", self.log_level.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_config_rejects_zero_port() {
        let config = HttpConfig {
            host: "localhost".to_string(),
            port: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn observability_config_rejects_unknown_log_level() {
        let config = ObservabilityConfig {
            default_enabled: true,
            log_level: "verbose".to_string(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn provider_config_rejects_out_of_range_temperature() {
        let config = ProviderConfig {
            llm_provider: "anthropic".to_string(),
            llm_api_key: "key".to_string(),
            llm_default_model: "model".to_string(),
            llm_default_temperature: 5.0,
            embeddings_provider: "openai".to_string(),
            embeddings_api_key: "key".to_string(),
            embeddings_default_model: "model".to_string(),
            intent_confidence_threshold: 0.4,
            routing_temperature: 1.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn provider_config_rejects_negative_routing_temperature() {
        let config = ProviderConfig {
            llm_provider: "anthropic".to_string(),
            llm_api_key: "key".to_string(),
            llm_default_model: "model".to_string(),
            llm_default_temperature: 0.2,
            embeddings_provider: "openai".to_string(),
            embeddings_api_key: "key".to_string(),
            embeddings_default_model: "model".to_string(),
            intent_confidence_threshold: 0.4,
            routing_temperature: -1.0,
        };
        assert!(config.validate().is_err());
    }
}
