//! Configuration structures
//!
//! Every section deserializes with `#[serde(default)]`, so a config file only
//! needs the keys it overrides. Durations are stored as integer milliseconds
//! and exposed as [`Duration`] through accessors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_BASE_TIMEOUT_MS, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL,
    DEFAULT_COMPLEX_TIMEOUT_MS, DEFAULT_COST_PER_1K_TOKENS, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_LOG_FILTER, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_FAILURES, DEFAULT_MAX_RETRIES, DEFAULT_MULTIPLIER, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_RESET_TIMEOUT_MS, DEFAULT_SIMPLE_TIMEOUT_MS,
};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LumenConfig {
    pub provider: ProviderConfig,
    pub resilience: ResilienceSettings,
    pub logging: LoggingConfig,
}

/// LLM provider connection settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL, without a trailing `/embeddings` or `/chat/completions`
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// Expected length of every embedding vector
    pub dimensions: usize,
    /// Inputs per provider request; larger inputs are split
    pub max_batch_size: usize,
    pub cost_per_1k_tokens: f64,
    /// Outer bound for a single HTTP exchange, above any attempt deadline
    pub request_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            cost_per_1k_tokens: DEFAULT_COST_PER_1K_TOKENS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// Keep the API key out of logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .field("dimensions", &self.dimensions)
            .field("max_batch_size", &self.max_batch_size)
            .field("cost_per_1k_tokens", &self.cost_per_1k_tokens)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Tunables for the breaker, backoff and timeout stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub circuit_breaker: CircuitBreakerSettings,
    pub backoff: BackoffSettings,
    pub timeout: TimeoutSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub max_failures: u32,
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self { max_failures: DEFAULT_MAX_FAILURES, reset_timeout_ms: DEFAULT_RESET_TIMEOUT_MS }
    }
}

impl CircuitBreakerSettings {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
    /// Randomise each delay within `[delay / 2, delay]`
    pub jitter: bool,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            jitter: true,
        }
    }
}

impl BackoffSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub base_ms: u64,
    pub simple_ms: u64,
    pub complex_ms: u64,
    pub adaptive: bool,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BASE_TIMEOUT_MS,
            simple_ms: DEFAULT_SIMPLE_TIMEOUT_MS,
            complex_ms: DEFAULT_COMPLEX_TIMEOUT_MS,
            adaptive: true,
        }
    }
}

impl TimeoutSettings {
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn simple(&self) -> Duration {
        Duration::from_millis(self.simple_ms)
    }

    pub fn complex(&self) -> Duration {
        Duration::from_millis(self.complex_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: DEFAULT_LOG_FILTER.to_string(), format: LogFormat::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: LumenConfig = serde_json::from_str(
            r#"{
                "provider": { "api_key": "sk-test", "dimensions": 3072 },
                "resilience": { "backoff": { "max_retries": 5 } },
                "logging": { "format": "json" }
            }"#,
        )
        .expect("valid config");

        assert_eq!(config.provider.api_key, "sk-test");
        assert_eq!(config.provider.dimensions, 3072);
        assert_eq!(config.provider.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.resilience.backoff.max_retries, 5);
        assert_eq!(config.resilience.backoff.base_delay(), Duration::from_secs(1));
        assert_eq!(config.resilience.circuit_breaker.max_failures, DEFAULT_MAX_FAILURES);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn timeout_defaults() {
        let timeouts = TimeoutSettings::default();
        assert_eq!(timeouts.simple(), Duration::from_secs(20));
        assert_eq!(timeouts.base(), Duration::from_secs(60));
        assert_eq!(timeouts.complex(), Duration::from_secs(90));
        assert!(timeouts.adaptive);
    }

    #[test]
    fn api_key_is_never_serialized_or_printed() {
        let provider = ProviderConfig { api_key: "sk-secret".into(), ..ProviderConfig::default() };

        let json = serde_json::to_string(&provider).expect("serializes");
        assert!(!json.contains("sk-secret"));
        assert!(!format!("{provider:?}").contains("sk-secret"));
    }
}
