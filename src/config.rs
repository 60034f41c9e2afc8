use std::env;
use std::time::Duration;

use crate::utils::RetryConfig;

// ============================================================================
// Runtime Configuration - bus and cache settings from the environment
// ============================================================================
//
//   CQRS_LOG_FILTER (falls back to RUST_LOG)
//   CQRS_METRICS_NAMESPACE
//   CQRS_CACHE_TTL_SECS, CQRS_CACHE_CAPACITY
//   CQRS_RETRY_MAX_ATTEMPTS, CQRS_RETRY_INITIAL_DELAY_MS
//
// ============================================================================

/// Runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// `tracing` filter directive
    pub log_filter: String,

    /// Prefix for every Prometheus metric name
    pub metrics_namespace: String,

    /// How long a cached query response stays valid
    pub cache_ttl: Duration,

    /// Maximum number of cached query responses
    pub cache_capacity: usize,

    /// Backoff policy for commands failing with a concurrency conflict
    pub retry: RetryConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_filter: "info,cqrs_runtime=debug".to_string(),
            metrics_namespace: "cqrs".to_string(),
            cache_ttl: Duration::from_secs(60),
            cache_capacity: 1024,
            retry: RetryConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_filter = lookup("CQRS_LOG_FILTER")
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or(defaults.log_filter);

        let metrics_namespace = lookup("CQRS_METRICS_NAMESPACE").unwrap_or(defaults.metrics_namespace);

        let cache_ttl = match lookup("CQRS_CACHE_TTL_SECS") {
            Some(raw) => Duration::from_secs(parse(&raw, "CQRS_CACHE_TTL_SECS")?),
            None => defaults.cache_ttl,
        };

        let cache_capacity = match lookup("CQRS_CACHE_CAPACITY") {
            Some(raw) => parse(&raw, "CQRS_CACHE_CAPACITY")?,
            None => defaults.cache_capacity,
        };

        let mut retry = defaults.retry;
        if let Some(raw) = lookup("CQRS_RETRY_MAX_ATTEMPTS") {
            retry.max_attempts = parse(&raw, "CQRS_RETRY_MAX_ATTEMPTS")?;
        }
        if let Some(raw) = lookup("CQRS_RETRY_INITIAL_DELAY_MS") {
            retry.initial_delay = Duration::from_millis(parse(&raw, "CQRS_RETRY_INITIAL_DELAY_MS")?);
        }

        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue("CQRS_RETRY_MAX_ATTEMPTS"));
        }

        Ok(Self {
            log_filter,
            metrics_namespace,
            cache_ttl,
            cache_capacity,
            retry,
        })
    }
}

fn parse<T: std::str::FromStr>(raw: &str, name: &'static str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name))
}

/// Configuration error types
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
