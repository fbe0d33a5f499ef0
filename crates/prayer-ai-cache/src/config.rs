//! Configuration for the flow cache
//!
//! Durations are carried as milliseconds so the struct deserializes from
//! plain JSON/YAML and maps one-to-one onto environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{FlowError, FlowResult};
use crate::rate_limit::RateLimiterConfig;

/// Flow cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCacheConfig {
    /// Lifetime of a cached result unless a call overrides it
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Interval of the background sweep over expired entries
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Per-operation admission window
    #[serde(default)]
    pub rate_limit: RateLimiterConfig,

    /// Collapse concurrent identical calls into one producer invocation
    #[serde(default = "default_coalesce")]
    pub coalesce_in_flight: bool,
}

fn default_ttl_ms() -> u64 {
    5 * 60 * 1000 // 5 minutes
}

fn default_sweep_interval_ms() -> u64 {
    5 * 60 * 1000 // 5 minutes
}

fn default_coalesce() -> bool {
    true
}

impl Default for FlowCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            rate_limit: RateLimiterConfig::default(),
            coalesce_in_flight: default_coalesce(),
        }
    }
}

impl FlowCacheConfig {
    /// Defaults overridden by environment variables
    ///
    /// Invalid values are logged and ignored.
    pub fn from_env() -> FlowResult<Self> {
        let mut config = Self::default();

        if let Some(ttl) = parse_env::<u64>("FLOW_CACHE_TTL_MS") {
            config.default_ttl_ms = ttl;
        }

        if let Some(interval) = parse_env::<u64>("FLOW_CACHE_SWEEP_INTERVAL_MS") {
            config.sweep_interval_ms = interval;
        }

        if let Some(max_requests) = parse_env::<u32>("FLOW_RATE_LIMIT_MAX_REQUESTS") {
            config.rate_limit.max_requests = max_requests;
        }

        if let Some(window) = parse_env::<u64>("FLOW_RATE_LIMIT_WINDOW_MS") {
            config.rate_limit.window_ms = window;
        }

        if let Ok(coalesce) = env::var("FLOW_CACHE_COALESCE") {
            match coalesce.to_lowercase().as_str() {
                "true" | "1" => config.coalesce_in_flight = true,
                "false" | "0" => config.coalesce_in_flight = false,
                _ => warn!("Invalid FLOW_CACHE_COALESCE value: {}", coalesce),
            }
        }

        config.validate()?;
        info!(?config, "Loaded flow cache configuration");
        Ok(config)
    }

    /// Rejects values that would disable the cache or the limiter by accident
    pub fn validate(&self) -> FlowResult<()> {
        if self.default_ttl_ms == 0 {
            return Err(FlowError::InvalidConfig("default_ttl_ms must be positive".to_string()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(FlowError::InvalidConfig("sweep_interval_ms must be positive".to_string()));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(FlowError::InvalidConfig(
                "rate_limit.max_requests must be positive".to_string(),
            ));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(FlowError::InvalidConfig("rate_limit.window_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Invalid {} value: {}", name, raw);
            None
        }
    }
}
