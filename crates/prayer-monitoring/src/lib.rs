//! Monitoring for the prayer journal AI flows.
//!
//! Everything here is plain `tracing`: the subscriber is installed once per
//! process by [`init`], and the flow cache reports its counters through
//! [`metrics::FlowCacheMetrics`] as structured events.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

pub mod logging;
pub mod metrics;

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable multi-line output for development
    Pretty,
    /// Single-line output
    Compact,
    /// JSON lines for log aggregation
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to the startup event
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Log level filter (e.g., "info,prayer_ai_cache=debug"), used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Output format
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_service_name() -> String {
    "prayer-journal".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

fn default_environment() -> String {
    "dev".to_string()
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_filter: default_log_filter(),
            log_format: default_log_format(),
            environment: default_environment(),
        }
    }
}

impl MonitoringConfig {
    /// Defaults overridden by `SERVICE_NAME`, `LOG_FILTER`, `LOG_FORMAT` and `ENVIRONMENT`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(service_name) = env::var("SERVICE_NAME") {
            config.service_name = service_name;
        }

        if let Ok(log_filter) = env::var("LOG_FILTER") {
            config.log_filter = log_filter;
        }

        if let Ok(log_format) = env::var("LOG_FORMAT") {
            match LogFormat::parse(&log_format) {
                Some(format) => config.log_format = format,
                None => warn!("Invalid LOG_FORMAT value: {}", log_format),
            }
        }

        if let Ok(environment) = env::var("ENVIRONMENT") {
            config.environment = environment;
        }

        config
    }
}

/// Initialize the monitoring system
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init(config: &MonitoringConfig) -> anyhow::Result<()> {
    logging::init_logging(config)
}

/// Shutdown the monitoring system
pub fn shutdown() {
    tracing::info!("Shutting down monitoring system");
}

pub use crate::metrics::FlowCacheMetrics;
