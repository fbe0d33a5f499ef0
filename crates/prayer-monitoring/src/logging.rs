//! Structured logging using tracing.

use anyhow::Context;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{LogFormat, MonitoringConfig};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `config.log_filter`.
pub fn init_logging(config: &MonitoringConfig) -> anyhow::Result<()> {
    INITIALIZED
        .get_or_try_init(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_filter))
                .with_context(|| format!("Invalid log filter: {}", config.log_filter))?;

            let pretty = (config.log_format == LogFormat::Pretty)
                .then(|| fmt::layer().pretty().with_target(true).with_thread_ids(true));
            let compact = (config.log_format == LogFormat::Compact)
                .then(|| fmt::layer().compact().with_target(true));
            let json = (config.log_format == LogFormat::Json).then(|| {
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_file(true)
                    .with_line_number(true)
            });

            tracing_subscriber::registry()
                .with(env_filter)
                .with(pretty)
                .with(compact)
                .with(json)
                .try_init()
                .context("Failed to set global default subscriber")?;

            info!(
                service_name = %config.service_name,
                environment = %config.environment,
                log_format = ?config.log_format,
                "Logging initialized"
            );

            Ok::<(), anyhow::Error>(())
        })
        .map(|_| ())
}

/// Route tracing output through the test harness' captured writer
///
/// Ignores the error when another test already installed a subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_target(false)
        .with_test_writer()
        .try_init();
}
