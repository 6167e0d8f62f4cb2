// src/observability.rs
//! Logging and metrics bootstrap
//!
//! Call both once at process start, before any runtime is spawned.

use crate::utils::config::{LoggingConfig, MetricsConfig};
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `logging.level` when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| EngineError::ConfigError(format!("invalid log filter '{}': {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| EngineError::ConfigError(format!("failed to install subscriber: {}", e)))
}

/// Install the Prometheus recorder and its scrape listener
///
/// Without a listen address metrics stay disabled and the `metrics` macros
/// are no-ops.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    let Some(addr) = config.listen_addr else {
        debug!("metrics export disabled");
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::ConfigError(format!("failed to start metrics exporter: {}", e)))?;

    info!(%addr, "prometheus exporter listening");
    Ok(())
}
