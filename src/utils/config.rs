// src/utils/config.rs
//! Engine configuration
//!
//! Layered with the `config` crate:
//!
//! 1. Built-in defaults (every field has one)
//! 2. `config/engine.toml` (optional)
//! 3. Environment overrides, e.g. `AGENT_TEAM__RUNTIME__JOIN_TIMEOUT_SECS=10`

use crate::utils::errors::{EngineError, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file (extension resolved by `config`)
pub const DEFAULT_CONFIG_PATH: &str = "config/engine";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "AGENT_TEAM";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub runtime: RuntimeSettings,
    pub security: SecuritySettings,
    pub threat: ThreatSettings,
    pub analytics: AnalyticsSettings,
    pub commander: CommanderSettings,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Worker loop timing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// How long the worker waits on an empty queue before ticking the scheduler
    pub dequeue_timeout_ms: u64,

    /// Bounded join on shutdown
    pub join_timeout_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            dequeue_timeout_ms: 100,
            join_timeout_secs: 5,
        }
    }
}

/// Shared codec key material
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Base64 AES-256 key; a fresh key is generated when absent
    pub encryption_key: Option<String>,
}

/// Base monitoring cadence of the sentinel, in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThreatSettings {
    pub network_secs: u64,
    pub process_secs: u64,
    pub performance_secs: u64,
    pub integrity_secs: u64,
}

impl Default for ThreatSettings {
    fn default() -> Self {
        Self {
            network_secs: 5,
            process_secs: 10,
            performance_secs: 15,
            integrity_secs: 30,
        }
    }
}

/// Analytics warden settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    pub analysis_interval_secs: u64,
    pub engagement_warning: f64,
    pub engagement_critical: f64,

    /// Where accumulated metrics are flushed on shutdown
    pub data_dir: PathBuf,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            analysis_interval_secs: 30 * 60,
            engagement_warning: 0.02,
            engagement_critical: 0.01,
            data_dir: PathBuf::from("data/analytics"),
        }
    }
}

/// Commander bookkeeping
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommanderSettings {
    /// Reports kept in memory; the oldest are evicted first
    pub report_capacity: usize,
}

impl Default for CommanderSettings {
    fn default() -> Self {
        Self {
            report_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus listener; metrics export is disabled when unset
    pub listen_addr: Option<SocketAddr>,
}

impl EngineConfig {
    /// Load from the default file location plus environment overrides
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(DEFAULT_CONFIG_PATH).required(false))
            .add_source(Self::environment())
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file (must exist) plus environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(true))
            .add_source(Self::environment())
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
    }

    /// Reject settings the runtime cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.runtime.dequeue_timeout_ms == 0 {
            return Err(EngineError::ConfigError(
                "runtime.dequeue_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.runtime.join_timeout_secs == 0 {
            return Err(EngineError::ConfigError(
                "runtime.join_timeout_secs must be greater than 0".into(),
            ));
        }

        let threat = &self.threat;
        for (name, secs) in [
            ("network_secs", threat.network_secs),
            ("process_secs", threat.process_secs),
            ("performance_secs", threat.performance_secs),
            ("integrity_secs", threat.integrity_secs),
        ] {
            if secs == 0 {
                return Err(EngineError::ConfigError(format!(
                    "threat.{} must be greater than 0",
                    name
                )));
            }
        }

        let analytics = &self.analytics;
        if analytics.analysis_interval_secs == 0 {
            return Err(EngineError::ConfigError(
                "analytics.analysis_interval_secs must be greater than 0".into(),
            ));
        }
        if analytics.engagement_critical > analytics.engagement_warning {
            return Err(EngineError::ConfigError(format!(
                "analytics.engagement_critical ({}) cannot exceed engagement_warning ({})",
                analytics.engagement_critical, analytics.engagement_warning
            )));
        }

        if self.commander.report_capacity == 0 {
            return Err(EngineError::ConfigError(
                "commander.report_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl RuntimeSettings {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}
