// src/lib.rs
//! Agent Team Engine Library
//!
//! Runtime core for a small team of cooperating agents that exchange
//! encrypted task envelopes, run periodic jobs, and escalate threats to a
//! sentinel that drives countermeasures.
//!
//! # Architecture
//!
//! - **messaging**: Crypto codec, envelopes, lock-free task queue
//! - **runtime**: Agent worker loop, dispatch, scheduler, registry
//! - **security**: Threat engine, monitoring probes, countermeasures
//! - **agents**: Commander, sentinel and warden
//! - **observability**: Tracing and Prometheus bootstrap
//! - **utils**: Configuration and errors

pub mod agents;
pub mod messaging;
pub mod observability;
pub mod runtime;
pub mod security;
pub mod utils;

// Re-export commonly used types
pub use messaging::{CryptoCodec, Envelope, Task};
pub use runtime::{AgentRuntime, Registry, RuntimeConfig};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_info() {
        let info = BuildInfo::current();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(!info.git_hash.is_empty());
        assert!(!info.rustc_version.is_empty());
    }
}
