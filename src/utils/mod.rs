// src/utils/mod.rs
//! Common utilities
//!
//! - **config**: Layered engine configuration
//! - **errors**: Engine error type and `Result` alias

pub mod config;
pub mod errors;

pub use config::EngineConfig;
pub use errors::{EngineError, Result};
