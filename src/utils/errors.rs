// src/utils/errors.rs
//! Engine error types
//!
//! Every fallible operation in the library returns [`Result`]. Failures are
//! local to the agent that produced them; the runtime logs them with the
//! agent identity and keeps going.

use crate::runtime::registry::Capability;
use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the agent runtime core
#[derive(Debug, Error)]
pub enum EngineError {
    /// Ciphertext was malformed or sealed under a different key
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// `receive` was called after the runtime reached `Stopped`
    #[error("Agent runtime '{0}' is stopped")]
    RuntimeStopped(String),

    #[error("Agent '{id}' failed security validation, missing capabilities: {missing:?}")]
    SecurityValidation { id: String, missing: Vec<Capability> },

    #[error("Agent '{0}' is not registered")]
    NotFound(String),

    #[error("Agent '{0}' is already registered")]
    DuplicateAgent(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Monitoring probe failed: {0}")]
    ProbeFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for handler failures carrying a message
    pub fn task(message: impl Into<String>) -> Self {
        EngineError::TaskFailed(message.into())
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}
