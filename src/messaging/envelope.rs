// src/messaging/envelope.rs
//! Message envelope exchanged between agents
//!
//! Flat, versionless wire unit:
//!
//! ```text
//! { "type": "threat_alert", "encrypted": true, "payload": "<base64>",
//!   "origin": "commander", "timestamp": "2024-05-01T12:00:00Z" }
//! ```
//!
//! An envelope is opened into a [`Task`] by the receiving runtime's worker.

use crate::messaging::codec::{Ciphertext, CryptoCodec};
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Task type synthesized when an inbound envelope cannot be decrypted
pub const DECRYPTION_FAILED: &str = "decryption_failed";

/// Wire envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Handler selector
    #[serde(rename = "type")]
    task_type: String,

    encrypted: bool,

    /// JSON text when plain, codec ciphertext when encrypted
    payload: String,

    /// Sender identifier
    origin: String,

    timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Build a plaintext envelope carrying `content` as JSON text
    pub fn plain(task_type: impl Into<String>, origin: impl Into<String>, content: &Value) -> Self {
        Self {
            task_type: task_type.into(),
            encrypted: false,
            payload: content.to_string(),
            origin: origin.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build an encrypted envelope, sealing `content` with the shared codec
    pub fn sealed(
        codec: &CryptoCodec,
        task_type: impl Into<String>,
        origin: impl Into<String>,
        content: &Value,
    ) -> Result<Self> {
        let ciphertext = codec.encrypt(&content.to_string())?;
        Ok(Self::from_ciphertext(task_type, origin, ciphertext))
    }

    /// Wrap ciphertext that was already produced by a codec
    pub fn from_ciphertext(
        task_type: impl Into<String>,
        origin: impl Into<String>,
        ciphertext: Ciphertext,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            encrypted: true,
            payload: ciphertext.into_inner(),
            origin: origin.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the JSON wire form
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Decode the envelope into a task, decrypting when marked encrypted
    pub fn open(&self, codec: Option<&CryptoCodec>) -> Result<Task> {
        let plaintext = if self.encrypted {
            let codec = codec.ok_or_else(|| {
                EngineError::Decryption("encrypted envelope but no codec configured".into())
            })?;
            codec.decrypt(&self.payload)?
        } else {
            self.payload.clone()
        };

        // Non-JSON plaintext is delivered as a JSON string
        let content = match serde_json::from_str(&plaintext) {
            Ok(value) => value,
            Err(_) => Value::String(plaintext.clone()),
        };

        Ok(Task {
            task_type: self.task_type.clone(),
            origin: self.origin.clone(),
            timestamp: self.timestamp,
            content,
            plaintext,
        })
    }
}

/// Decoded unit of work handed to a handler
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    task_type: String,
    origin: String,
    timestamp: DateTime<Utc>,
    content: Value,

    /// Payload text exactly as decoded, before JSON parsing
    plaintext: String,
}

impl Task {
    pub fn new(task_type: impl Into<String>, origin: impl Into<String>, content: Value) -> Self {
        Self {
            task_type: task_type.into(),
            origin: origin.into(),
            timestamp: Utc::now(),
            plaintext: content.to_string(),
            content,
        }
    }

    /// Marker task for an envelope whose payload could not be decrypted
    pub fn decryption_failed(envelope: &Envelope, error: &EngineError) -> Self {
        let content = json!({
            "original_type": envelope.task_type,
            "error": error.to_string(),
        });
        Self {
            task_type: DECRYPTION_FAILED.to_string(),
            origin: envelope.origin.clone(),
            timestamp: envelope.timestamp,
            plaintext: content.to_string(),
            content,
        }
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Decoded payload text; distinguishes `42` from `"42"` where `content` cannot
    pub fn plaintext(&self) -> &str {
        &self.plaintext
    }

    /// Look up a top-level field of an object payload
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// Required string field, or a `TaskFailed` error naming it
    pub fn str_field(&self, key: &str) -> Result<&str> {
        self.field(key).and_then(Value::as_str).ok_or_else(|| {
            EngineError::task(format!("'{}' task is missing string field '{}'", self.task_type, key))
        })
    }
}
