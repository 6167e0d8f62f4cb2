// src/messaging/mod.rs
//! Encrypted message framing between agents
//!
//! - **Codec**: AES-256-GCM encrypt/decrypt and SHA-256 hashing
//! - **Envelope**: Wire unit (type, encrypted flag, payload, origin, timestamp)
//! - **Task Queue**: Lock-free per-agent inbox
//!
//! # Flow
//!
//! ```text
//! producer ─ seal(content) ─► Envelope ─ receive() ─► TaskQueue
//!                                                        │
//!                          worker ◄─ open(codec) ◄───────┘
//!                            │
//!                            └─► Task ─► handler table
//! ```

pub mod codec;
pub mod envelope;
pub mod task_queue;

pub use codec::{Ciphertext, CryptoCodec, MAX_PAYLOAD_BYTES};
pub use envelope::{Envelope, Task, DECRYPTION_FAILED};
pub use task_queue::{QueueStats, TaskQueue};
