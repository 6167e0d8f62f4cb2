// src/runtime/mod.rs
//! Agent execution runtime
//!
//! This module provides the core agent execution environment, including:
//!
//! - **Agent Runtime**: Lifecycle of one agent behind its task inbox
//! - **Dispatch**: Agent behaviour trait, handler tables, handler context
//! - **Scheduler**: Per-agent periodic job table
//! - **Registry**: Capability-checked identifier → agent map
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Registry                          │
//! │   ┌────────────┐   ┌────────────┐   ┌────────────┐       │
//! │   │ commander  │   │  sentinel  │   │   warden   │  ...  │
//! │   └─────┬──────┘   └─────┬──────┘   └─────┬──────┘       │
//! │         ▼                ▼                ▼              │
//! │     TaskQueue        TaskQueue        TaskQueue          │
//! │         │                │                │              │
//! │      worker           worker           worker            │
//! │   dispatch / tick  dispatch / tick  dispatch / tick      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Agents run in parallel with each other. Within one agent, handlers and
//! scheduled jobs never overlap.

pub mod agent_runtime;
pub mod dispatch;
pub mod registry;
pub mod scheduler;

// Re-export commonly used types
pub use agent_runtime::{AgentRuntime, RuntimeBuilder, RuntimeConfig, RuntimeState};
pub use dispatch::{Agent, AgentContext, Handler, HandlerTable, MessageRouter, ThreatMonitorLink};
pub use registry::{Capability, CapabilitySet, ManagedAgent, Registry};
pub use scheduler::{JobId, ScheduledJob, Scheduler};
