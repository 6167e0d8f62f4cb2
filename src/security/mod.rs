// src/security/mod.rs
//! Threat detection and escalation
//!
//! - **Threat Engine**: Level 0-10, countermeasure set, monitoring cadence
//! - **Monitoring**: Probe seam, snapshots, anomaly and full-scan rules
//! - **Countermeasures**: Actuator seam for putting measures into effect
//!
//! # Feedback loop
//!
//! ```text
//! scheduler ─tick─► probe.snapshot ─► detector.inspect ─► engine.update
//!     ▲                                                        │
//!     └──────────── clear + re-register at new cadence ◄───────┘
//! ```

pub mod countermeasures;
pub mod monitoring;
pub mod threat_engine;

pub use countermeasures::{CountermeasureActuator, LoggingActuator};
pub use monitoring::{
    Anomaly, Connection, Detector, FileIntegrityProbe, MonitoringProbe, PerformanceSample,
    ProcessInfo, QuietProbe, ScanReport, Snapshot, ThreatSignatures, Whitelist,
};
pub use threat_engine::{
    Countermeasure, MonitorCategory, ThreatEngine, ThreatUpdate, MAX_THREAT_LEVEL,
};
