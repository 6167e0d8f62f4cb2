// src/agents/mod.rs
//! Team agents hosted on the runtime
//!
//! - **Commander**: Launches campaigns, collects reports from the team
//! - **Sentinel**: Hosts the threat engine and host monitoring
//! - **Warden**: Accumulates campaign performance, raises campaign alerts
//!
//! Agents talk only through envelopes routed by the registry.

pub mod commander;
pub mod sentinel;
pub mod warden;

pub use commander::{Campaign, CommandLog, Commander, Report, DEFAULT_REPORT_CAPACITY};
pub use sentinel::{Sentinel, ThreatSnapshot, ThreatStatus};
pub use warden::{AlertSeverity, CampaignAlert, Warden, WardenJob};

/// Registry identifier of the commander
pub const COMMANDER_ID: &str = "commander";

/// Registry identifier of the sentinel
pub const SENTINEL_ID: &str = "sentinel";

/// Registry identifier of the warden
pub const WARDEN_ID: &str = "warden";

/// Task type tags understood by the team
pub mod task_types {
    pub use crate::messaging::envelope::DECRYPTION_FAILED;
    pub use crate::runtime::dispatch::THREAT_ALERT;

    pub const SECURITY_SCAN: &str = "security_scan";
    pub const UPDATE_WHITELIST: &str = "update_whitelist";
    pub const LOCKDOWN: &str = "lockdown";

    pub const SECURITY_ALERT: &str = "security_alert";
    pub const LOCKDOWN_ACTIVATED: &str = "lockdown_activated";
    pub const SECURITY_SCAN_REPORT: &str = "security_scan_report";

    pub const LAUNCH_CAMPAIGN: &str = "launch_campaign";
    pub const PERFORMANCE_REPORT: &str = "performance_report";
    pub const CAMPAIGN_ALERT: &str = "campaign_alert";
}
