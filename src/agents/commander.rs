// src/agents/commander.rs
//! Project commander
//!
//! Launches campaigns and keeps the reports the rest of the team sends in.

use crate::agents::task_types::{
    CAMPAIGN_ALERT, DECRYPTION_FAILED, LAUNCH_CAMPAIGN, LOCKDOWN_ACTIVATED, SECURITY_ALERT,
    SECURITY_SCAN_REPORT,
};
use crate::messaging::codec::CryptoCodec;
use crate::messaging::envelope::Task;
use crate::runtime::dispatch::{Agent, AgentContext, HandlerTable};
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{info, warn};

type Ctx<'a> = AgentContext<'a, ()>;

/// Campaign brief
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub product: String,
    pub target_demo: String,

    /// Remaining brief fields, kept verbatim
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Campaign {
    pub fn new(product: impl Into<String>, target_demo: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            target_demo: target_demo.into(),
            details: Map::new(),
        }
    }

    /// Deterministic identifier derived from product and audience
    pub fn id(&self, codec: &CryptoCodec) -> String {
        codec.short_id(format!("{}{}", self.product, self.target_demo))
    }
}

/// Report received from another agent
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub kind: String,
    pub origin: String,
    pub received_at: DateTime<Utc>,
    pub content: Value,
}

/// Reports kept when no capacity is configured
pub const DEFAULT_REPORT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct CommandState {
    campaigns: BTreeMap<String, Campaign>,
    reports: VecDeque<Report>,
    report_capacity: usize,
    evicted: u64,
}

/// Shared view of what the commander has launched and received
///
/// Reports form a ring: once `report_capacity` is reached the oldest one
/// is dropped for each new arrival.
#[derive(Debug, Clone)]
pub struct CommandLog(Arc<Mutex<CommandState>>);

impl Default for CommandLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_REPORT_CAPACITY)
    }
}

impl CommandLog {
    pub fn with_capacity(report_capacity: usize) -> Self {
        let report_capacity = report_capacity.max(1);
        Self(Arc::new(Mutex::new(CommandState {
            campaigns: BTreeMap::new(),
            reports: VecDeque::with_capacity(report_capacity.min(DEFAULT_REPORT_CAPACITY)),
            report_capacity,
            evicted: 0,
        })))
    }

    /// Reports dropped to stay within capacity
    pub fn evicted(&self) -> u64 {
        self.0.lock().evicted
    }

    pub fn campaign(&self, id: &str) -> Option<Campaign> {
        self.0.lock().campaigns.get(id).cloned()
    }

    pub fn campaign_ids(&self) -> Vec<String> {
        self.0.lock().campaigns.keys().cloned().collect()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.0.lock().reports.iter().cloned().collect()
    }

    /// Reports of one task type, oldest first
    pub fn reports_of(&self, kind: &str) -> Vec<Report> {
        self.0
            .lock()
            .reports
            .iter()
            .filter(|report| report.kind == kind)
            .cloned()
            .collect()
    }

    fn record_campaign(&self, id: String, campaign: Campaign) -> bool {
        self.0.lock().campaigns.insert(id, campaign).is_none()
    }

    fn record_report(&self, report: Report) {
        let mut state = self.0.lock();
        if state.reports.len() >= state.report_capacity {
            state.reports.pop_front();
            state.evicted += 1;
        }
        state.reports.push_back(report);
    }
}

/// Team lead agent
#[derive(Debug, Default)]
pub struct Commander {
    log: CommandLog,
}

impl Commander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report_capacity(report_capacity: usize) -> Self {
        Self {
            log: CommandLog::with_capacity(report_capacity),
        }
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    fn on_launch_campaign(&mut self, task: &Task, ctx: &mut Ctx<'_>) -> Result<()> {
        let campaign: Campaign = serde_json::from_value(task.content().clone())?;
        let codec = ctx
            .codec()
            .ok_or_else(|| EngineError::task("cannot issue campaign ids without a codec"))?;

        let id = campaign.id(codec);
        let product = campaign.product.clone();
        if self.log.record_campaign(id.clone(), campaign) {
            info!(campaign = %id, %product, "campaign launched");
        } else {
            info!(campaign = %id, "campaign relaunched, brief replaced");
        }
        Ok(())
    }

    fn on_report(&mut self, task: &Task, _ctx: &mut Ctx<'_>) -> Result<()> {
        match task.task_type() {
            LOCKDOWN_ACTIVATED => warn!(origin = %task.origin(), "lockdown activated by team"),
            SECURITY_ALERT | CAMPAIGN_ALERT => {
                warn!(origin = %task.origin(), kind = %task.task_type(), "alert received")
            }
            _ => info!(origin = %task.origin(), kind = %task.task_type(), "report received"),
        }

        self.log.record_report(Report {
            kind: task.task_type().to_string(),
            origin: task.origin().to_string(),
            received_at: Utc::now(),
            content: task.content().clone(),
        });
        Ok(())
    }

    fn on_decryption_failed(&mut self, task: &Task, ctx: &mut Ctx<'_>) -> Result<()> {
        warn!(origin = %task.origin(), "rejected undecryptable task");
        ctx.report_threat(&format!("undecryptable task from '{}'", task.origin()), 1.0)
    }
}

impl Agent for Commander {
    type Job = ();

    fn handlers() -> HandlerTable<Self> {
        HandlerTable::new()
            .on(LAUNCH_CAMPAIGN, Self::on_launch_campaign)
            .on(SECURITY_ALERT, Self::on_report)
            .on(LOCKDOWN_ACTIVATED, Self::on_report)
            .on(SECURITY_SCAN_REPORT, Self::on_report)
            .on(CAMPAIGN_ALERT, Self::on_report)
            .on(DECRYPTION_FAILED, Self::on_decryption_failed)
    }

    fn run_job(&mut self, _job: &(), _ctx: &mut Ctx<'_>) -> Result<()> {
        Ok(())
    }
}
