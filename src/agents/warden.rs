// src/agents/warden.rs
//! Analytics warden
//!
//! Accumulates per-campaign performance samples, periodically checks the
//! latest engagement rate against the configured thresholds, and flushes
//! everything it holds to JSON files when the runtime drains.

use crate::agents::task_types::{CAMPAIGN_ALERT, DECRYPTION_FAILED, PERFORMANCE_REPORT};
use crate::messaging::envelope::Task;
use crate::runtime::dispatch::{Agent, AgentContext, HandlerTable};
use crate::utils::config::AnalyticsSettings;
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Samples needed before a campaign is analyzed
pub const MIN_SAMPLES: usize = 3;

/// Recurring warden jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WardenJob {
    Analysis,
}

type Ctx<'a> = AgentContext<'a, WardenJob>;

/// One performance report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub recorded_at: DateTime<Utc>,
    pub engagement_rate: f64,

    /// Any other metrics reported alongside
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Least-squares line over the sample index
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub slope: f64,
    pub intercept: f64,
    pub current: f64,
}

impl Trend {
    /// `None` for fewer than two points
    pub fn fit(values: &[f64]) -> Option<Self> {
        let current = *values.last()?;
        if values.len() < 2 {
            return None;
        }

        let n = values.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = values.iter().sum::<f64>() / n;

        let (mut covariance, mut variance) = (0.0, 0.0);
        for (i, y) in values.iter().enumerate() {
            let dx = i as f64 - mean_x;
            covariance += dx * (y - mean_y);
            variance += dx * dx;
        }

        let slope = covariance / variance;
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
            current,
        })
    }
}

/// Engagement alert for one campaign
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignAlert {
    pub campaign_id: String,
    pub severity: AlertSeverity,
    pub metric: &'static str,
    pub value: f64,
    pub threshold: f64,
    pub trend: Trend,
}

/// Campaign analytics agent
pub struct Warden {
    settings: AnalyticsSettings,

    /// Recipient of campaign alerts
    commander_id: String,

    campaigns: BTreeMap<String, Vec<MetricSample>>,
}

impl Warden {
    pub fn new(settings: AnalyticsSettings, commander_id: impl Into<String>) -> Self {
        Self {
            settings,
            commander_id: commander_id.into(),
            campaigns: BTreeMap::new(),
        }
    }

    pub fn samples(&self, campaign_id: &str) -> &[MetricSample] {
        self.campaigns.get(campaign_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record a sample for a campaign
    pub fn record(&mut self, campaign_id: &str, engagement_rate: f64, extra: Map<String, Value>) {
        self.campaigns
            .entry(campaign_id.to_string())
            .or_default()
            .push(MetricSample {
                recorded_at: Utc::now(),
                engagement_rate,
                extra,
            });
        debug!(campaign = %campaign_id, engagement_rate, "recorded metrics");
    }

    /// Check every campaign with enough samples
    pub fn analyze(&self) -> Vec<CampaignAlert> {
        let warning = self.settings.engagement_warning;
        let critical = self.settings.engagement_critical;

        self.campaigns
            .iter()
            .filter(|(_, samples)| samples.len() >= MIN_SAMPLES)
            .filter_map(|(campaign_id, samples)| {
                let rates: Vec<f64> = samples.iter().map(|s| s.engagement_rate).collect();
                let trend = Trend::fit(&rates)?;

                let (severity, threshold) = if trend.current < critical {
                    (AlertSeverity::Critical, critical)
                } else if trend.current < warning {
                    (AlertSeverity::Warning, warning)
                } else {
                    return None;
                };

                Some(CampaignAlert {
                    campaign_id: campaign_id.clone(),
                    severity,
                    metric: "engagement_rate",
                    value: trend.current,
                    threshold,
                    trend,
                })
            })
            .collect()
    }

    /// Write each campaign's samples to `<data_dir>/<campaign>_<YYYYMMDD>.json`
    pub fn flush(&self) -> Result<Vec<PathBuf>> {
        if self.campaigns.values().all(Vec::is_empty) {
            return Ok(Vec::new());
        }

        fs::create_dir_all(&self.settings.data_dir)?;
        let date = Utc::now().format("%Y%m%d");

        let mut written = Vec::new();
        for (campaign_id, samples) in self.campaigns.iter().filter(|(_, s)| !s.is_empty()) {
            let path = self
                .settings
                .data_dir
                .join(format!("{}_{}.json", file_stem(campaign_id), date));
            fs::write(&path, serde_json::to_vec_pretty(samples)?)?;
            written.push(path);
        }

        info!(files = written.len(), dir = %self.settings.data_dir.display(), "flushed campaign metrics");
        Ok(written)
    }

    fn on_performance_report(&mut self, task: &Task, _ctx: &mut Ctx<'_>) -> Result<()> {
        let campaign_id = task.str_field("campaign_id")?;
        let mut metrics = match task.field("metrics") {
            Some(Value::Object(metrics)) => metrics.clone(),
            _ => return Err(EngineError::task("performance_report is missing 'metrics'")),
        };

        let engagement_rate = metrics
            .remove("engagement_rate")
            .and_then(|rate| rate.as_f64())
            .ok_or_else(|| EngineError::task("performance_report has no numeric 'engagement_rate'"))?;

        self.record(campaign_id, engagement_rate, metrics);
        Ok(())
    }

    fn on_decryption_failed(&mut self, task: &Task, ctx: &mut Ctx<'_>) -> Result<()> {
        warn!(origin = %task.origin(), "rejected undecryptable task");
        ctx.report_threat(&format!("undecryptable task from '{}'", task.origin()), 1.0)
    }

    fn run_analysis(&mut self, ctx: &mut Ctx<'_>) -> Result<()> {
        info!(campaigns = self.campaigns.len(), "running periodic analysis");

        let mut failed = 0;
        for alert in self.analyze() {
            warn!(
                campaign = %alert.campaign_id,
                severity = ?alert.severity,
                value = alert.value,
                "engagement below threshold"
            );
            let content = serde_json::to_value(&alert)?;
            if let Err(e) = ctx.send(&self.commander_id, CAMPAIGN_ALERT, content) {
                warn!(campaign = %alert.campaign_id, "failed to deliver campaign alert: {}", e);
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(EngineError::task(format!("{} campaign alerts undelivered", failed)));
        }
        Ok(())
    }
}

impl Agent for Warden {
    type Job = WardenJob;

    fn handlers() -> HandlerTable<Self> {
        HandlerTable::new()
            .on(PERFORMANCE_REPORT, Self::on_performance_report)
            .on(DECRYPTION_FAILED, Self::on_decryption_failed)
    }

    fn on_start(&mut self, ctx: &mut Ctx<'_>) -> Result<()> {
        let interval = Duration::from_secs(self.settings.analysis_interval_secs);
        ctx.scheduler().register(interval, WardenJob::Analysis);
        info!(?interval, "warden analysis scheduled");
        Ok(())
    }

    fn run_job(&mut self, job: &WardenJob, ctx: &mut Ctx<'_>) -> Result<()> {
        match job {
            WardenJob::Analysis => self.run_analysis(ctx),
        }
    }

    fn on_drain(&mut self) -> Result<()> {
        self.flush().map(|_| ())
    }
}

/// Campaign id made safe for use as a file name
fn file_stem(campaign_id: &str) -> String {
    campaign_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
