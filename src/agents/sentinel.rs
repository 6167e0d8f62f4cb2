// src/agents/sentinel.rs
//! Security sentinel
//!
//! Hosts the [`ThreatEngine`]. One scheduler job per monitoring category
//! pulls a snapshot from the probe and feeds anomalies back into the
//! engine; other agents escalate through `threat_alert` tasks.

use crate::agents::task_types::{
    DECRYPTION_FAILED, LOCKDOWN, LOCKDOWN_ACTIVATED, SECURITY_ALERT, SECURITY_SCAN,
    SECURITY_SCAN_REPORT, THREAT_ALERT, UPDATE_WHITELIST,
};
use crate::messaging::envelope::Task;
use crate::runtime::dispatch::{Agent, AgentContext, HandlerTable};
use crate::security::countermeasures::{CountermeasureActuator, LoggingActuator};
use crate::security::monitoring::{Anomaly, Detector, MonitoringProbe, QuietProbe, Whitelist};
use crate::security::threat_engine::{
    round_severity, severity_from_json, Countermeasure, MonitorCategory, ThreatEngine,
    ThreatUpdate,
};
use crate::utils::config::ThreatSettings;
use crate::utils::errors::{EngineError, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

type Ctx<'a> = AgentContext<'a, MonitorCategory>;

/// Point-in-time view of the threat state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreatSnapshot {
    pub level: u8,
    pub active: Vec<Countermeasure>,
}

/// Shared read handle on the sentinel's threat state
#[derive(Debug, Clone, Default)]
pub struct ThreatStatus(Arc<RwLock<ThreatSnapshot>>);

impl ThreatStatus {
    pub fn snapshot(&self) -> ThreatSnapshot {
        self.0.read().clone()
    }

    pub fn level(&self) -> u8 {
        self.0.read().level
    }

    pub fn is_active(&self, measure: Countermeasure) -> bool {
        self.0.read().active.contains(&measure)
    }

    fn publish(&self, engine: &ThreatEngine) {
        let mut snapshot = self.0.write();
        snapshot.level = engine.level();
        snapshot.active = engine.active_countermeasures().iter().copied().collect();
    }
}

/// Threat monitoring agent
pub struct Sentinel {
    engine: ThreatEngine,
    detector: Detector,
    probe: Box<dyn MonitoringProbe>,
    actuator: Box<dyn CountermeasureActuator>,

    /// Recipient of alerts and reports
    commander_id: String,

    status: ThreatStatus,
}

impl Sentinel {
    /// Sentinel with a quiet probe and a logging actuator
    pub fn new(settings: &ThreatSettings, commander_id: impl Into<String>) -> Self {
        Self {
            engine: ThreatEngine::new(settings),
            detector: Detector::default(),
            probe: Box::new(QuietProbe),
            actuator: Box::new(LoggingActuator::new()),
            commander_id: commander_id.into(),
            status: ThreatStatus::default(),
        }
    }

    pub fn with_probe(mut self, probe: impl MonitoringProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_actuator(mut self, actuator: impl CountermeasureActuator + 'static) -> Self {
        self.actuator = Box::new(actuator);
        self
    }

    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detector = detector;
        self
    }

    /// Handle that keeps observing the threat state after the sentinel is spawned
    pub fn status(&self) -> ThreatStatus {
        self.status.clone()
    }

    pub fn engine(&self) -> &ThreatEngine {
        &self.engine
    }

    /// Apply a level delta and put any newly activated measures into effect
    fn escalate(&mut self, delta: i64, ctx: &mut Ctx<'_>) -> Result<ThreatUpdate> {
        let update = self.engine.update(delta, ctx.scheduler());
        self.actuate(&update.activated);
        self.status.publish(&self.engine);

        if update.lockdown_triggered {
            self.notify_lockdown(ctx)?;
        }
        Ok(update)
    }

    fn actuate(&mut self, measures: &[Countermeasure]) {
        for measure in measures {
            if let Err(e) = self.actuator.apply(*measure) {
                error!(%measure, "failed to apply countermeasure: {}", e);
            }
        }
    }

    fn notify_lockdown(&self, ctx: &Ctx<'_>) -> Result<()> {
        ctx.send(
            &self.commander_id,
            LOCKDOWN_ACTIVATED,
            json!({
                "threat_level": self.engine.level(),
                "active_measures": self.engine.active_countermeasures(),
                "timestamp": Utc::now(),
            }),
        )
    }

    fn handle_anomaly(&mut self, anomaly: Anomaly, ctx: &mut Ctx<'_>) -> Result<()> {
        warn!(
            category = %anomaly.category,
            severity = anomaly.severity,
            "{}", anomaly.description
        );

        self.escalate(round_severity(anomaly.severity), ctx)?;

        ctx.send(
            &self.commander_id,
            SECURITY_ALERT,
            json!({
                "category": anomaly.category,
                "description": anomaly.description,
                "severity": anomaly.severity,
                "threat_level": self.engine.level(),
                "timestamp": Utc::now(),
            }),
        )
    }

    fn on_security_scan(&mut self, _task: &Task, ctx: &mut Ctx<'_>) -> Result<()> {
        info!("initiating full system scan");

        let mut snapshots = Vec::with_capacity(MonitorCategory::ALL.len());
        for category in MonitorCategory::ALL {
            match self.probe.snapshot(category) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(%category, "probe failed during scan: {}", e),
            }
        }

        let report = self.detector.full_scan(&snapshots);
        let score = report.threat_score();
        info!(threats = report.threat_count(), score, "full scan complete");

        self.escalate(round_severity(score), ctx)?;

        ctx.send(
            &self.commander_id,
            SECURITY_SCAN_REPORT,
            json!({
                "threat_level": self.engine.level(),
                "threat_score": score,
                "scan_results": report.to_json(),
                "timestamp": Utc::now(),
            }),
        )
    }

    fn on_threat_alert(&mut self, task: &Task, ctx: &mut Ctx<'_>) -> Result<()> {
        let threat = task
            .field("threat")
            .ok_or_else(|| EngineError::task("threat_alert is missing 'threat'"))?;
        let description = threat
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unspecified");
        let severity = severity_from_json(threat.get("severity"));

        info!(origin = %task.origin(), severity, "processing threat alert: {}", description);
        self.escalate(severity, ctx).map(|_| ())
    }

    fn on_update_whitelist(&mut self, task: &Task, _ctx: &mut Ctx<'_>) -> Result<()> {
        let entries = task
            .field("entries")
            .cloned()
            .ok_or_else(|| EngineError::task("update_whitelist is missing 'entries'"))?;
        let entries: Whitelist = serde_json::from_value(entries)?;
        self.detector.update_whitelist(entries);
        Ok(())
    }

    fn on_lockdown(&mut self, task: &Task, ctx: &mut Ctx<'_>) -> Result<()> {
        info!(origin = %task.origin(), "lockdown requested");

        let activated = self.engine.lockdown();
        if activated.is_empty() {
            return Ok(());
        }
        self.actuate(&activated);
        self.status.publish(&self.engine);
        self.notify_lockdown(ctx)
    }

    /// A forged or corrupted task counts as a minor threat
    fn on_decryption_failed(&mut self, task: &Task, ctx: &mut Ctx<'_>) -> Result<()> {
        warn!(
            origin = %task.origin(),
            original_type = ?task.field("original_type"),
            "rejected undecryptable task"
        );
        self.escalate(1, ctx).map(|_| ())
    }
}

impl Agent for Sentinel {
    type Job = MonitorCategory;

    fn handlers() -> HandlerTable<Self> {
        HandlerTable::new()
            .on(SECURITY_SCAN, Self::on_security_scan)
            .on(THREAT_ALERT, Self::on_threat_alert)
            .on(UPDATE_WHITELIST, Self::on_update_whitelist)
            .on(LOCKDOWN, Self::on_lockdown)
            .on(DECRYPTION_FAILED, Self::on_decryption_failed)
    }

    fn on_start(&mut self, ctx: &mut Ctx<'_>) -> Result<()> {
        self.engine.install(ctx.scheduler());
        self.status.publish(&self.engine);
        info!(
            level = self.engine.level(),
            intervals = ?self.engine.monitoring_intervals(),
            "sentinel monitoring started"
        );
        Ok(())
    }

    fn run_job(&mut self, category: &MonitorCategory, ctx: &mut Ctx<'_>) -> Result<()> {
        let snapshot = self.probe.snapshot(*category)?;
        match self.detector.inspect(&snapshot, self.engine.level()) {
            Some(anomaly) => self.handle_anomaly(anomaly, ctx),
            None => Ok(()),
        }
    }

    fn on_drain(&mut self) -> Result<()> {
        for measure in self.engine.deactivate_all() {
            if let Err(e) = self.actuator.release(measure) {
                error!(%measure, "failed to release countermeasure: {}", e);
            }
        }
        self.status.publish(&self.engine);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::dispatch::testing::RecordingRouter;
    use crate::runtime::scheduler::Scheduler;
    use crate::security::monitoring::{Connection, Snapshot, ESTABLISHED};
    use crate::utils::errors::EngineError;

    /// Probe that reports one unauthorized connection per network pass
    struct HostileNetwork;

    impl MonitoringProbe for HostileNetwork {
        fn snapshot(&mut self, category: MonitorCategory) -> Result<Snapshot> {
            Ok(match category {
                MonitorCategory::Network => Snapshot::Network(vec![Connection {
                    local: "10.0.0.2:50000".into(),
                    remote: Some("203.0.113.9:4444".into()),
                    pid: None,
                    status: ESTABLISHED.into(),
                }]),
                other => Snapshot::empty(other),
            })
        }
    }

    struct BrokenProbe;

    impl MonitoringProbe for BrokenProbe {
        fn snapshot(&mut self, _category: MonitorCategory) -> Result<Snapshot> {
            Err(EngineError::ProbeFailed("sensor offline".into()))
        }
    }

    fn sentinel() -> Sentinel {
        Sentinel::new(&ThreatSettings::default(), "commander")
    }

    fn threat(severity: Value) -> Task {
        Task::new(
            THREAT_ALERT,
            "warden",
            json!({"threat": {"description": "test", "severity": severity}}),
        )
    }

    fn run(
        sentinel: &mut Sentinel,
        router: &RecordingRouter,
        scheduler: &mut Scheduler<MonitorCategory>,
        task: &Task,
    ) -> Result<()> {
        let handler = Sentinel::handlers()
            .get(task.task_type())
            .ok_or_else(|| EngineError::task("no handler"))?;
        let mut ctx = AgentContext::new("sentinel", None, Some(router), None, scheduler);
        handler(sentinel, task, &mut ctx)
    }

    #[test]
    fn test_handles_expected_task_types() {
        assert_eq!(
            Sentinel::handlers().task_types(),
            vec![DECRYPTION_FAILED, LOCKDOWN, SECURITY_SCAN, THREAT_ALERT, UPDATE_WHITELIST]
        );
    }

    #[test]
    fn test_critical_threat_alert_locks_down() {
        let mut sentinel = sentinel();
        let status = sentinel.status();
        let router = RecordingRouter::default();
        let mut scheduler = Scheduler::new();

        run(&mut sentinel, &router, &mut scheduler, &threat(json!(9))).unwrap();

        assert_eq!(status.level(), 9);
        assert!(status.is_active(Countermeasure::Lockdown));
        assert_eq!(scheduler.len(), 4);

        let sent = router.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "commander");
        assert_eq!(sent[0].1.task_type(), LOCKDOWN_ACTIVATED);

        // Lockdown already active: no second notification
        run(&mut sentinel, &router, &mut scheduler, &threat(json!(1))).unwrap();
        assert!(router.take().is_empty());
    }

    #[test]
    fn test_non_numeric_severity_is_ignored() {
        let mut sentinel = sentinel();
        let router = RecordingRouter::default();
        let mut scheduler = Scheduler::new();

        run(&mut sentinel, &router, &mut scheduler, &threat(json!("critical"))).unwrap();
        assert_eq!(sentinel.engine().level(), 0);
    }

    #[test]
    fn test_explicit_lockdown_is_idempotent() {
        let mut sentinel = sentinel();
        let router = RecordingRouter::default();
        let mut scheduler = Scheduler::new();
        let task = Task::new(LOCKDOWN, "commander", json!({}));

        run(&mut sentinel, &router, &mut scheduler, &task).unwrap();
        run(&mut sentinel, &router, &mut scheduler, &task).unwrap();

        let sent = router.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.task_type(), LOCKDOWN_ACTIVATED);
        assert_eq!(sentinel.engine().level(), 0);
    }

    #[test]
    fn test_network_job_raises_alert() {
        let mut sentinel = sentinel().with_probe(HostileNetwork);
        let router = RecordingRouter::default();
        let mut scheduler = Scheduler::new();
        let mut ctx = AgentContext::new("sentinel", None, Some(&router), None, &mut scheduler);

        sentinel.run_job(&MonitorCategory::Network, &mut ctx).unwrap();
        assert_eq!(sentinel.engine().level(), 1);

        let sent = router.take();
        assert_eq!(sent.len(), 1);
        let alert = sent[0].1.open(None).unwrap();
        assert_eq!(alert.task_type(), SECURITY_ALERT);
        assert_eq!(alert.str_field("category").unwrap(), "network");
        assert_eq!(alert.field("threat_level").unwrap(), 1);
    }

    #[test]
    fn test_probe_failure_surfaces_as_job_error() {
        let mut sentinel = sentinel().with_probe(BrokenProbe);
        let router = RecordingRouter::default();
        let mut scheduler = Scheduler::new();
        let mut ctx = AgentContext::new("sentinel", None, Some(&router), None, &mut scheduler);

        let err = sentinel.run_job(&MonitorCategory::Process, &mut ctx).unwrap_err();
        assert!(matches!(err, EngineError::ProbeFailed(_)));
        assert_eq!(sentinel.engine().level(), 0);
    }

    #[test]
    fn test_security_scan_reports_to_commander() {
        let mut sentinel = sentinel().with_probe(HostileNetwork);
        let router = RecordingRouter::default();
        let mut scheduler = Scheduler::new();

        let task = Task::new(SECURITY_SCAN, "commander", json!({"scope": "full"}));
        run(&mut sentinel, &router, &mut scheduler, &task).unwrap();

        let sent = router.take();
        let report = sent
            .iter()
            .find(|(_, envelope)| envelope.task_type() == SECURITY_SCAN_REPORT)
            .unwrap()
            .1
            .open(None)
            .unwrap();
        let results = report.field("scan_results").unwrap();
        assert_eq!(results["network"]["threats"].as_array().unwrap().len(), 1);
        // One network threat of weight 3 scores 0.3, which rounds to no change
        assert_eq!(report.field("threat_level").unwrap(), 0);
    }

    #[test]
    fn test_update_whitelist_silences_connection() {
        let mut sentinel = sentinel().with_probe(HostileNetwork);
        let router = RecordingRouter::default();
        let mut scheduler = Scheduler::new();

        let task = Task::new(
            UPDATE_WHITELIST,
            "commander",
            json!({"entries": {"connections": [{"ip": "203.0.113.9", "description": "partner"}]}}),
        );
        run(&mut sentinel, &router, &mut scheduler, &task).unwrap();

        let mut ctx = AgentContext::new("sentinel", None, Some(&router), None, &mut scheduler);
        sentinel.run_job(&MonitorCategory::Network, &mut ctx).unwrap();
        assert!(router.take().is_empty());
    }

    #[test]
    fn test_drain_releases_countermeasures() {
        let mut sentinel = sentinel();
        let status = sentinel.status();
        let router = RecordingRouter::default();
        let mut scheduler = Scheduler::new();

        run(&mut sentinel, &router, &mut scheduler, &threat(json!(10))).unwrap();
        assert!(!status.snapshot().active.is_empty());

        sentinel.on_drain().unwrap();
        assert!(status.snapshot().active.is_empty());
        assert_eq!(status.level(), 10);
    }
}
