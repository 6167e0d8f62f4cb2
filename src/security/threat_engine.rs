// src/security/threat_engine.rs
//! Threat escalation engine
//!
//! Holds the sentinel's threat level (0-10), the set of active
//! countermeasures and the monitoring cadence derived from the level.
//!
//! A level change rewrites the hosting agent's scheduler: every monitoring
//! job is cleared and re-registered at the new interval, so the jobs that
//! raise the level also control how quickly it can rise again.

use crate::runtime::scheduler::Scheduler;
use crate::utils::config::ThreatSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Highest threat level
pub const MAX_THREAT_LEVEL: u8 = 10;

/// Level at which the full lockdown set is activated
pub const LOCKDOWN_THRESHOLD: u8 = 8;

/// Level at which the reduced measure set is activated
pub const ELEVATED_THRESHOLD: u8 = 4;

/// Monitoring category, one scheduler job each
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorCategory {
    Network,
    Process,
    Performance,
    Integrity,
}

impl MonitorCategory {
    pub const ALL: [MonitorCategory; 4] = [
        MonitorCategory::Network,
        MonitorCategory::Process,
        MonitorCategory::Performance,
        MonitorCategory::Integrity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorCategory::Network => "network",
            MonitorCategory::Process => "process",
            MonitorCategory::Performance => "performance",
            MonitorCategory::Integrity => "integrity",
        }
    }
}

impl fmt::Display for MonitorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security countermeasure tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Countermeasure {
    /// Marker recording that the lockdown protocol ran
    Lockdown,
    IsolateNetwork,
    SuspendNonCritical,
    FreezeAssets,
    EnableLogging,
    BackupCritical,
    EnhancedMonitoring,
    ProcessRestrictions,
}

impl Countermeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Countermeasure::Lockdown => "lockdown",
            Countermeasure::IsolateNetwork => "isolate_network",
            Countermeasure::SuspendNonCritical => "suspend_non_critical",
            Countermeasure::FreezeAssets => "freeze_assets",
            Countermeasure::EnableLogging => "enable_logging",
            Countermeasure::BackupCritical => "backup_critical",
            Countermeasure::EnhancedMonitoring => "enhanced_monitoring",
            Countermeasure::ProcessRestrictions => "process_restrictions",
        }
    }
}

impl fmt::Display for Countermeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Critical measures applied by the lockdown protocol
pub const LOCKDOWN_MEASURES: [Countermeasure; 5] = [
    Countermeasure::IsolateNetwork,
    Countermeasure::SuspendNonCritical,
    Countermeasure::FreezeAssets,
    Countermeasure::EnableLogging,
    Countermeasure::BackupCritical,
];

/// Reduced set for elevated threat levels
pub const ELEVATED_MEASURES: [Countermeasure; 2] = [
    Countermeasure::EnhancedMonitoring,
    Countermeasure::ProcessRestrictions,
];

/// Outcome of one `update`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatUpdate {
    pub previous: u8,
    pub level: u8,

    /// Measures that became active during this update, in activation order
    pub activated: Vec<Countermeasure>,

    /// The lockdown protocol ran during this update
    pub lockdown_triggered: bool,
}

impl ThreatUpdate {
    pub fn changed(&self) -> bool {
        self.previous != self.level
    }
}

/// Threat level state machine
#[derive(Debug, Clone)]
pub struct ThreatEngine {
    level: u8,
    active: BTreeSet<Countermeasure>,
    base_intervals: BTreeMap<MonitorCategory, Duration>,
    intervals: BTreeMap<MonitorCategory, Duration>,
}

impl ThreatEngine {
    /// Create an engine at level 0 with the configured base cadence
    pub fn new(settings: &ThreatSettings) -> Self {
        let base_intervals: BTreeMap<_, _> = [
            (MonitorCategory::Network, settings.network_secs),
            (MonitorCategory::Process, settings.process_secs),
            (MonitorCategory::Performance, settings.performance_secs),
            (MonitorCategory::Integrity, settings.integrity_secs),
        ]
        .into_iter()
        .map(|(category, secs)| (category, Duration::from_secs(secs)))
        .collect();

        let mut engine = Self {
            level: 0,
            active: BTreeSet::new(),
            intervals: base_intervals.clone(),
            base_intervals,
        };
        engine.recompute_intervals();
        engine
    }

    /// Register one monitoring job per category at the current cadence
    pub fn install(&self, scheduler: &mut Scheduler<MonitorCategory>) {
        for (category, interval) in &self.intervals {
            scheduler.register(*interval, *category);
        }
    }

    /// Apply a level delta, then the threshold policy
    ///
    /// The level saturates at both ends. When it changes, the monitoring
    /// schedule is rebuilt at the new cadence.
    pub fn update(&mut self, delta: i64, scheduler: &mut Scheduler<MonitorCategory>) -> ThreatUpdate {
        let previous = self.level;
        let level = i64::from(previous)
            .saturating_add(delta)
            .clamp(0, i64::from(MAX_THREAT_LEVEL)) as u8;

        if level != previous {
            self.level = level;
            self.recompute_intervals();
            scheduler.clear();
            self.install(scheduler);

            info!(previous, level, "threat level changed");
            metrics::gauge!("sentinel_threat_level").set(f64::from(level));
        }

        let (activated, lockdown_triggered) = if level >= LOCKDOWN_THRESHOLD {
            let activated = self.lockdown();
            let triggered = !activated.is_empty();
            (activated, triggered)
        } else if level >= ELEVATED_THRESHOLD {
            (self.activate(&ELEVATED_MEASURES), false)
        } else {
            (Vec::new(), false)
        };

        ThreatUpdate {
            previous,
            level,
            activated,
            lockdown_triggered,
        }
    }

    /// Run the lockdown protocol, returning the newly activated measures
    ///
    /// A no-op once the lockdown marker is active.
    pub fn lockdown(&mut self) -> Vec<Countermeasure> {
        if self.active.contains(&Countermeasure::Lockdown) {
            debug!("lockdown already active");
            return Vec::new();
        }

        warn!(level = self.level, "activating lockdown protocol");
        let mut activated = self.activate(&LOCKDOWN_MEASURES);
        self.active.insert(Countermeasure::Lockdown);
        activated.push(Countermeasure::Lockdown);
        activated
    }

    /// Add measures to the active set, returning those not already active
    pub fn activate(&mut self, measures: &[Countermeasure]) -> Vec<Countermeasure> {
        let activated: Vec<_> = measures
            .iter()
            .copied()
            .filter(|measure| self.active.insert(*measure))
            .collect();

        if !activated.is_empty() {
            info!(?activated, "activated countermeasures");
        }
        activated
    }

    /// Clear every active measure, returning what was active
    pub fn deactivate_all(&mut self) -> Vec<Countermeasure> {
        let released: Vec<_> = std::mem::take(&mut self.active).into_iter().collect();
        if !released.is_empty() {
            info!(?released, "deactivated countermeasures");
        }
        released
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn active_countermeasures(&self) -> &BTreeSet<Countermeasure> {
        &self.active
    }

    pub fn is_active(&self, measure: Countermeasure) -> bool {
        self.active.contains(&measure)
    }

    pub fn monitoring_intervals(&self) -> &BTreeMap<MonitorCategory, Duration> {
        &self.intervals
    }

    pub fn monitoring_interval(&self, category: MonitorCategory) -> Option<Duration> {
        self.intervals.get(&category).copied()
    }

    fn recompute_intervals(&mut self) {
        self.intervals = self
            .base_intervals
            .iter()
            .map(|(category, base)| (*category, scaled_interval(*base, self.level)))
            .collect();
        debug!(intervals = ?self.intervals, "monitoring cadence updated");
    }
}

/// `max(1, trunc(base * max(0.1, 1 - level * 0.05)))` seconds
pub fn scaled_interval(base: Duration, level: u8) -> Duration {
    let multiplier = (1.0 - f64::from(level) * 0.05).max(0.1);
    let secs = (base.as_secs_f64() * multiplier).trunc().max(1.0);
    Duration::from_secs(secs as u64)
}

/// Read a severity score out of a JSON field
///
/// Absent means 1. Non-numeric values are logged and count as 0; fractional
/// scores are rounded.
pub fn severity_from_json(value: Option<&Value>) -> i64 {
    match value {
        None => 1,
        Some(Value::Number(number)) => match number.as_i64() {
            Some(severity) => severity,
            None => number.as_f64().map(round_severity).unwrap_or(0),
        },
        Some(other) => {
            warn!(severity = %other, "non-numeric threat severity, treating as 0");
            0
        }
    }
}

/// Round a fractional score to a level delta
pub fn round_severity(score: f64) -> i64 {
    if score.is_finite() {
        score.round() as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn engine() -> (ThreatEngine, Scheduler<MonitorCategory>) {
        let engine = ThreatEngine::new(&ThreatSettings::default());
        let mut scheduler = Scheduler::new();
        engine.install(&mut scheduler);
        (engine, scheduler)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_initial_state() {
        let (engine, scheduler) = engine();
        assert_eq!(engine.level(), 0);
        assert!(engine.active_countermeasures().is_empty());
        assert_eq!(scheduler.len(), 4);
        assert_eq!(engine.monitoring_interval(MonitorCategory::Network), Some(secs(5)));
        assert_eq!(engine.monitoring_interval(MonitorCategory::Integrity), Some(secs(30)));
    }

    #[test]
    fn test_large_delta_clamps_and_locks_down_once() {
        let (mut engine, mut scheduler) = engine();

        let update = engine.update(12, &mut scheduler);
        assert_eq!(update.previous, 0);
        assert_eq!(update.level, MAX_THREAT_LEVEL);
        assert!(update.lockdown_triggered);
        assert_eq!(update.activated.len(), LOCKDOWN_MEASURES.len() + 1);
        assert!(engine.is_active(Countermeasure::Lockdown));
        for measure in LOCKDOWN_MEASURES {
            assert!(engine.is_active(measure));
        }

        // Still at 10: no second lockdown
        let update = engine.update(5, &mut scheduler);
        assert!(!update.changed());
        assert!(!update.lockdown_triggered);
        assert!(update.activated.is_empty());
    }

    #[test]
    fn test_drop_to_zero_keeps_countermeasures() {
        let (mut engine, mut scheduler) = engine();
        engine.update(10, &mut scheduler);
        let before = engine.active_countermeasures().clone();

        let update = engine.update(-100, &mut scheduler);
        assert_eq!(update.level, 0);
        assert!(update.activated.is_empty());
        assert_eq!(engine.active_countermeasures(), &before);
    }

    #[test]
    fn test_elevated_measures() {
        let (mut engine, mut scheduler) = engine();

        let update = engine.update(5, &mut scheduler);
        assert_eq!(update.activated, ELEVATED_MEASURES.to_vec());
        assert!(!engine.is_active(Countermeasure::Lockdown));

        // Already active: nothing new
        let update = engine.update(1, &mut scheduler);
        assert!(update.activated.is_empty());
    }

    #[test]
    fn test_below_elevated_activates_nothing() {
        let (mut engine, mut scheduler) = engine();
        let update = engine.update(3, &mut scheduler);
        assert!(update.changed());
        assert!(update.activated.is_empty());
        assert!(engine.active_countermeasures().is_empty());
    }

    #[test]
    fn test_level_change_rebuilds_schedule() {
        let (mut engine, mut scheduler) = engine();
        engine.update(10, &mut scheduler);

        assert_eq!(scheduler.len(), 4);
        let mut intervals: Vec<_> = scheduler.jobs().iter().map(|job| (job.job, job.interval)).collect();
        intervals.sort();
        assert_eq!(
            intervals,
            vec![
                (MonitorCategory::Network, secs(2)),
                (MonitorCategory::Process, secs(5)),
                (MonitorCategory::Performance, secs(7)),
                (MonitorCategory::Integrity, secs(15)),
            ]
        );
    }

    #[test]
    fn test_unchanged_level_keeps_schedule() {
        let (mut engine, mut scheduler) = engine();
        let ids: Vec<_> = scheduler.jobs().iter().map(|job| job.id).collect();

        engine.update(0, &mut scheduler);
        let after: Vec<_> = scheduler.jobs().iter().map(|job| job.id).collect();
        assert_eq!(ids, after);
    }

    #[test]
    fn test_lockdown_is_idempotent() {
        let (mut engine, _) = engine();
        assert_eq!(engine.lockdown().len(), 6);
        assert!(engine.lockdown().is_empty());
        assert_eq!(engine.active_countermeasures().len(), 6);
    }

    #[test]
    fn test_lockdown_reports_only_new_measures() {
        let (mut engine, _) = engine();
        engine.activate(&[Countermeasure::IsolateNetwork]);

        let activated = engine.lockdown();
        assert!(!activated.contains(&Countermeasure::IsolateNetwork));
        assert_eq!(activated.len(), 5);
    }

    #[test]
    fn test_deactivate_all() {
        let (mut engine, _) = engine();
        engine.lockdown();
        assert_eq!(engine.deactivate_all().len(), 6);
        assert!(engine.active_countermeasures().is_empty());
        assert!(engine.deactivate_all().is_empty());
    }

    #[test]
    fn test_scaled_interval_floor() {
        assert_eq!(scaled_interval(secs(1), 10), secs(1));
        assert_eq!(scaled_interval(secs(5), 0), secs(5));
        assert_eq!(scaled_interval(secs(30), 10), secs(15));
    }

    #[test]
    fn test_severity_from_json() {
        assert_eq!(severity_from_json(None), 1);
        assert_eq!(severity_from_json(Some(&json!(8))), 8);
        assert_eq!(severity_from_json(Some(&json!(-3))), -3);
        assert_eq!(severity_from_json(Some(&json!(2.6))), 3);
        assert_eq!(severity_from_json(Some(&json!("high"))), 0);
        assert_eq!(severity_from_json(Some(&json!(null))), 0);
    }

    #[test]
    fn test_countermeasure_serialization() {
        assert_eq!(
            serde_json::to_value(Countermeasure::SuspendNonCritical).unwrap(),
            json!("suspend_non_critical")
        );
        assert_eq!(Countermeasure::BackupCritical.to_string(), "backup_critical");
    }

    proptest! {
        #[test]
        fn prop_level_stays_in_range(deltas in prop::collection::vec(any::<i64>(), 0..50)) {
            let (mut engine, mut scheduler) = engine();
            for delta in deltas {
                let update = engine.update(delta, &mut scheduler);
                prop_assert!(update.level <= MAX_THREAT_LEVEL);
                prop_assert_eq!(update.level, engine.level());
                prop_assert_eq!(scheduler.len(), 4);
            }
        }
    }
}
