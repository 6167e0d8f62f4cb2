// src/security/monitoring.rs
//! Host monitoring: probes, snapshots and anomaly detection
//!
//! Probes are the external seam: they gather a [`Snapshot`] for one
//! [`MonitorCategory`]. The [`Detector`] turns snapshots into anomalies
//! (periodic monitoring) or into a [`ScanReport`] (on-demand full scan).

use crate::security::threat_engine::MonitorCategory;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Status string of an established connection
pub const ESTABLISHED: &str = "ESTABLISHED";

/// An inet connection observed on the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// `ip:port`
    pub local: String,

    /// `ip:port`, absent for listening or local-only sockets
    pub remote: Option<String>,

    pub pid: Option<u32>,
    pub status: String,
}

impl Connection {
    /// Remote address without its port
    pub fn remote_ip(&self) -> Option<&str> {
        let remote = self.remote.as_deref()?;
        let host = remote.rsplit_once(':').map_or(remote, |(host, _)| host);
        Some(host.trim_start_matches('[').trim_end_matches(']'))
    }
}

/// A running process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub exe: Option<String>,

    #[serde(default)]
    pub cmdline: Vec<String>,
}

/// Host resource usage, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
}

/// Data returned by a probe for one category
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Network(Vec<Connection>),
    Process(Vec<ProcessInfo>),
    Performance(PerformanceSample),

    /// Path → SHA-256 hex, `None` when the file is missing
    Integrity(BTreeMap<String, Option<String>>),
}

impl Snapshot {
    pub fn category(&self) -> MonitorCategory {
        match self {
            Snapshot::Network(_) => MonitorCategory::Network,
            Snapshot::Process(_) => MonitorCategory::Process,
            Snapshot::Performance(_) => MonitorCategory::Performance,
            Snapshot::Integrity(_) => MonitorCategory::Integrity,
        }
    }

    /// Empty observation for a category
    pub fn empty(category: MonitorCategory) -> Self {
        match category {
            MonitorCategory::Network => Snapshot::Network(Vec::new()),
            MonitorCategory::Process => Snapshot::Process(Vec::new()),
            MonitorCategory::Performance => Snapshot::Performance(PerformanceSample::default()),
            MonitorCategory::Integrity => Snapshot::Integrity(BTreeMap::new()),
        }
    }
}

/// Source of host observations
pub trait MonitoringProbe: Send {
    fn snapshot(&mut self, category: MonitorCategory) -> Result<Snapshot>;
}

/// Probe that observes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct QuietProbe;

impl MonitoringProbe for QuietProbe {
    fn snapshot(&mut self, category: MonitorCategory) -> Result<Snapshot> {
        Ok(Snapshot::empty(category))
    }
}

/// Hashes a fixed list of critical files for the integrity category
///
/// Other categories are reported empty.
#[derive(Debug, Clone, Default)]
pub struct FileIntegrityProbe {
    paths: Vec<PathBuf>,
}

impl FileIntegrityProbe {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    fn hash_file(path: &Path) -> Result<Option<String>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 4096];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(Some(hex::encode(hasher.finalize())))
    }
}

impl MonitoringProbe for FileIntegrityProbe {
    fn snapshot(&mut self, category: MonitorCategory) -> Result<Snapshot> {
        if category != MonitorCategory::Integrity {
            return Ok(Snapshot::empty(category));
        }

        let mut hashes = BTreeMap::new();
        for path in &self.paths {
            let hash = Self::hash_file(path).map_err(|e| {
                EngineError::ProbeFailed(format!("cannot hash {}: {}", path.display(), e))
            })?;
            hashes.insert(path.display().to_string(), hash);
        }
        Ok(Snapshot::Integrity(hashes))
    }
}

/// Authorized remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedConnection {
    pub ip: String,

    #[serde(default)]
    pub description: String,
}

/// Authorized process, matched by name substring or executable path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedProcess {
    pub name: String,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub description: String,
}

/// Authorized connections and processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitelist {
    #[serde(default)]
    pub connections: Vec<AllowedConnection>,

    #[serde(default)]
    pub processes: Vec<AllowedProcess>,
}

impl Default for Whitelist {
    fn default() -> Self {
        Self {
            connections: vec![AllowedConnection {
                ip: "127.0.0.1".into(),
                description: "localhost".into(),
            }],
            processes: ["python", "chrome", "svchost"]
                .into_iter()
                .map(|name| AllowedProcess {
                    name: name.into(),
                    path: None,
                    description: String::new(),
                })
                .collect(),
        }
    }
}

/// Known-bad substrings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatSignatures {
    pub processes: Vec<String>,
    pub connections: Vec<String>,
}

impl Default for ThreatSignatures {
    fn default() -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            processes: owned(&[
                "keylogger", "ransom", "miner", "spyware", "rat", "trojan", "worm", "rootkit",
            ]),
            connections: owned(&["malicious.domain", "botnet.server", "tor.exit.node", "vpn.hacker"]),
        }
    }
}

/// Suspicious observation from one monitoring pass
#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    pub category: MonitorCategory,
    pub description: String,
    pub severity: f64,
}

/// One section of a full scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSection {
    pub threats: Vec<Value>,

    /// Weight of each threat in this section
    pub severity: u32,

    /// Items examined
    pub analyzed: usize,
}

/// Full-scan results keyed by section name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub sections: BTreeMap<String, ScanSection>,
}

impl ScanReport {
    /// `Σ(threats × severity) / 10`
    pub fn threat_score(&self) -> f64 {
        let weighted: u64 = self
            .sections
            .values()
            .map(|section| section.threats.len() as u64 * u64::from(section.severity))
            .sum();
        weighted as f64 / 10.0
    }

    pub fn threat_count(&self) -> usize {
        self.sections.values().map(|section| section.threats.len()).sum()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.sections).unwrap_or(Value::Null)
    }
}

/// Anomaly rules with their whitelist and baselines
#[derive(Debug, Clone, Default)]
pub struct Detector {
    whitelist: Whitelist,
    signatures: ThreatSignatures,

    /// Pids seen on the previous process pass
    process_baseline: Option<BTreeSet<u32>>,

    /// Hashes captured on the first integrity pass
    integrity_baseline: Option<BTreeMap<String, Option<String>>>,
}

impl Detector {
    pub fn new(whitelist: Whitelist, signatures: ThreatSignatures) -> Self {
        Self {
            whitelist,
            signatures,
            process_baseline: None,
            integrity_baseline: None,
        }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Append entries, returning how many were added
    pub fn update_whitelist(&mut self, entries: Whitelist) -> usize {
        let added = entries.connections.len() + entries.processes.len();
        self.whitelist.connections.extend(entries.connections);
        self.whitelist.processes.extend(entries.processes);
        info!(added, "whitelist updated");
        added
    }

    pub fn is_connection_authorized(&self, conn: &Connection) -> bool {
        match conn.remote_ip() {
            None => true,
            Some(ip) => self.whitelist.connections.iter().any(|allowed| allowed.ip == ip),
        }
    }

    pub fn is_process_whitelisted(&self, process: &ProcessInfo) -> bool {
        let name = process.name.to_lowercase();
        self.whitelist.processes.iter().any(|allowed| {
            name.contains(&allowed.name.to_lowercase())
                || matches!(
                    (&allowed.path, &process.exe),
                    (Some(path), Some(exe)) if exe.contains(path.as_str())
                )
        })
    }

    /// Periodic rule for one snapshot
    ///
    /// The first process and integrity observations only establish a
    /// baseline.
    pub fn inspect(&mut self, snapshot: &Snapshot, level: u8) -> Option<Anomaly> {
        match snapshot {
            Snapshot::Network(connections) => {
                let suspicious: Vec<_> = connections
                    .iter()
                    .filter(|conn| conn.status == ESTABLISHED && !self.is_connection_authorized(conn))
                    .filter_map(|conn| conn.remote.as_deref())
                    .collect();

                (!suspicious.is_empty()).then(|| Anomaly {
                    category: MonitorCategory::Network,
                    description: format!("suspicious network connections: {}", suspicious.join(", ")),
                    severity: suspicious.len() as f64,
                })
            }

            Snapshot::Process(processes) => {
                let current: BTreeSet<u32> = processes.iter().map(|p| p.pid).collect();
                let baseline = self.process_baseline.replace(current)?;

                let new: Vec<_> = processes
                    .iter()
                    .filter(|p| !baseline.contains(&p.pid) && !self.is_process_whitelisted(p))
                    .map(|p| format!("{} ({})", p.name, p.pid))
                    .collect();

                (!new.is_empty()).then(|| Anomaly {
                    category: MonitorCategory::Process,
                    description: format!("new processes detected: {}", new.join(", ")),
                    severity: 2.0 * new.len() as f64,
                })
            }

            Snapshot::Performance(sample) => {
                let cpu_limit = 80.0 + 2.0 * f64::from(level);
                let memory_limit = 85.0 + 2.0 * f64::from(level);

                let mut alerts = Vec::new();
                if sample.cpu > cpu_limit {
                    alerts.push(format!("high CPU usage: {}%", sample.cpu));
                }
                if sample.memory > memory_limit {
                    alerts.push(format!("high memory usage: {}%", sample.memory));
                }

                (!alerts.is_empty()).then(|| Anomaly {
                    category: MonitorCategory::Performance,
                    description: alerts.join(" | "),
                    severity: sample.cpu.max(sample.memory) / 10.0,
                })
            }

            Snapshot::Integrity(hashes) => {
                if self.integrity_baseline.is_none() {
                    debug!(files = hashes.len(), "integrity baseline established");
                    self.integrity_baseline = Some(hashes.clone());
                    return None;
                }
                let baseline = self.integrity_baseline.as_ref()?;

                let modified = modified_files(baseline, hashes);
                (!modified.is_empty()).then(|| Anomaly {
                    category: MonitorCategory::Integrity,
                    description: format!("critical files modified: {}", modified.join(", ")),
                    severity: 10.0,
                })
            }
        }
    }

    /// On-demand scan across every category
    pub fn full_scan(&self, snapshots: &[Snapshot]) -> ScanReport {
        let mut report = ScanReport::default();

        for snapshot in snapshots {
            let (name, section) = match snapshot {
                Snapshot::Network(connections) => ("network", self.scan_network(connections)),
                Snapshot::Process(processes) => ("processes", self.scan_processes(processes)),
                Snapshot::Integrity(hashes) => ("filesystem", self.scan_integrity(hashes)),
                Snapshot::Performance(sample) => ("performance", scan_performance(sample)),
            };
            report.sections.insert(name.to_string(), section);
        }
        report
    }

    fn scan_network(&self, connections: &[Connection]) -> ScanSection {
        let threats = connections
            .iter()
            .filter(|conn| conn.status == ESTABLISHED && !self.is_connection_authorized(conn))
            .map(|conn| {
                let remote = conn.remote.as_deref().unwrap_or_default();
                let known_bad = self
                    .signatures
                    .connections
                    .iter()
                    .any(|signature| remote.contains(signature.as_str()));
                json!({
                    "type": if known_bad { "malicious_connection" } else { "unauthorized_connection" },
                    "connection": conn,
                    "recommendation": "block",
                })
            })
            .collect();

        ScanSection {
            threats,
            severity: 3,
            analyzed: connections.len(),
        }
    }

    fn scan_processes(&self, processes: &[ProcessInfo]) -> ScanSection {
        let mut threats = Vec::new();
        for process in processes {
            let name = process.name.to_lowercase();
            for signature in &self.signatures.processes {
                let in_cmdline = process
                    .cmdline
                    .iter()
                    .any(|arg| arg.to_lowercase().contains(signature.as_str()));
                if name.contains(signature.as_str()) || in_cmdline {
                    threats.push(json!({
                        "type": "malicious_process",
                        "process": process,
                        "signature": signature,
                        "recommendation": "terminate",
                    }));
                }
            }
        }

        ScanSection {
            threats,
            severity: 4,
            analyzed: processes.len(),
        }
    }

    fn scan_integrity(&self, hashes: &BTreeMap<String, Option<String>>) -> ScanSection {
        let threats = match &self.integrity_baseline {
            Some(baseline) => modified_files(baseline, hashes)
                .into_iter()
                .map(|file| {
                    json!({
                        "type": "modified_file",
                        "file": file,
                        "recommendation": "restore",
                    })
                })
                .collect(),
            None => Vec::new(),
        };

        ScanSection {
            threats,
            severity: 5,
            analyzed: hashes.len(),
        }
    }
}

fn scan_performance(sample: &PerformanceSample) -> ScanSection {
    let threats = [("cpu", sample.cpu, 90.0), ("memory", sample.memory, 90.0), ("disk", sample.disk, 95.0)]
        .into_iter()
        .filter(|(_, usage, threshold)| usage > threshold)
        .map(|(metric, usage, threshold)| {
            json!({
                "type": "resource_exhaustion",
                "metric": metric,
                "usage": usage,
                "threshold": threshold,
                "recommendation": "investigate",
            })
        })
        .collect();

    ScanSection {
        threats,
        severity: 2,
        analyzed: 3,
    }
}

fn modified_files<'a>(
    baseline: &'a BTreeMap<String, Option<String>>,
    current: &BTreeMap<String, Option<String>>,
) -> Vec<&'a str> {
    baseline
        .iter()
        .filter(|(path, hash)| current.get(*path).cloned().flatten() != **hash)
        .map(|(path, _)| path.as_str())
        .collect()
}
