// tests/team_flow.rs
//! End-to-end flows across the full team on one registry

use agent_team_engine::agents::task_types::{
    CAMPAIGN_ALERT, LAUNCH_CAMPAIGN, LOCKDOWN_ACTIVATED, PERFORMANCE_REPORT, THREAT_ALERT,
};
use agent_team_engine::agents::{
    Campaign, CommandLog, Commander, Sentinel, ThreatStatus, Warden, COMMANDER_ID, SENTINEL_ID,
    WARDEN_ID,
};
use agent_team_engine::messaging::{CryptoCodec, Envelope};
use agent_team_engine::runtime::{
    Agent, AgentRuntime, Capability, MessageRouter, Registry, RuntimeConfig, ThreatMonitorLink,
};
use agent_team_engine::security::Countermeasure;
use agent_team_engine::utils::config::{AnalyticsSettings, ThreatSettings};
use agent_team_engine::EngineError;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

struct Team {
    codec: Arc<CryptoCodec>,
    registry: Arc<Registry>,
    log: CommandLog,
    threat: ThreatStatus,
}

fn config() -> RuntimeConfig {
    RuntimeConfig {
        dequeue_timeout: Duration::from_millis(10),
        join_timeout: Duration::from_secs(2),
    }
}

fn spawn<A: Agent>(id: &str, agent: A, codec: &Arc<CryptoCodec>, registry: &Arc<Registry>) -> AgentRuntime {
    AgentRuntime::builder(id, agent)
        .codec(Arc::clone(codec))
        .router(Arc::clone(registry) as Arc<dyn MessageRouter>)
        .threat_monitor(ThreatMonitorLink::new(SENTINEL_ID))
        .config(config())
        .spawn()
}

fn start_team(data_dir: &Path) -> Team {
    let codec = Arc::new(CryptoCodec::generate());
    let registry = Arc::new(Registry::new());

    let commander = Commander::new();
    let log = commander.log();
    let sentinel = Sentinel::new(&ThreatSettings::default(), COMMANDER_ID);
    let threat = sentinel.status();
    let warden = Warden::new(
        AnalyticsSettings {
            analysis_interval_secs: 1,
            data_dir: data_dir.to_path_buf(),
            ..AnalyticsSettings::default()
        },
        COMMANDER_ID,
    );

    for runtime in [
        spawn(COMMANDER_ID, commander, &codec, &registry),
        spawn(SENTINEL_ID, sentinel, &codec, &registry),
        spawn(WARDEN_ID, warden, &codec, &registry),
    ] {
        registry.register(Arc::new(runtime)).unwrap();
    }

    Team {
        codec,
        registry,
        log,
        threat,
    }
}

impl Team {
    fn send(&self, recipient: &str, task_type: &str, content: Value) {
        let envelope = Envelope::sealed(&self.codec, task_type, "operator", &content).unwrap();
        self.registry.route(recipient, envelope).unwrap();
    }
}

/// Poll until `check` holds or five seconds pass
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn test_campaign_launch_reaches_commander() {
    let dir = tempfile::tempdir().unwrap();
    let team = start_team(dir.path());

    team.send(
        COMMANDER_ID,
        LAUNCH_CAMPAIGN,
        json!({"product": "Smart Water Bottle", "target_demo": "Gen Z", "budget": 5000}),
    );

    let id = Campaign::new("Smart Water Bottle", "Gen Z").id(&team.codec);
    let log = team.log.clone();
    assert!(eventually(|| log.campaign(&id).is_some()).await);
    assert_eq!(log.campaign(&id).unwrap().details["budget"], 5000);

    team.registry.secure_shutdown().await;
    assert!(team.registry.is_empty());
}

#[tokio::test]
async fn test_severe_threat_locks_down_and_notifies_commander() {
    let dir = tempfile::tempdir().unwrap();
    let team = start_team(dir.path());

    team.send(
        SENTINEL_ID,
        THREAT_ALERT,
        json!({"threat": {"description": "credential stuffing", "severity": 9, "source": "warden"}}),
    );

    let log = team.log.clone();
    assert!(eventually(|| !log.reports_of(LOCKDOWN_ACTIVATED).is_empty()).await);

    let threat = team.threat.snapshot();
    assert_eq!(threat.level, 9);
    assert!(threat.active.contains(&Countermeasure::Lockdown));
    assert!(threat.active.contains(&Countermeasure::IsolateNetwork));

    let report = &log.reports_of(LOCKDOWN_ACTIVATED)[0];
    assert_eq!(report.origin, SENTINEL_ID);
    assert_eq!(report.content["threat_level"], 9);

    team.registry.secure_shutdown().await;

    // Countermeasures are released when the sentinel drains
    assert!(team.threat.snapshot().active.is_empty());
}

#[tokio::test]
async fn test_forged_envelope_escalates_threat_level() {
    let dir = tempfile::tempdir().unwrap();
    let team = start_team(dir.path());

    let intruder = CryptoCodec::generate();
    let forged = Envelope::sealed(
        &intruder,
        LAUNCH_CAMPAIGN,
        "intruder",
        &json!({"product": "x", "target_demo": "y"}),
    )
    .unwrap();
    team.registry.route(COMMANDER_ID, forged).unwrap();

    let threat = team.threat.clone();
    assert!(eventually(|| threat.level() == 1).await);
    assert!(team.log.campaign_ids().is_empty());

    team.registry.secure_shutdown().await;
}

#[tokio::test]
async fn test_warden_alerts_commander_and_flushes_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let team = start_team(dir.path());

    for rate in [0.03, 0.012, 0.005] {
        team.send(
            WARDEN_ID,
            PERFORMANCE_REPORT,
            json!({"campaign_id": "spring-launch", "metrics": {"engagement_rate": rate, "clicks": 40}}),
        );
    }

    let log = team.log.clone();
    assert!(eventually(|| !log.reports_of(CAMPAIGN_ALERT).is_empty()).await);

    let alert = &log.reports_of(CAMPAIGN_ALERT)[0];
    assert_eq!(alert.origin, WARDEN_ID);
    assert_eq!(alert.content["campaign_id"], "spring-launch");
    assert_eq!(alert.content["severity"], "critical");

    team.registry.secure_shutdown().await;

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("spring-launch_"));
    assert!(files[0].ends_with(".json"));
}

#[tokio::test]
async fn test_registry_rejects_agent_without_threat_link() {
    let codec = Arc::new(CryptoCodec::generate());
    let registry = Arc::new(Registry::new());

    let runtime = AgentRuntime::builder("rogue", Commander::new())
        .codec(Arc::clone(&codec))
        .router(Arc::clone(&registry) as Arc<dyn MessageRouter>)
        .config(config())
        .spawn();
    let runtime = Arc::new(runtime);

    match registry.register(runtime.clone()) {
        Err(EngineError::SecurityValidation { id, missing }) => {
            assert_eq!(id, "rogue");
            assert_eq!(missing, vec![Capability::ThreatMonitor]);
        }
        other => panic!("expected security validation failure, got {:?}", other),
    }
    assert!(!registry.contains("rogue"));

    runtime.shutdown().await.unwrap();
}
