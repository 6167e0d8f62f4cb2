// src/main.rs
//! Agent Team Engine
//!
//! Boots the commander, warden and sentinel on one registry, launches a
//! demo campaign and runs until Ctrl-C.

use agent_team_engine::agents::task_types::LAUNCH_CAMPAIGN;
use agent_team_engine::agents::{Commander, Sentinel, Warden, COMMANDER_ID, SENTINEL_ID, WARDEN_ID};
use agent_team_engine::messaging::{CryptoCodec, Envelope};
use agent_team_engine::observability::{init_metrics, init_tracing};
use agent_team_engine::runtime::{
    Agent, AgentRuntime, MessageRouter, Registry, RuntimeConfig, ThreatMonitorLink,
};
use agent_team_engine::utils::config::EngineConfig;
use agent_team_engine::BuildInfo;
use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

fn spawn_agent<A: Agent>(
    id: &str,
    agent: A,
    codec: &Arc<CryptoCodec>,
    registry: &Arc<Registry>,
    config: &RuntimeConfig,
) -> AgentRuntime {
    AgentRuntime::builder(id, agent)
        .codec(Arc::clone(codec))
        .router(Arc::clone(registry) as Arc<dyn MessageRouter>)
        .threat_monitor(ThreatMonitorLink::new(SENTINEL_ID))
        .config(config.clone())
        .spawn()
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::load().context("failed to load configuration")?;

    init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    let build = BuildInfo::current();
    info!(
        version = build.version,
        git = build.git_hash,
        "Starting Agent Team Engine"
    );

    let codec = Arc::new(match &config.security.encryption_key {
        Some(key) => CryptoCodec::from_base64(key).context("invalid security.encryption_key")?,
        None => {
            warn!("no encryption key configured, using an ephemeral key");
            CryptoCodec::generate()
        }
    });

    let registry = Arc::new(Registry::new());
    let runtime_config = RuntimeConfig::from(&config.runtime);

    let commander = Commander::with_report_capacity(config.commander.report_capacity);
    let command_log = commander.log();
    let sentinel = Sentinel::new(&config.threat, COMMANDER_ID);
    let threat_status = sentinel.status();
    let warden = Warden::new(config.analytics.clone(), COMMANDER_ID);

    let runtimes = [
        spawn_agent(COMMANDER_ID, commander, &codec, &registry, &runtime_config),
        spawn_agent(SENTINEL_ID, sentinel, &codec, &registry, &runtime_config),
        spawn_agent(WARDEN_ID, warden, &codec, &registry, &runtime_config),
    ];
    for runtime in runtimes {
        registry.register(Arc::new(runtime))?;
    }
    info!(agents = ?registry.ids(), "team online");

    let brief = json!({
        "product": "Smart Water Bottle",
        "target_demo": "Gen Z fitness enthusiasts",
        "budget": 5000,
        "channels": ["social", "influencer"],
    });
    let launch = Envelope::sealed(&codec, LAUNCH_CAMPAIGN, "operator", &brief)?;
    registry.route(COMMANDER_ID, launch)?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("Received shutdown signal, cleaning up...");

    registry.secure_shutdown().await;

    let threat = threat_status.snapshot();
    info!(
        threat_level = threat.level,
        countermeasures = threat.active.len(),
        campaigns = command_log.campaign_ids().len(),
        reports = command_log.reports().len(),
        "shutdown complete"
    );
    Ok(())
}
