// src/runtime/registry.rs
//! Agent registry
//!
//! Maps agent identifiers to running agents. Registration validates the
//! agent's security capabilities; lookups and registration only take the
//! registry's own lock and never wait on agent work.

use crate::messaging::envelope::Envelope;
use crate::runtime::agent_runtime::AgentRuntime;
use crate::runtime::dispatch::MessageRouter;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Security capability required for registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Can seal and open envelope payloads
    EncryptDecrypt,

    /// Can deliver envelopes to other agents
    SecureExchange,

    /// Can escalate anomalies to a sentinel
    ThreatMonitor,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::EncryptDecrypt,
        Capability::SecureExchange,
        Capability::ThreatMonitor,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::EncryptDecrypt => "can_encrypt_decrypt",
            Capability::SecureExchange => "can_secure_exchange",
            Capability::ThreatMonitor => "can_threat_monitor",
        };
        f.write_str(name)
    }
}

/// Capabilities an agent exposes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn all() -> Self {
        Self(Capability::ALL.into_iter().collect())
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0.insert(capability);
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Required capabilities this set lacks, in declaration order
    pub fn missing(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|capability| !self.contains(*capability))
            .collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Anything the registry can host
#[async_trait]
pub trait ManagedAgent: Send + Sync {
    fn id(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    /// Queue an envelope for this agent
    fn receive(&self, envelope: Envelope) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;
}

#[async_trait]
impl ManagedAgent for AgentRuntime {
    fn id(&self) -> &str {
        AgentRuntime::id(self)
    }

    fn capabilities(&self) -> CapabilitySet {
        AgentRuntime::capabilities(self).clone()
    }

    fn receive(&self, envelope: Envelope) -> Result<()> {
        AgentRuntime::receive(self, envelope)
    }

    async fn shutdown(&self) -> Result<()> {
        AgentRuntime::shutdown(self).await
    }
}

/// Identifier → agent map
#[derive(Default)]
pub struct Registry {
    agents: Mutex<HashMap<String, Arc<dyn ManagedAgent>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent after validating its capabilities
    ///
    /// Fails with `SecurityValidation` naming every missing capability, or
    /// with `DuplicateAgent` when the identifier is taken. Nothing is
    /// recorded on failure.
    pub fn register(&self, agent: Arc<dyn ManagedAgent>) -> Result<()> {
        let id = agent.id().to_string();

        let missing = agent.capabilities().missing();
        if !missing.is_empty() {
            error!(agent = %id, ?missing, "agent failed security validation");
            return Err(EngineError::SecurityValidation { id, missing });
        }

        let mut agents = self.agents.lock();
        if agents.contains_key(&id) {
            return Err(EngineError::DuplicateAgent(id));
        }
        agents.insert(id.clone(), agent);
        info!(agent = %id, "registered agent");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn ManagedAgent>> {
        self.agents
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.lock().contains_key(id)
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.agents.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.lock().is_empty()
    }

    /// Shut every agent down concurrently and empty the registry
    ///
    /// Best effort: one agent failing to stop does not prevent the others.
    pub async fn secure_shutdown(&self) {
        let agents: Vec<_> = self.agents.lock().drain().map(|(_, agent)| agent).collect();
        info!("shutting down {} agents", agents.len());

        let results = join_all(agents.iter().map(|agent| agent.shutdown())).await;
        for (agent, result) in agents.iter().zip(results) {
            match result {
                Ok(()) => debug!(agent = %agent.id(), "agent shut down"),
                Err(e) => error!(agent = %agent.id(), "agent shutdown failed: {}", e),
            }
        }
    }
}

impl MessageRouter for Registry {
    fn route(&self, recipient: &str, envelope: Envelope) -> Result<()> {
        self.get(recipient)?.receive(envelope)
    }
}
