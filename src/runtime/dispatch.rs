// src/runtime/dispatch.rs
//! Task dispatch: agent behaviour, handler tables, and the handler context
//!
//! Each agent type declares the task types it understands in a
//! [`HandlerTable`]. The worker looks handlers up by the envelope's `type`
//! tag; anything not in the table is logged and dropped.

use crate::messaging::codec::CryptoCodec;
use crate::messaging::envelope::{Envelope, Task};
use crate::runtime::scheduler::Scheduler;
use crate::utils::errors::{EngineError, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Task type used for threat escalation between agents
pub const THREAT_ALERT: &str = "threat_alert";

/// Handler for one task type
pub type Handler<A> = fn(&mut A, &Task, &mut AgentContext<'_, <A as Agent>::Job>) -> Result<()>;

/// Behaviour hosted by an agent runtime
///
/// The runtime's worker owns the agent value exclusively: handlers and jobs
/// never run concurrently with each other.
pub trait Agent: Send + 'static {
    /// Recurring job identifiers for this agent's scheduler
    type Job: Clone + fmt::Debug + Send + 'static;

    /// Dispatch table for the task types this agent supports
    fn handlers() -> HandlerTable<Self>
    where
        Self: Sized;

    /// Called once on the worker before the first dequeue
    fn on_start(&mut self, _ctx: &mut AgentContext<'_, Self::Job>) -> Result<()> {
        Ok(())
    }

    /// Run a scheduled job
    fn run_job(&mut self, job: &Self::Job, ctx: &mut AgentContext<'_, Self::Job>) -> Result<()>;

    /// Flush durable state; called while the runtime is draining
    fn on_drain(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Task type → handler map
pub struct HandlerTable<A: Agent> {
    handlers: HashMap<&'static str, Handler<A>>,
}

impl<A: Agent> HandlerTable<A> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Add a handler (builder style)
    pub fn on(mut self, task_type: &'static str, handler: Handler<A>) -> Self {
        self.handlers.insert(task_type, handler);
        self
    }

    pub fn get(&self, task_type: &str) -> Option<Handler<A>> {
        self.handlers.get(task_type).copied()
    }

    pub fn supports(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Supported task types, sorted
    pub fn task_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl<A: Agent> Default for HandlerTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-agent delivery seam
///
/// The registry implements this; transport beyond in-process delivery is an
/// external collaborator.
pub trait MessageRouter: Send + Sync {
    fn route(&self, recipient: &str, envelope: Envelope) -> Result<()>;
}

/// Link from an agent to the sentinel that receives its threat alerts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatMonitorLink {
    pub sentinel_id: String,
}

impl ThreatMonitorLink {
    pub fn new(sentinel_id: impl Into<String>) -> Self {
        Self {
            sentinel_id: sentinel_id.into(),
        }
    }
}

/// Everything a handler or job may touch besides its own agent state
pub struct AgentContext<'a, J> {
    agent_id: &'a str,
    codec: Option<&'a CryptoCodec>,
    router: Option<&'a dyn MessageRouter>,
    threat_link: Option<&'a ThreatMonitorLink>,
    scheduler: &'a mut Scheduler<J>,
}

impl<'a, J: Clone + fmt::Debug> AgentContext<'a, J> {
    pub fn new(
        agent_id: &'a str,
        codec: Option<&'a CryptoCodec>,
        router: Option<&'a dyn MessageRouter>,
        threat_link: Option<&'a ThreatMonitorLink>,
        scheduler: &'a mut Scheduler<J>,
    ) -> Self {
        Self {
            agent_id,
            codec,
            router,
            threat_link,
            scheduler,
        }
    }

    pub fn agent_id(&self) -> &str {
        self.agent_id
    }

    pub fn codec(&self) -> Option<&CryptoCodec> {
        self.codec
    }

    /// The owning agent's scheduler
    pub fn scheduler(&mut self) -> &mut Scheduler<J> {
        self.scheduler
    }

    /// Send a task to another agent, sealed when a codec is configured
    pub fn send(&self, recipient: &str, task_type: &str, content: Value) -> Result<()> {
        let router = self.router.ok_or_else(|| {
            EngineError::task(format!(
                "agent '{}' has no router, cannot send '{}'",
                self.agent_id, task_type
            ))
        })?;

        let envelope = match self.codec {
            Some(codec) => Envelope::sealed(codec, task_type, self.agent_id, &content)?,
            None => Envelope::plain(task_type, self.agent_id, &content),
        };

        router.route(recipient, envelope)?;
        debug!(agent = %self.agent_id, recipient, task_type, "sent task");
        Ok(())
    }

    /// Escalate an anomaly to the linked sentinel
    pub fn report_threat(&self, description: &str, severity: f64) -> Result<()> {
        let link = self.threat_link.ok_or_else(|| {
            EngineError::task(format!("agent '{}' has no threat monitor link", self.agent_id))
        })?;

        self.send(
            &link.sentinel_id,
            THREAT_ALERT,
            json!({
                "threat": {
                    "description": description,
                    "severity": severity,
                    "source": self.agent_id,
                }
            }),
        )
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingRouter;
    use super::*;

    struct Echo;

    impl Agent for Echo {
        type Job = ();

        fn handlers() -> HandlerTable<Self> {
            HandlerTable::<Self>::new()
                .on("ping", |_: &mut Echo, _: &Task, _| Ok(()))
                .on("echo", |_: &mut Echo, task: &Task, ctx: &mut AgentContext<'_, ()>| {
                    ctx.send(task.origin(), "echo_reply", task.content().clone())
                })
        }

        fn run_job(&mut self, _job: &(), _ctx: &mut AgentContext<'_, ()>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_handler_table() {
        let table = Echo::handlers();
        assert!(table.supports("ping"));
        assert!(!table.supports("pong"));
        assert!(table.get("echo").is_some());
        assert_eq!(table.task_types(), vec!["echo", "ping"]);
    }

    #[test]
    fn test_send_seals_with_codec() {
        let codec = CryptoCodec::generate();
        let router = RecordingRouter::default();
        let mut scheduler = Scheduler::new();
        let ctx: AgentContext<'_, ()> =
            AgentContext::new("echo", Some(&codec), Some(&router), None, &mut scheduler);

        ctx.send("commander", "status", json!({"ok": true})).unwrap();

        let delivered = router.take();
        assert_eq!(delivered.len(), 1);
        let (recipient, envelope) = &delivered[0];
        assert_eq!(recipient, "commander");
        assert!(envelope.is_encrypted());
        assert_eq!(envelope.origin(), "echo");
        assert_eq!(envelope.open(Some(&codec)).unwrap().field("ok").unwrap(), true);
    }

    #[test]
    fn test_send_without_router_fails() {
        let mut scheduler = Scheduler::new();
        let ctx: AgentContext<'_, ()> = AgentContext::new("lonely", None, None, None, &mut scheduler);
        assert!(ctx.send("anyone", "status", json!({})).is_err());
    }

    #[test]
    fn test_report_threat_targets_sentinel() {
        let router = RecordingRouter::default();
        let link = ThreatMonitorLink::new("sentinel");
        let mut scheduler = Scheduler::new();
        let ctx: AgentContext<'_, ()> =
            AgentContext::new("warden", None, Some(&router), Some(&link), &mut scheduler);

        ctx.report_threat("engagement collapse", 3.0).unwrap();

        let delivered = router.take();
        let (recipient, envelope) = &delivered[0];
        assert_eq!(recipient, "sentinel");
        assert_eq!(envelope.task_type(), THREAT_ALERT);

        let task = envelope.open(None).unwrap();
        assert_eq!(task.content()["threat"]["severity"], 3.0);
        assert_eq!(task.content()["threat"]["source"], "warden");
    }
}
