// src/runtime/agent_runtime.rs
//! Agent runtime for lifecycle management
//!
//! Hosts one agent behind a task inbox and a dedicated worker task:
//! - Inbound envelopes are queued by any number of producers
//! - The worker decrypts, then dispatches by task type
//! - Idle periods tick the agent's scheduler
//! - Shutdown drains cooperatively with a bounded join
//!
//! # Lifecycle
//!
//! ```text
//! Starting ──spawn()──► Running ──shutdown()──► Draining ──join──► Stopped
//!                                                   │                 ▲
//!                                                   └──join timeout───┘
//! ```

use crate::messaging::codec::CryptoCodec;
use crate::messaging::envelope::{Envelope, Task, DECRYPTION_FAILED};
use crate::messaging::task_queue::{QueueStats, TaskQueue};
use crate::runtime::dispatch::{Agent, AgentContext, HandlerTable, MessageRouter, ThreatMonitorLink};
use crate::runtime::registry::{Capability, CapabilitySet};
use crate::runtime::scheduler::Scheduler;
use crate::utils::config::RuntimeSettings;
use crate::utils::errors::{EngineError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Runtime lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RuntimeState {
    Starting = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl RuntimeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RuntimeState::Starting,
            1 => RuntimeState::Running,
            2 => RuntimeState::Draining,
            _ => RuntimeState::Stopped,
        }
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeState::Starting => "starting",
            RuntimeState::Running => "running",
            RuntimeState::Draining => "draining",
            RuntimeState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Configuration for agent runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long the worker waits for a task before ticking the scheduler
    pub dequeue_timeout: Duration,

    /// Bound on the worker join during shutdown
    pub join_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout: Duration::from_millis(100),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&RuntimeSettings> for RuntimeConfig {
    fn from(settings: &RuntimeSettings) -> Self {
        Self {
            dequeue_timeout: settings.dequeue_timeout(),
            join_timeout: settings.join_timeout(),
        }
    }
}

/// Builder wiring an agent to its collaborators
pub struct RuntimeBuilder<A: Agent> {
    id: String,
    agent: A,
    codec: Option<Arc<CryptoCodec>>,
    router: Option<Arc<dyn MessageRouter>>,
    threat_link: Option<ThreatMonitorLink>,
    config: RuntimeConfig,
}

impl<A: Agent> RuntimeBuilder<A> {
    /// Shared codec; grants [`Capability::EncryptDecrypt`]
    pub fn codec(mut self, codec: Arc<CryptoCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Outbound delivery; grants [`Capability::SecureExchange`]
    pub fn router(mut self, router: Arc<dyn MessageRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Sentinel link for threat escalation; grants [`Capability::ThreatMonitor`]
    pub fn threat_monitor(mut self, link: ThreatMonitorLink) -> Self {
        self.threat_link = Some(link);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the worker on the current tokio runtime
    pub fn spawn(self) -> AgentRuntime {
        let mut capabilities = CapabilitySet::default();
        if self.codec.is_some() {
            capabilities.insert(Capability::EncryptDecrypt);
        }
        if self.router.is_some() {
            capabilities.insert(Capability::SecureExchange);
        }
        if self.threat_link.is_some() {
            capabilities.insert(Capability::ThreatMonitor);
        }

        let queue = Arc::new(TaskQueue::new());
        let state = AtomicU8::new(RuntimeState::Starting as u8);
        let cancel = CancellationToken::new();

        let worker = Worker {
            id: self.id.clone(),
            agent: self.agent,
            handlers: A::handlers(),
            scheduler: Scheduler::new(),
            codec: self.codec,
            router: self.router,
            threat_link: self.threat_link,
            queue: Arc::clone(&queue),
            cancel: cancel.clone(),
            dequeue_timeout: self.config.dequeue_timeout,
        };

        let span = info_span!("agent", id = %self.id);
        let handle = tokio::spawn(worker.run().instrument(span));

        state.store(RuntimeState::Running as u8, Ordering::Release);
        info!(agent = %self.id, "agent runtime started");

        AgentRuntime {
            id: self.id,
            config: self.config,
            queue,
            state,
            cancel,
            worker: Mutex::new(Some(handle)),
            capabilities,
        }
    }
}

/// Handle to one running agent
pub struct AgentRuntime {
    /// Registry identifier
    id: String,

    config: RuntimeConfig,

    /// Inbox shared with the worker
    queue: Arc<TaskQueue>,

    /// Current [`RuntimeState`]
    state: AtomicU8,

    /// Cooperative stop flag, checked once per worker iteration
    cancel: CancellationToken,

    /// Worker join handle, taken by the first `shutdown()`
    worker: Mutex<Option<JoinHandle<()>>>,

    capabilities: CapabilitySet,
}

impl AgentRuntime {
    /// Start configuring a runtime for `agent`
    pub fn builder<A: Agent>(id: impl Into<String>, agent: A) -> RuntimeBuilder<A> {
        RuntimeBuilder {
            id: id.into(),
            agent,
            codec: None,
            router: None,
            threat_link: None,
            config: RuntimeConfig::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> RuntimeState {
        RuntimeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Queue an envelope for the worker
    ///
    /// Never blocks. Fails only once the runtime is `Stopped`.
    pub fn receive(&self, envelope: Envelope) -> Result<()> {
        if self.state() == RuntimeState::Stopped {
            return Err(EngineError::RuntimeStopped(self.id.clone()));
        }
        self.queue.enqueue(envelope);
        Ok(())
    }

    /// Drain and stop the worker
    ///
    /// The worker finishes its current item, flushes agent state and exits.
    /// If it does not finish within the join timeout it is abandoned and the
    /// runtime is marked `Stopped` anyway. Calling this again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let transitioned = self
            .state
            .compare_exchange(
                RuntimeState::Running as u8,
                RuntimeState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !transitioned {
            debug!(agent = %self.id, state = %self.state(), "shutdown already requested");
            return Ok(());
        }

        info!(agent = %self.id, "draining agent runtime");
        self.cancel.cancel();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => debug!(agent = %self.id, "worker joined"),
                Ok(Err(e)) => error!(agent = %self.id, "worker task failed: {}", e),
                Err(_) => warn!(
                    agent = %self.id,
                    timeout = ?self.config.join_timeout,
                    "worker did not exit in time, abandoning"
                ),
            }
        }

        self.state.store(RuntimeState::Stopped as u8, Ordering::Release);
        info!(agent = %self.id, "agent runtime stopped");
        Ok(())
    }
}

impl fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl Drop for AgentRuntime {
    fn drop(&mut self) {
        // Let an orphaned worker exit at its next iteration
        self.cancel.cancel();
    }
}

/// State owned by the worker task
struct Worker<A: Agent> {
    id: String,
    agent: A,
    handlers: HandlerTable<A>,
    scheduler: Scheduler<A::Job>,
    codec: Option<Arc<CryptoCodec>>,
    router: Option<Arc<dyn MessageRouter>>,
    threat_link: Option<ThreatMonitorLink>,
    queue: Arc<TaskQueue>,
    cancel: CancellationToken,
    dequeue_timeout: Duration,
}

impl<A: Agent> Worker<A> {
    async fn run(mut self) {
        self.start();

        let queue = Arc::clone(&self.queue);
        let cancel = self.cancel.clone();

        while !cancel.is_cancelled() {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = queue.dequeue(self.dequeue_timeout) => next,
            };

            match next {
                Some(envelope) => {
                    self.dispatch(envelope);
                    // A busy inbox must not starve overdue jobs; no ticks once draining
                    let overdue = self.scheduler.next_due().is_some_and(|due| due <= Instant::now());
                    if overdue && !cancel.is_cancelled() {
                        self.tick();
                    }
                }
                None => self.tick(),
            }
        }

        self.drain();
    }

    fn start(&mut self) {
        let Self { id, agent, scheduler, codec, router, threat_link, .. } = self;
        let mut ctx = AgentContext::new(
            id.as_str(),
            codec.as_deref(),
            router.as_deref(),
            threat_link.as_ref(),
            scheduler,
        );

        if let Err(e) = agent.on_start(&mut ctx) {
            error!("agent start hook failed: {}", e);
        }
        debug!(jobs = scheduler.len(), "worker started");
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let task = match envelope.open(self.codec.as_deref()) {
            Ok(task) => task,
            Err(e) => {
                warn!(
                    origin = %envelope.origin(),
                    task_type = %envelope.task_type(),
                    "failed to open envelope: {}", e
                );
                metrics::counter!("agent_decryption_failures_total", "agent" => self.id.clone())
                    .increment(1);
                Task::decryption_failed(&envelope, &e)
            }
        };

        let Some(handler) = self.handlers.get(task.task_type()) else {
            if task.task_type() == DECRYPTION_FAILED {
                error!(origin = %task.origin(), "undecryptable task dropped, no handler registered");
            } else {
                warn!(task_type = %task.task_type(), origin = %task.origin(), "no handler for task type, dropping");
            }
            metrics::counter!("agent_tasks_dropped_total", "agent" => self.id.clone()).increment(1);
            return;
        };

        let Self { id, agent, scheduler, codec, router, threat_link, .. } = self;
        let mut ctx = AgentContext::new(
            id.as_str(),
            codec.as_deref(),
            router.as_deref(),
            threat_link.as_ref(),
            scheduler,
        );

        match panic::catch_unwind(AssertUnwindSafe(|| handler(agent, &task, &mut ctx))) {
            Ok(Ok(())) => {
                debug!(task_type = %task.task_type(), "task handled");
            }
            Ok(Err(e)) => {
                error!(task_type = %task.task_type(), origin = %task.origin(), "handler failed: {}", e);
            }
            Err(_) => {
                error!(task_type = %task.task_type(), origin = %task.origin(), "handler panicked");
            }
        }
        metrics::counter!("agent_tasks_dispatched_total", "agent" => self.id.clone()).increment(1);
    }

    fn tick(&mut self) {
        let Self { id, agent, scheduler, codec, router, threat_link, .. } = self;
        scheduler.tick(Instant::now(), |job, scheduler| {
            let mut ctx = AgentContext::new(
                id.as_str(),
                codec.as_deref(),
                router.as_deref(),
                threat_link.as_ref(),
                scheduler,
            );
            agent.run_job(job, &mut ctx)
        });
    }

    fn drain(&mut self) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.agent.on_drain())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("failed to flush agent state: {}", e),
            Err(_) => error!("agent drain hook panicked"),
        }

        let discarded = self.queue.drain();
        if discarded > 0 {
            warn!(discarded, "discarded queued tasks at shutdown");
        }
        debug!("worker exited");
    }
}
