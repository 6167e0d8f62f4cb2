// src/runtime/scheduler.rs
//! Cooperative per-agent job table
//!
//! Replaces a process-wide scheduler library with an explicit table that the
//! owning worker ticks while its queue is idle. Jobs are plain values of the
//! agent's `Job` type; the worker supplies the code that runs them.
//!
//! # Semantics
//!
//! - A job fires when `next_due <= now` and is rescheduled to
//!   `now + interval` (never `due + interval`), so a stalled tick fires a job
//!   once rather than bursting through missed periods.
//! - A failing or panicking job is logged and stays registered.
//! - `clear()` during a tick discards the rest of that tick's due jobs: they
//!   belong to a schedule that no longer exists.

use crate::utils::errors::Result;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// Shortest interval accepted by the scheduler
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a registered job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

/// A recurring job entry
#[derive(Debug, Clone)]
pub struct ScheduledJob<J> {
    pub id: JobId,

    /// Period between firings
    pub interval: Duration,

    /// Earliest instant the job may fire again
    pub next_due: Instant,

    /// Number of times the job has fired
    pub fire_count: u64,

    pub job: J,
}

/// Per-agent periodic scheduler
pub struct Scheduler<J> {
    jobs: Vec<ScheduledJob<J>>,
    next_id: u64,

    /// Bumped by `clear()` so an in-flight tick can detect replacement
    generation: u64,
}

impl<J: Clone + fmt::Debug> Scheduler<J> {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 0,
            generation: 0,
        }
    }

    /// Register a job first due one `interval` from now
    pub fn register(&mut self, interval: Duration, job: J) -> JobId {
        self.register_at(interval, job, Instant::now())
    }

    /// Register a job first due one `interval` after `now`
    pub fn register_at(&mut self, interval: Duration, job: J, now: Instant) -> JobId {
        let interval = interval.max(MIN_INTERVAL);
        let id = JobId(self.next_id);
        self.next_id += 1;

        trace!(?job, ?interval, "registering job");

        self.jobs.push(ScheduledJob {
            id,
            interval,
            next_due: now + interval,
            fire_count: 0,
            job,
        });
        id
    }

    /// Remove every job
    pub fn clear(&mut self) {
        debug!("clearing {} scheduled jobs", self.jobs.len());
        self.jobs.clear();
        self.generation += 1;
    }

    /// Fire every due job through `fire`, returning how many ran
    ///
    /// `fire` receives the scheduler itself so a job may reconfigure the
    /// table it was fired from.
    pub fn tick<F>(&mut self, now: Instant, mut fire: F) -> usize
    where
        F: FnMut(&J, &mut Self) -> Result<()>,
    {
        let generation = self.generation;

        let mut due = Vec::new();
        for entry in self.jobs.iter_mut().filter(|entry| entry.next_due <= now) {
            entry.next_due = now + entry.interval;
            entry.fire_count += 1;
            due.push(entry.job.clone());
        }

        let mut fired = 0;
        for job in due {
            if self.generation != generation {
                debug!("schedule replaced mid-tick, skipping remaining due jobs");
                break;
            }

            fired += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| fire(&job, self))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(?job, error = %e, "scheduled job failed");
                    metrics::counter!("agent_job_failures_total").increment(1);
                }
                Err(_) => {
                    error!(?job, "scheduled job panicked");
                    metrics::counter!("agent_job_failures_total").increment(1);
                }
            }
        }

        fired
    }

    /// Registered jobs in registration order
    pub fn jobs(&self) -> &[ScheduledJob<J>] {
        &self.jobs
    }

    /// Earliest due instant across all jobs
    pub fn next_due(&self) -> Option<Instant> {
        self.jobs.iter().map(|entry| entry.next_due).min()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl<J: Clone + fmt::Debug> Default for Scheduler<J> {
    fn default() -> Self {
        Self::new()
    }
}
