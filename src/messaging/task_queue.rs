// src/messaging/task_queue.rs
//! Lock-free MPSC task inbox
//!
//! Unbounded FIFO of envelopes for one agent runtime. Any number of producers
//! enqueue concurrently; only the owning worker dequeues. There is no
//! backpressure: a slow consumer accumulates memory.

use crate::messaging::envelope::Envelope;
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Per-agent task inbox
pub struct TaskQueue {
    /// Underlying unbounded queue
    queue: SegQueue<Envelope>,

    /// Wakes the consumer when work arrives
    notify: Notify,

    /// Enqueue counter
    push_count: AtomicU64,

    /// Dequeue counter
    pop_count: AtomicU64,

    /// Tasks discarded at shutdown
    drop_count: AtomicU64,
}

impl TaskQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            notify: Notify::new(),
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
        }
    }

    /// Enqueue a task (never blocks)
    pub fn enqueue(&self, envelope: Envelope) {
        self.queue.push(envelope);
        self.push_count.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Try to dequeue without waiting
    pub fn try_dequeue(&self) -> Option<Envelope> {
        let envelope = self.queue.pop()?;
        self.pop_count.fetch_add(1, Ordering::Relaxed);
        Some(envelope)
    }

    /// Dequeue the oldest task, waiting up to `timeout` for one to arrive
    ///
    /// Single-consumer: only the owning worker may call this.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Envelope> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(envelope) = self.try_dequeue() {
                return Some(envelope);
            }

            // notify_one stores a permit when nobody is waiting, so a push
            // between the pop above and this await is not lost
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.try_dequeue();
            }
        }
    }

    /// Discard everything still queued, returning how many tasks were dropped
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.queue.pop().is_some() {
            dropped += 1;
        }
        self.drop_count.fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            drop_count: self.drop_count.load(Ordering::Relaxed),
            current_size: self.queue.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Total tasks enqueued
    pub push_count: u64,

    /// Total tasks dequeued
    pub pop_count: u64,

    /// Total tasks discarded at shutdown
    pub drop_count: u64,

    /// Current queue size
    pub current_size: usize,
}
