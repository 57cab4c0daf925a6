//! Background sweep of the durable queue.
//!
//! Each cycle lists every queued key and works through them one at a time:
//!
//! - status 422 entries are dropped without a request
//! - anything else gets up to `max_attempts` sends, `attempt_pause` apart
//! - a 201 deletes the entry, exhausting the attempts leaves it for next cycle
//!
//! Store calls run on the blocking pool and never span a send.

use std::time::Duration;

use fieldlink_agent_framework::Shutdown;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::exporter::{DELIVERED_STATUS, Exporter};
use crate::queue::{QueueEntry, QueueStore};

/// Status marking a payload the collector will never accept.
pub const VALIDATION_FAILURE_STATUS: u16 = 422;

/// Retry timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sends per entry per cycle.
    pub max_attempts: u32,
    /// Pause between two sends of the same entry.
    pub attempt_pause: Duration,
    /// Pause between cycles.
    pub cycle_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_pause: Duration::from_secs(1),
            cycle_interval: Duration::from_secs(10),
        }
    }
}

/// What the worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Scanning,
    Attempting,
    Stopped,
}

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entries confirmed with a 201 and deleted.
    pub delivered: usize,
    /// Entries dropped for a 422.
    pub discarded: usize,
    /// Entries still queued after this sweep.
    pub deferred: usize,
    /// Keys that could not be read or deleted.
    pub failed: usize,
}

impl CycleReport {
    pub fn processed(&self) -> usize {
        self.delivered + self.discarded + self.deferred + self.failed
    }
}

/// Handle to a spawned worker.
#[derive(Debug)]
pub struct RetryHandle {
    state: watch::Receiver<RetryState>,
    task: JoinHandle<()>,
}

impl RetryHandle {
    /// Last published state.
    pub fn state(&self) -> RetryState {
        *self.state.borrow()
    }

    /// Receiver for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RetryState> {
        self.state.clone()
    }

    /// Wait for the worker to stop.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "Retry worker task failed");
        }
    }
}

/// Drains the durable queue through the exporter.
pub struct RetryWorker {
    exporter: Exporter,
    store: QueueStore,
    policy: RetryPolicy,
    shutdown: Shutdown,
    state: watch::Sender<RetryState>,
}

enum EntryOutcome {
    Missing,
    Delivered,
    Discarded,
    Deferred,
    Failed,
}

impl RetryWorker {
    pub fn new(
        exporter: Exporter,
        store: QueueStore,
        policy: RetryPolicy,
        shutdown: Shutdown,
    ) -> Self {
        let (state, _) = watch::channel(RetryState::Idle);
        Self {
            exporter,
            store,
            policy,
            shutdown,
            state,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Start the worker on its own task.
    pub fn spawn(self) -> RetryHandle {
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run());
        RetryHandle { state, task }
    }

    /// Sweep until shutdown.
    pub async fn run(self) {
        info!(
            max_attempts = self.policy.max_attempts,
            cycle_interval_secs = self.policy.cycle_interval.as_secs(),
            "Retry worker started"
        );

        loop {
            if self.shutdown.is_requested() {
                break;
            }

            let report = self.run_cycle().await;
            if report.processed() > 0 {
                info!(
                    delivered = report.delivered,
                    discarded = report.discarded,
                    deferred = report.deferred,
                    failed = report.failed,
                    "Retry cycle complete"
                );
            }

            if !self.shutdown.sleep(self.policy.cycle_interval).await {
                break;
            }
        }

        self.state.send_replace(RetryState::Stopped);
        info!("Retry worker stopped");
    }

    /// Run a single sweep over the keys queued right now.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        self.state.send_replace(RetryState::Scanning);

        let keys = match self.store.blocking(|store| store.list_keys()).await {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "Could not list queued batches, skipping cycle");
                self.state.send_replace(RetryState::Idle);
                return report;
            }
        };

        if !keys.is_empty() {
            debug!(count = keys.len(), "Retrying queued batches");
        }

        for key in keys {
            if self.shutdown.is_requested() {
                break;
            }
            match self.process(&key).await {
                EntryOutcome::Missing => {}
                EntryOutcome::Delivered => report.delivered += 1,
                EntryOutcome::Discarded => report.discarded += 1,
                EntryOutcome::Deferred => report.deferred += 1,
                EntryOutcome::Failed => report.failed += 1,
            }
            self.state.send_replace(RetryState::Scanning);
        }

        self.state.send_replace(RetryState::Idle);
        report
    }

    async fn process(&self, key: &str) -> EntryOutcome {
        let lookup = key.to_string();
        let entry = match self.store.blocking(move |store| store.get(&lookup)).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(key, "Entry already gone");
                return EntryOutcome::Missing;
            }
            Err(e) => {
                error!(key, error = %e, "Could not read queued batch");
                return EntryOutcome::Failed;
            }
        };

        if entry.status_code == Some(VALIDATION_FAILURE_STATUS) {
            if !self.remove(key).await {
                return EntryOutcome::Failed;
            }
            warn!(
                key,
                kind = %entry.kind,
                status = VALIDATION_FAILURE_STATUS,
                "Dropped invalid batch"
            );
            return EntryOutcome::Discarded;
        }

        self.state.send_replace(RetryState::Attempting);
        self.attempt(key, &entry).await
    }

    async fn attempt(&self, key: &str, entry: &QueueEntry) -> EntryOutcome {
        for attempt in 1..=self.policy.max_attempts {
            let status = self.exporter.send(&entry.payload).await;

            if status == DELIVERED_STATUS {
                info!(key, kind = %entry.kind, status, attempt, "Queued batch delivered");
                if !self.remove(key).await {
                    return EntryOutcome::Failed;
                }
                return EntryOutcome::Delivered;
            }

            warn!(
                key,
                kind = %entry.kind,
                status,
                attempt,
                max_attempts = self.policy.max_attempts,
                "Retry attempt failed"
            );

            if attempt < self.policy.max_attempts
                && !self.shutdown.sleep(self.policy.attempt_pause).await
            {
                break;
            }
        }

        EntryOutcome::Deferred
    }

    /// Delete `key`; false only when the store itself failed.
    async fn remove(&self, key: &str) -> bool {
        let target = key.to_string();
        match self.store.blocking(move |store| store.delete(&target)).await {
            Ok(_) => true,
            Err(e) => {
                error!(key, error = %e, "Could not delete queued batch");
                false
            }
        }
    }
}
