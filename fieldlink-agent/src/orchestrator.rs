//! Collection cadence: read, export, queue on failure.

use std::time::Duration;

use fieldlink_agent_framework::{Batch, MetricKind, Shutdown};
use fieldlink_common::encode_string;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::device_status::StatusProbe;
use crate::exporter::{DELIVERED_STATUS, Exporter};
use crate::queue::{QueueEntry, QueueStore};
use crate::sources::Source;

/// Tracing target of the batch log sink.
pub const METRICS_LOG_TARGET: &str = "fieldlink::metrics";

/// What happened to one batch in a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The collector answered 201.
    Delivered,
    /// Live delivery failed and the batch is queued under this key.
    Queued(String),
    /// Live delivery failed and the batch could not be queued either.
    PersistFailed,
}

/// Per-kind outcome of one tick. `None` means the kind was not collected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sensor: Option<Dispatch>,
    pub device_status: Option<Dispatch>,
}

impl TickReport {
    pub fn get(&self, kind: MetricKind) -> Option<&Dispatch> {
        match kind {
            MetricKind::Sensor => self.sensor.as_ref(),
            MetricKind::DeviceStatus => self.device_status.as_ref(),
        }
    }
}

/// Drives the collection loop.
pub struct Orchestrator {
    sources: Vec<Box<dyn Source>>,
    probe: Option<Box<dyn StatusProbe>>,
    exporter: Exporter,
    store: QueueStore,
    interval: Duration,
    shutdown: Shutdown,
}

impl Orchestrator {
    pub fn new(
        sources: Vec<Box<dyn Source>>,
        probe: Option<Box<dyn StatusProbe>>,
        exporter: Exporter,
        store: QueueStore,
        interval: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            sources,
            probe,
            exporter,
            store,
            interval,
            shutdown,
        }
    }

    /// Collect every `interval` until shutdown.
    ///
    /// Ticks start on a fixed schedule, so time spent exporting does not push
    /// later ticks back. A tick that overruns the interval delays the next one
    /// instead of triggering a burst. Nothing is drained on exit; whatever
    /// failed stays queued.
    pub async fn run(mut self) {
        info!(
            sources = self.sources.len(),
            device_status = self.probe.is_some(),
            interval_secs = self.interval.as_secs(),
            "Collection loop started"
        );

        // interval() panics on a zero period
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.requested() => break,
            }
            if self.shutdown.is_requested() {
                break;
            }

            self.collect_once(chrono::Utc::now().timestamp()).await;
        }

        info!("Collection loop stopped");
    }

    /// One tick at unix second `timestamp`.
    pub async fn collect_once(&mut self, timestamp: i64) -> TickReport {
        let mut report = TickReport::default();

        if !self.sources.is_empty() {
            let records = self.sources.iter_mut().map(|source| source.read()).collect();
            let batch = Batch::Sensor(records);
            report.sensor = Some(dispatch(&self.exporter, &self.store, batch, timestamp).await);
        }

        if let Some(probe) = self.probe.as_mut() {
            let batch = Batch::DeviceStatus(probe.sample(timestamp));
            report.device_status =
                Some(dispatch(&self.exporter, &self.store, batch, timestamp).await);
        }

        report
    }
}

/// Log, send, and queue `batch` if the collector did not take it.
async fn dispatch(
    exporter: &Exporter,
    store: &QueueStore,
    batch: Batch,
    timestamp: i64,
) -> Dispatch {
    log_batch(&batch);

    let status = exporter.send(&batch).await;
    if status == DELIVERED_STATUS {
        return Dispatch::Delivered;
    }

    let entry = QueueEntry::new(batch, Some(status));
    let key = entry.key_at(timestamp);
    let kind = entry.kind;

    let target = key.clone();
    match store.blocking(move |store| store.put(&target, &entry)).await {
        Ok(()) => {
            warn!(key = %key, kind = %kind, status, "Live delivery failed, batch queued");
            Dispatch::Queued(key)
        }
        Err(e) => {
            error!(key = %key, kind = %kind, status, error = %e, "Could not queue undelivered batch");
            Dispatch::PersistFailed
        }
    }
}

/// Side-channel record of every batch, delivered or not.
fn log_batch(batch: &Batch) {
    match encode_string(batch) {
        Ok(payload) => info!(
            target: METRICS_LOG_TARGET,
            kind = %batch.kind(),
            count = batch.len(),
            payload = %payload,
            "Batch collected"
        ),
        Err(e) => warn!(kind = %batch.kind(), error = %e, "Could not encode batch for log sink"),
    }
}
