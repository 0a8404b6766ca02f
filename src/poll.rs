use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::aggregate::TelemetryAggregator;
use crate::client::ReadingsSource;
use crate::error::TelemetryError;
use crate::metrics::PollMetrics;
use crate::models::{DateRangeQuery, DeviceSnapshot, Reading};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Recent,
    Breakdown,
}

struct PollOutcome {
    kind: FetchKind,
    generation: u64,
    elapsed: Duration,
    result: Result<Vec<Reading>, TelemetryError>,
}

/// Polls the readings API for one device and publishes derived snapshots.
///
/// Each tick supersedes the previous fetch of the same kind: the in-flight
/// task is aborted and any late response that still arrives carries a stale
/// generation and is dropped instead of overwriting newer data.
pub struct DevicePoller {
    source: Arc<dyn ReadingsSource>,
    aggregator: TelemetryAggregator,
    device_id: String,
    poll_interval: Duration,
    recent_limit: usize,
    snapshot_tx: watch::Sender<DeviceSnapshot>,
    shutdown: Arc<Notify>,
    metrics: PollMetrics,
}

impl DevicePoller {
    pub fn new(
        source: Arc<dyn ReadingsSource>,
        aggregator: TelemetryAggregator,
        device_id: impl Into<String>,
        shutdown: Arc<Notify>,
    ) -> (Self, watch::Receiver<DeviceSnapshot>) {
        let device_id = device_id.into();
        let (snapshot_tx, snapshot_rx) = watch::channel(DeviceSnapshot::empty(&device_id));

        let poller = Self {
            source,
            aggregator,
            device_id,
            poll_interval: Duration::from_secs(30),
            recent_limit: 50,
            snapshot_tx,
            shutdown,
            metrics: PollMetrics::new(),
        };
        (poller, snapshot_rx)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    pub fn metrics(&self) -> PollMetrics {
        self.metrics.clone()
    }

    pub async fn run(self) {
        info!(
            "Polling device {} every {:?}",
            self.device_id, self.poll_interval
        );

        let (outcome_tx, mut outcome_rx) = mpsc::channel::<PollOutcome>(8);

        let mut recent_ticks = tokio::time::interval(self.poll_interval);
        let mut breakdown_ticks = tokio::time::interval(self.poll_interval);
        // A slow backend must not cause a burst of catch-up fetches.
        recent_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        breakdown_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut next_generation: u64 = 0;
        let mut recent_applied: u64 = 0;
        let mut breakdown_applied: u64 = 0;
        let mut recent_in_flight: Option<JoinHandle<()>> = None;
        let mut breakdown_in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = recent_ticks.tick() => {
                    next_generation += 1;
                    let task = self.spawn_recent_fetch(next_generation, outcome_tx.clone());
                    if let Some(superseded) = recent_in_flight.replace(task) {
                        superseded.abort();
                    }
                }
                _ = breakdown_ticks.tick() => {
                    next_generation += 1;
                    let task = self.spawn_breakdown_fetch(next_generation, outcome_tx.clone());
                    if let Some(superseded) = breakdown_in_flight.replace(task) {
                        superseded.abort();
                    }
                }
                Some(outcome) = outcome_rx.recv() => {
                    self.handle_outcome(outcome, &mut recent_applied, &mut breakdown_applied);
                }
                _ = self.shutdown.notified() => {
                    info!("Stopping poller for device {}", self.device_id);
                    if let Some(task) = recent_in_flight.take() {
                        task.abort();
                    }
                    if let Some(task) = breakdown_in_flight.take() {
                        task.abort();
                    }
                    break;
                }
            }
        }
    }

    fn spawn_recent_fetch(
        &self,
        generation: u64,
        outcome_tx: mpsc::Sender<PollOutcome>,
    ) -> JoinHandle<()> {
        self.metrics.record_started();
        let source = Arc::clone(&self.source);
        let device_id = self.device_id.clone();
        let limit = self.recent_limit.max(self.aggregator.recent_floor());

        tokio::spawn(async move {
            let started = Instant::now();
            let result = source.by_device(&device_id, Some(limit)).await;
            let _ = outcome_tx
                .send(PollOutcome {
                    kind: FetchKind::Recent,
                    generation,
                    elapsed: started.elapsed(),
                    result,
                })
                .await;
        })
    }

    fn spawn_breakdown_fetch(
        &self,
        generation: u64,
        outcome_tx: mpsc::Sender<PollOutcome>,
    ) -> JoinHandle<()> {
        self.metrics.record_started();
        let source = Arc::clone(&self.source);
        let (start_date, end_date) = self.aggregator.window_range(Utc::now());
        let query = DateRangeQuery {
            device_id: self.device_id.clone(),
            start_date,
            end_date,
            interval: None,
            count: None,
        };

        tokio::spawn(async move {
            let started = Instant::now();
            let result = source.by_date_range(&query).await;
            let _ = outcome_tx
                .send(PollOutcome {
                    kind: FetchKind::Breakdown,
                    generation,
                    elapsed: started.elapsed(),
                    result,
                })
                .await;
        })
    }

    fn handle_outcome(
        &self,
        outcome: PollOutcome,
        recent_applied: &mut u64,
        breakdown_applied: &mut u64,
    ) {
        let applied = match outcome.kind {
            FetchKind::Recent => recent_applied,
            FetchKind::Breakdown => breakdown_applied,
        };

        match outcome.result {
            Ok(readings) => {
                if outcome.generation <= *applied {
                    // A newer fetch already landed; this response lost the race.
                    self.metrics.record_stale_drop();
                    return;
                }
                *applied = outcome.generation;
                self.metrics.record_success(outcome.elapsed);
                self.apply(outcome.kind, outcome.generation, readings);
            }
            Err(e) => {
                self.metrics.record_failure();
                warn!("Fetch for device {} failed: {}", self.device_id, e);
            }
        }
    }

    /// Every response replaces the matching slice of the snapshot wholesale;
    /// aggregates are re-derived from scratch rather than merged.
    fn apply(&self, kind: FetchKind, generation: u64, readings: Vec<Reading>) {
        let now = Utc::now();
        match kind {
            FetchKind::Recent => {
                let recent = self.aggregator.select_recent(&readings, self.recent_limit);
                let online = self.aggregator.online_status(&recent, now);
                let averages = self.aggregator.averages(&recent);
                let summary = self.aggregator.summary(&recent);
                self.snapshot_tx.send_modify(|snapshot| {
                    snapshot.generation = snapshot.generation.max(generation);
                    snapshot.fetched_at = now;
                    snapshot.online = online;
                    snapshot.averages = averages;
                    snapshot.summary = summary;
                    snapshot.readings = recent;
                });
            }
            FetchKind::Breakdown => {
                let buckets = self.aggregator.daily_breakdown(&readings, now);
                self.snapshot_tx.send_modify(|snapshot| {
                    snapshot.generation = snapshot.generation.max(generation);
                    snapshot.fetched_at = now;
                    snapshot.buckets = buckets;
                });
            }
        }
    }
}
