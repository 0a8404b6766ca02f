use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

const LATENCY_WINDOW: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct PollStats {
    pub polls_started: u64,
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub stale_dropped: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub avg_fetch_latency_ms: f64,
}

pub struct PollMetrics {
    polls_started: Arc<Mutex<u64>>,
    polls_succeeded: Arc<Mutex<u64>>,
    polls_failed: Arc<Mutex<u64>>,
    stale_dropped: Arc<Mutex<u64>>,
    last_success: Arc<Mutex<Option<DateTime<Utc>>>>,
    latencies: Arc<Mutex<Vec<Duration>>>,
}

impl PollMetrics {
    pub fn new() -> Self {
        Self {
            polls_started: Arc::new(Mutex::new(0)),
            polls_succeeded: Arc::new(Mutex::new(0)),
            polls_failed: Arc::new(Mutex::new(0)),
            stale_dropped: Arc::new(Mutex::new(0)),
            last_success: Arc::new(Mutex::new(None)),
            latencies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record_started(&self) {
        *self.polls_started.lock().unwrap() += 1;
    }

    pub fn record_success(&self, latency: Duration) {
        *self.polls_succeeded.lock().unwrap() += 1;
        *self.last_success.lock().unwrap() = Some(Utc::now());

        let mut latencies = self.latencies.lock().unwrap();
        latencies.push(latency);
        // Keep a rolling window so the average tracks recent behavior.
        if latencies.len() > LATENCY_WINDOW {
            latencies.remove(0);
        }
    }

    pub fn record_failure(&self) {
        *self.polls_failed.lock().unwrap() += 1;
    }

    pub fn record_stale_drop(&self) {
        *self.stale_dropped.lock().unwrap() += 1;
    }

    pub fn stats(&self) -> PollStats {
        let latencies = self.latencies.lock().unwrap();
        let avg_fetch_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            let total_ms: f64 = latencies.iter().map(|d| d.as_millis() as f64).sum();
            total_ms / latencies.len() as f64
        };

        PollStats {
            polls_started: *self.polls_started.lock().unwrap(),
            polls_succeeded: *self.polls_succeeded.lock().unwrap(),
            polls_failed: *self.polls_failed.lock().unwrap(),
            stale_dropped: *self.stale_dropped.lock().unwrap(),
            last_success: *self.last_success.lock().unwrap(),
            avg_fetch_latency_ms,
        }
    }
}

impl Default for PollMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PollMetrics {
    fn clone(&self) -> Self {
        Self {
            polls_started: Arc::clone(&self.polls_started),
            polls_succeeded: Arc::clone(&self.polls_succeeded),
            polls_failed: Arc::clone(&self.polls_failed),
            stale_dropped: Arc::clone(&self.stale_dropped),
            last_success: Arc::clone(&self.last_success),
            latencies: Arc::clone(&self.latencies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        let metrics = PollMetrics::new();
        let stats = metrics.stats();

        assert_eq!(stats.polls_started, 0);
        assert_eq!(stats.polls_succeeded, 0);
        assert_eq!(stats.polls_failed, 0);
        assert_eq!(stats.stale_dropped, 0);
        assert_eq!(stats.last_success, None);
        assert_eq!(stats.avg_fetch_latency_ms, 0.0);
    }

    #[test]
    fn test_record_success_updates_latency_average() {
        let metrics = PollMetrics::new();
        metrics.record_success(Duration::from_millis(100));
        metrics.record_success(Duration::from_millis(200));

        let stats = metrics.stats();
        assert_eq!(stats.polls_succeeded, 2);
        assert_eq!(stats.avg_fetch_latency_ms, 150.0);
        assert!(stats.last_success.is_some());
    }

    #[test]
    fn test_record_failure_and_stale_drop() {
        let metrics = PollMetrics::new();
        metrics.record_started();
        metrics.record_started();
        metrics.record_failure();
        metrics.record_stale_drop();

        let stats = metrics.stats();
        assert_eq!(stats.polls_started, 2);
        assert_eq!(stats.polls_failed, 1);
        assert_eq!(stats.stale_dropped, 1);
        assert_eq!(stats.last_success, None);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = PollMetrics::new();
        for _ in 0..LATENCY_WINDOW + 20 {
            metrics.record_success(Duration::from_millis(10));
        }

        let latencies = metrics.latencies.lock().unwrap();
        assert_eq!(latencies.len(), LATENCY_WINDOW);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = PollMetrics::new();
        let clone = metrics.clone();
        clone.record_started();
        clone.record_failure();

        let stats = metrics.stats();
        assert_eq!(stats.polls_started, 1);
        assert_eq!(stats.polls_failed, 1);
    }
}
