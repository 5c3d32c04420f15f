use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Nearest-rank percentile over already sorted samples.
fn calculate_percentile(sorted_samples: &[Duration], percentile: f64) -> Duration {
    let Some(last) = sorted_samples.len().checked_sub(1) else {
        return Duration::ZERO;
    };

    let percentile = percentile.clamp(0.0, 1.0);
    let index = (percentile * last as f64).floor() as usize;
    sorted_samples
        .get(index.min(last))
        .copied()
        .unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub events_tracked: u64,
    /// Evicted on overflow or rejected as malformed.
    pub events_dropped: u64,
    pub events_sent: u64,
    pub events_requeued: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub bytes_sent: u64,
    pub average_latency: Duration,
    pub p95_latency: Duration,
}

/// Lock-free counters shared by the service, the scheduler and send tasks.
#[derive(Clone, Default)]
pub struct TelemetryStats {
    events_tracked: Arc<AtomicU64>,
    events_dropped: Arc<AtomicU64>,
    events_sent: Arc<AtomicU64>,
    events_requeued: Arc<AtomicU64>,
    batches_sent: Arc<AtomicU64>,
    batches_failed: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<VecDeque<Duration>>>,
}

impl TelemetryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tracked(&self) {
        self.events_tracked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: usize) {
        self.events_dropped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_success(&self, events: usize, bytes: usize, latency: Duration) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.events_sent.fetch_add(events as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);

        let mut samples = self.latency_samples.lock();
        samples.push_back(latency);
        if samples.len() > MAX_LATENCY_SAMPLES {
            samples.pop_front();
        }
    }

    pub fn record_failure(&self, requeued: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.events_requeued
            .fetch_add(requeued as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let (average_latency, p95_latency) = {
            let mut samples: Vec<Duration> = self.latency_samples.lock().iter().copied().collect();
            if samples.is_empty() {
                (Duration::ZERO, Duration::ZERO)
            } else {
                samples.sort();
                let total: Duration = samples.iter().sum();
                let average = total / samples.len() as u32;
                (average, calculate_percentile(&samples, 0.95))
            }
        };

        StatsSnapshot {
            events_tracked: self.events_tracked.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_requeued: self.events_requeued.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            average_latency,
            p95_latency,
        }
    }
}
