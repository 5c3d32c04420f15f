#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::Map;
use shopfront_telemetry::buffer::{Batch, BatchConfig, BatchScheduler};
use shopfront_telemetry::domain::{Event, EventType};
use shopfront_telemetry::reliability::RetryConfig;
use shopfront_telemetry::sender::{
    TelemetryStats, TransmissionError, TransmissionResult, Transport,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Recording {
    delivered: Mutex<Vec<Batch>>,
    attempts: Mutex<Vec<Batch>>,
    failures_remaining: AtomicUsize,
    response_delay: Mutex<Option<Duration>>,
}

/// In-memory transport that records every batch it is handed.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Recording>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` sends with a 503.
    pub fn failing(count: usize) -> Self {
        let transport = Self::default();
        transport.fail_next(count);
        transport
    }

    /// Every send waits `delay` before succeeding.
    pub fn slow(delay: Duration) -> Self {
        let transport = Self::default();
        *transport.inner.response_delay.lock() = Some(delay);
        transport
    }

    pub fn fail_next(&self, count: usize) {
        self.inner.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Batch> {
        self.inner.delivered.lock().clone()
    }

    pub fn attempts(&self) -> Vec<Batch> {
        self.inner.attempts.lock().clone()
    }

    pub fn delivered_sizes(&self) -> Vec<usize> {
        self.delivered().iter().map(Batch::size).collect()
    }

    /// Event types of every delivered event, flattened in delivery order.
    pub fn delivered_tags(&self) -> Vec<String> {
        self.delivered()
            .iter()
            .flat_map(|batch| batch.events().iter().map(|e| e.event_type.to_string()))
            .collect()
    }
}

impl Transport for RecordingTransport {
    async fn send(&self, batch: &Batch) -> Result<TransmissionResult, TransmissionError> {
        self.inner.attempts.lock().push(batch.clone());

        let delay = *self.inner.response_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .inner
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(TransmissionError::Rejected { status: 503 });
        }

        self.inner.delivered.lock().push(batch.clone());
        Ok(TransmissionResult {
            status_code: 200,
            latency: Duration::from_millis(1),
            batch_id: batch.id().to_string(),
            bytes_sent: batch.size() * 100,
            compressed: false,
        })
    }
}

/// Event tagged `name`, so tests can check ordering by type.
pub fn event(name: &str) -> Event {
    Event::with_timestamp(
        EventType::Custom(name.to_string()),
        0,
        "test-session",
        "/",
        Map::new(),
    )
}

pub fn batch_config(batch_size: usize, flush_delay_ms: u64) -> BatchConfig {
    BatchConfig {
        batch_size,
        flush_delay: Duration::from_millis(flush_delay_ms),
        max_queue_size: 1000,
    }
}

pub fn scheduler(
    config: BatchConfig,
    retry: RetryConfig,
    transport: &RecordingTransport,
) -> (BatchScheduler<RecordingTransport>, TelemetryStats) {
    let stats = TelemetryStats::new();
    let scheduler = BatchScheduler::new(config, retry, transport.clone(), stats.clone())
        .expect("scheduler requires a runtime");
    (scheduler, stats)
}

/// Lets spawned timers and sends run. Under a paused clock this advances
/// virtual time by one millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
