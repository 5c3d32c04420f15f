use super::batch::{Batch, BatchConfig, FlushTrigger};
use super::queue::EventQueue;
use crate::domain::{Event, TelemetryError};
use crate::reliability::{BackoffPolicy, RetryConfig};
use crate::sender::{TelemetryStats, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No flush timer pending.
    Idle,
    /// Exactly one flush timer pending.
    Armed,
}

/// Outcome of [`BatchScheduler::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Events still queued or still in flight when the drain finished.
    pub undelivered: usize,
    pub timed_out: bool,
}

#[derive(Default)]
struct TimerSlot {
    // Bumped on every arm and cancel so a timer that already woke up can
    // tell it has been superseded.
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

struct SchedulerInner<T> {
    queue: Mutex<EventQueue>,
    timer: Mutex<TimerSlot>,
    config: BatchConfig,
    retry: RetryConfig,
    backoff: BackoffPolicy,
    transport: T,
    stats: TelemetryStats,
    consecutive_failures: AtomicU32,
    timers_armed: AtomicU64,
    in_flight_events: AtomicUsize,
    closed: AtomicBool,
    in_flight: TaskTracker,
    runtime: Handle,
}

/// Owns the event queue and decides when it is flushed.
///
/// Enqueueing never blocks or awaits. A queue that reaches `batch_size` is
/// flushed on the spot; anything smaller waits for the quiescence timer,
/// which is armed at most once at a time. Sends run on spawned tasks and a
/// failed batch is put back at the front of the queue.
pub struct BatchScheduler<T: Transport> {
    inner: Arc<SchedulerInner<T>>,
}

impl<T: Transport> Clone for BatchScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> BatchScheduler<T> {
    /// Must be called from within a tokio runtime; timers and sends are
    /// spawned onto it.
    pub fn new(
        config: BatchConfig,
        retry: RetryConfig,
        transport: T,
        stats: TelemetryStats,
    ) -> Result<Self, TelemetryError> {
        let runtime = Handle::try_current().map_err(|e| TelemetryError::NoRuntime(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                queue: Mutex::new(EventQueue::new(config.max_queue_size)),
                timer: Mutex::new(TimerSlot::default()),
                backoff: BackoffPolicy::new(&retry),
                config,
                retry,
                transport,
                stats,
                consecutive_failures: AtomicU32::new(0),
                timers_armed: AtomicU64::new(0),
                in_flight_events: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                in_flight: TaskTracker::new(),
                runtime,
            }),
        })
    }

    pub fn enqueue(&self, event: Event) {
        let outcome = self.inner.queue.lock().push(event);

        if outcome.dropped > 0 {
            self.inner.stats.record_dropped(outcome.dropped);
            warn!(
                "Event queue full ({} events), dropped {} oldest",
                self.inner.config.max_queue_size, outcome.dropped
            );
        }

        if outcome.len >= self.inner.config.batch_size {
            self.flush_now(FlushTrigger::Size);
        } else {
            self.arm(self.inner.config.flush_delay, FlushTrigger::Time);
        }
    }

    /// Cancels any pending timer, drains and sends. Returns whether a batch
    /// was dispatched.
    pub fn flush_now(&self, trigger: FlushTrigger) -> bool {
        self.cancel_timer();
        self.dispatch(trigger)
    }

    pub fn state(&self) -> SchedulerState {
        if self.inner.timer.lock().handle.is_some() {
            SchedulerState::Armed
        } else {
            SchedulerState::Idle
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Events queued plus events in sends that have not finished, read as
    /// one consistent count.
    pub fn undelivered(&self) -> usize {
        let queue = self.inner.queue.lock();
        queue.len() + self.inner.in_flight_events.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.inner.queue.lock().snapshot()
    }

    /// Sends spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Total number of timers ever armed.
    pub fn timers_armed(&self) -> u64 {
        self.inner.timers_armed.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Stops timers, sends whatever is queued and waits up to `grace` for
    /// in-flight sends. Nothing is re-armed afterwards.
    pub async fn shutdown(&self, grace: Duration) -> DrainReport {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.flush_now(FlushTrigger::Shutdown);
        self.inner.in_flight.close();

        let timed_out = tokio::time::timeout(grace, self.inner.in_flight.wait())
            .await
            .is_err();
        if timed_out {
            warn!(
                "Shutdown grace of {:?} elapsed with {} sends in flight",
                grace,
                self.inner.in_flight.len()
            );
        }

        DrainReport {
            undelivered: self.undelivered(),
            timed_out,
        }
    }

    fn arm(&self, delay: Duration, trigger: FlushTrigger) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }

        let mut slot = self.inner.timer.lock();
        if slot.handle.is_some() {
            return;
        }

        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        let scheduler = self.clone();

        slot.handle = Some(self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.on_timer(generation, trigger);
        }));
        self.inner.timers_armed.fetch_add(1, Ordering::Relaxed);

        debug!("Flush timer armed ({:?}, trigger: {})", delay, trigger);
    }

    fn on_timer(&self, generation: u64, trigger: FlushTrigger) {
        {
            let mut slot = self.inner.timer.lock();
            if slot.generation != generation {
                return;
            }
            slot.handle = None;
        }

        self.dispatch(trigger);
    }

    fn cancel_timer(&self) {
        let mut slot = self.inner.timer.lock();
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }

    fn dispatch(&self, trigger: FlushTrigger) -> bool {
        let events = {
            let mut queue = self.inner.queue.lock();
            let events = queue.drain();
            // Counted under the lock so drained events are never invisible
            // to `shutdown`.
            self.inner
                .in_flight_events
                .fetch_add(events.len(), Ordering::SeqCst);
            events
        };
        if events.is_empty() {
            return false;
        }

        let batch = Batch::new(events, trigger);
        let scheduler = self.clone();
        self.inner
            .in_flight
            .spawn_on(async move { scheduler.deliver(batch).await }, &self.inner.runtime);
        true
    }

    async fn deliver(&self, batch: Batch) {
        let count = batch.size();
        let result = self.inner.transport.send(&batch).await;

        match result {
            Ok(result) => {
                self.inner.in_flight_events.fetch_sub(count, Ordering::SeqCst);
                self.inner.consecutive_failures.store(0, Ordering::Relaxed);
                self.inner
                    .stats
                    .record_success(count, result.bytes_sent, result.latency);
                debug!(
                    "Delivered batch {} ({} events, trigger: {}) after {:?}",
                    batch.id(),
                    count,
                    batch.trigger(),
                    batch.created_at().elapsed()
                );
            }
            Err(e) => {
                let failures = self.inner.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Failed to send batch {} ({} events): {}; requeued",
                    batch.id(),
                    count,
                    e
                );

                let outcome = {
                    let mut queue = self.inner.queue.lock();
                    let outcome = queue.requeue_front(batch.into_events());
                    self.inner.in_flight_events.fetch_sub(count, Ordering::SeqCst);
                    outcome
                };
                self.inner.stats.record_failure(count);
                if outcome.dropped > 0 {
                    self.inner.stats.record_dropped(outcome.dropped);
                    warn!(
                        "Event queue full after requeue, dropped {} oldest",
                        outcome.dropped
                    );
                }

                if self.inner.retry.rearm_on_failure {
                    self.arm(self.inner.backoff.delay_for(failures), FlushTrigger::Retry);
                }
            }
        }
    }
}
