use crate::domain::Event;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// What caused a batch to be drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushTrigger {
    /// Queue reached the batch size threshold.
    Size,
    /// Quiescence delay elapsed.
    Time,
    /// Backoff timer armed after a failed send.
    Retry,
    Manual,
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Time => "time",
            FlushTrigger::Retry => "retry",
            FlushTrigger::Manual => "manual",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,
    /// Quiescence delay before a non-full queue is flushed.
    pub flush_delay: Duration,
    /// Hard cap on queued events; the oldest are evicted beyond it.
    pub max_queue_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_delay: Duration::from_millis(5000),
            max_queue_size: 1000,
        }
    }
}

/// A drained group of events sent together in one request.
#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    events: Vec<Event>,
    trigger: FlushTrigger,
    created_at: Instant,
}

impl Batch {
    pub fn new(events: Vec<Event>, trigger: FlushTrigger) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            events,
            trigger,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn size(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn trigger(&self) -> FlushTrigger {
        self.trigger
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
