use crate::domain::Event;
use std::collections::VecDeque;

/// Result of appending to or refilling an [`EventQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Queue length after the operation.
    pub len: usize,
    /// Oldest events evicted to stay within capacity.
    pub dropped: usize,
}

/// FIFO buffer of pending events with a hard capacity.
///
/// Not synchronized on its own; the scheduler owns it behind a mutex so
/// `drain` is atomic with respect to concurrent appends. When full, the
/// oldest events are evicted first.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<Event>,
    max_size: usize,
}

impl EventQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn push(&mut self, event: Event) -> PushOutcome {
        self.events.push_back(event);
        let dropped = self.evict_overflow();
        PushOutcome {
            len: self.events.len(),
            dropped,
        }
    }

    /// Removes and returns every queued event in insertion order.
    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Puts a failed batch back ahead of everything queued since it was drained.
    pub fn requeue_front(&mut self, batch: Vec<Event>) -> PushOutcome {
        for event in batch.into_iter().rev() {
            self.events.push_front(event);
        }
        let dropped = self.evict_overflow();
        PushOutcome {
            len: self.events.len(),
            dropped,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    fn evict_overflow(&mut self) -> usize {
        let excess = self.events.len().saturating_sub(self.max_size);
        if excess > 0 {
            self.events.drain(..excess);
        }
        excess
    }
}
