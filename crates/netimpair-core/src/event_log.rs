//! Bounded, drain-on-read telemetry ring shared by both directions of a
//! [`crate::pipe_pair::PipePair`].

use serde::Serialize;
use std::sync::Mutex;

/// Default cap on the number of buffered events before the oldest are
/// dropped.
pub const DEFAULT_MAX_SIZE: usize = 9000;

/// The kind of telemetry event a [`crate::pipe::Pipe`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Queue occupancy changed (bytes, after admission or after release).
    Buffer,
    /// A packet's deliver callback fired (bytes).
    Deliver,
    /// A packet was dropped, either by loss or buffer overflow (bytes).
    Drop,
    /// Measured end-to-end latency for a delivered packet (seconds).
    Latency,
}

/// One telemetry record. `value` is bytes for `Buffer`/`Deliver`/`Drop`,
/// seconds for `Latency`.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: u64,
    pub time: f64,
    pub pipe_name: &'static str,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub value: f64,
}

/// Single-consumer, bounded, drain-on-read event buffer.
///
/// Writes and drains are expected from one cooperative core thread; the
/// single-thread invariant is what makes this safe without more than a plain
/// mutex (no cross-thread contention is expected in steady state).
pub struct EventLog {
    max_size: usize,
    inner: Mutex<EventLogInner>,
}

struct EventLogInner {
    next_id: u64,
    events: Vec<Event>,
}

impl EventLog {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            inner: Mutex::new(EventLogInner { next_id: 1, events: Vec::new() }),
        }
    }

    /// Append an event with the next monotonically increasing id, dropping
    /// the oldest entries if the log exceeds `max_size`.
    pub fn add(&self, time: f64, pipe_name: &'static str, event_type: EventType, value: f64) {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.events.push(Event { id, time, pipe_name, event_type, value });

        if inner.events.len() > self.max_size {
            let overflow = inner.events.len() - self.max_size;
            inner.events.drain(0..overflow);
        }
    }

    /// Atomically return and clear the buffered events.
    pub fn get_pending(&self) -> Vec<Event> {
        let mut inner = self.inner.lock().unwrap();
        std::mem::take(&mut inner.events)
    }

    /// Number of events currently buffered, without draining.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}
