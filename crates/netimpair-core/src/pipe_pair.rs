//! Aggregates an "up" and "down" [`Pipe`] sharing one [`ParameterStore`] and
//! one [`EventLog`] — the unit handed to packet sources.

use crate::adapter::Direction;
use crate::event_log::EventLog;
use crate::parameters::ParameterStore;
use crate::pipe::Pipe;
use crate::scheduler::Scheduler;
use std::sync::Arc;

/// A coupled up/down pair. Has no behavior of its own beyond construction and
/// exposure of the two [`Pipe`]s.
pub struct PipePair {
    up: Pipe,
    down: Pipe,
    params: Arc<ParameterStore>,
    events: Arc<EventLog>,
}

impl PipePair {
    /// Build a pair sharing `params` and a fresh `EventLog`.
    ///
    /// `seed`, if given, seeds both directions' loss RNGs deterministically
    /// (for reproducible tests); `None` seeds each from OS entropy.
    pub fn new(params: Arc<ParameterStore>, scheduler: Arc<dyn Scheduler>, seed: Option<u64>) -> Self {
        let events = Arc::new(EventLog::default());
        let up = Pipe::new(
            Direction::Up.pipe_name(),
            Arc::clone(&params),
            Arc::clone(&events),
            Arc::clone(&scheduler),
            seed,
        );
        let down_seed = seed.map(|s| s.wrapping_add(1));
        let down = Pipe::new(
            Direction::Down.pipe_name(),
            Arc::clone(&params),
            Arc::clone(&events),
            scheduler,
            down_seed,
        );
        Self { up, down, params, events }
    }

    pub fn up(&self) -> &Pipe {
        &self.up
    }

    pub fn down(&self) -> &Pipe {
        &self.down
    }

    /// The pipe for the given direction.
    pub fn pipe(&self, direction: Direction) -> &Pipe {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// Reset both directions' byte meters.
    pub fn reset_meters(&self) {
        self.up.reset_meter();
        self.down.reset_meter();
    }
}
