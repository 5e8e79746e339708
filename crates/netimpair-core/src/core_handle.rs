//! A thin facade over a [`PipePair`] for callers that live outside the
//! scheduler's own callback context — HTTP handlers, the CLI's adapters —
//! so they funnel parameter reads/writes and event drains through one
//! place instead of touching `ParameterStore`/`EventLog` piecemeal.
//!
//! No dedicated OS thread is needed to get serialized access here:
//! `ParameterStore`, `EventLog` and `Pipe` already serialize themselves
//! internally (see DESIGN.md), so `CoreHandle` just forwards.

use crate::error::Error;
use crate::event_log::Event;
use crate::parameters::Parameters;
use crate::pipe_pair::PipePair;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Snapshot of both directions' byte meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meters {
    pub up_bytes_attempted: u64,
    pub up_bytes_delivered: u64,
    pub down_bytes_attempted: u64,
    pub down_bytes_delivered: u64,
}

/// Handle shared by the HTTP control surface and packet-source adapters.
#[derive(Clone)]
pub struct CoreHandle {
    pipes: Arc<PipePair>,
}

impl CoreHandle {
    pub fn new(pipes: Arc<PipePair>) -> Self {
        Self { pipes }
    }

    pub fn pipes(&self) -> &Arc<PipePair> {
        &self.pipes
    }

    pub fn params(&self) -> Parameters {
        self.pipes.params().snapshot()
    }

    pub fn update_params(&self, candidate: &HashMap<String, Value>) -> Result<Parameters, Error> {
        self.pipes.params().update(candidate)
    }

    pub fn reset_params(&self) -> Parameters {
        self.pipes.params().reset()
    }

    pub fn drain_events(&self) -> Vec<Event> {
        self.pipes.events().get_pending()
    }

    pub fn meters(&self) -> Meters {
        Meters {
            up_bytes_attempted: self.pipes.up().bytes_attempted(),
            up_bytes_delivered: self.pipes.up().bytes_delivered(),
            down_bytes_attempted: self.pipes.down().bytes_attempted(),
            down_bytes_delivered: self.pipes.down().bytes_delivered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterStore;
    use crate::scheduler::{Scheduler, VirtualScheduler};

    fn handle() -> CoreHandle {
        let scheduler: Arc<dyn Scheduler> = Arc::new(VirtualScheduler::new());
        let params = Arc::new(ParameterStore::new(Parameters::default()));
        CoreHandle::new(Arc::new(PipePair::new(params, scheduler, Some(7))))
    }

    #[test]
    fn update_then_reset_round_trips() {
        let handle = handle();
        let mut candidate = HashMap::new();
        candidate.insert("loss".to_string(), Value::from(0.5));
        let merged = handle.update_params(&candidate).unwrap();
        assert_eq!(merged.loss, 0.5);
        assert_eq!(handle.params().loss, 0.5);

        let reset = handle.reset_params();
        assert_eq!(reset, Parameters::default());
    }

    #[test]
    fn meters_reflect_both_directions() {
        let handle = handle();
        handle.pipes().up().attempt(Box::new(|| {}), Box::new(|| {}), 100);
        handle.pipes().down().attempt(Box::new(|| {}), Box::new(|| {}), 50);
        let meters = handle.meters();
        assert_eq!(meters.up_bytes_attempted, 100);
        assert_eq!(meters.down_bytes_attempted, 50);
    }
}
