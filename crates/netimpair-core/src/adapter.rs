//! The contract any packet source (kernel queue interceptor, userspace UDP
//! proxy, or test harness) must satisfy to drive the core.
//!
//! The core does not know or care how an adapter observes a packet — only
//! that it can classify it into a [`Direction`], compute a byte `size` that
//! already includes any protocol overhead the adapter's transport charges,
//! and offer it to the matching [`crate::pipe::Pipe`] via `attempt`, honoring
//! exactly one of the deliver/drop capabilities it receives back.
//!
//! Rust's ownership model gives the "each capability fires at most once" half
//! of that contract for free: `attempt`'s callbacks are `FnOnce`, so invoking
//! one consumes it. What the adapter still owns is *which* one fires, and
//! driving `attempt` only from the single scheduler context that also runs
//! its own callbacks (never a foreign thread).

use crate::error::Error;
use crate::pipe_pair::PipePair;
use crate::scheduler::Scheduler;
use std::sync::Arc;

/// Direction of a packet relative to the local host's role. Policy for how an
/// adapter assigns this is adapter-specific (e.g. "outbound from this host"
/// vs. "inbound to this host").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn pipe_name(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// Any agent that intercepts real packets and drives a [`PipePair`]:
/// a kernel queue interceptor, a userspace UDP proxy, or a test harness.
///
/// `run` takes ownership of the adapter and the resources it needs to drive
/// packets through; it should not return until the adapter shuts down (or it
/// hit an unrecoverable [`Error::FatalEnvironment`]/[`Error::AdapterFailure`]).
/// Implementations must invoke `pipes.pipe(direction).attempt(..)` and receive
/// its callbacks only from the same single scheduler context — never from a
/// foreign thread — per the core's concurrency model.
pub trait PacketSource: Send {
    /// A short name for logging (e.g. `"udp-proxy"`, `"nfqueue"`).
    fn name(&self) -> &'static str;

    /// Drive packets through `pipes` until shutdown.
    fn run(self: Box<Self>, pipes: Arc<PipePair>, scheduler: Arc<dyn Scheduler>) -> Result<(), Error>;
}
