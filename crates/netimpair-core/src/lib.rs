//! # netimpair-core
//!
//! The packet-queue simulation engine behind a network impairment tool: a
//! per-direction discrete-event model of a bandwidth-limited, lossy,
//! delay-prone link, the timer/scheduler contract it sits on, and the thin
//! packet-handling protocol that connects it to any packet source (kernel
//! queue interceptor, userspace UDP proxy, or test harness).
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use netimpair_core::parameters::{ParameterStore, Parameters};
//! use netimpair_core::pipe_pair::PipePair;
//! use netimpair_core::scheduler::VirtualScheduler;
//!
//! let scheduler = Arc::new(VirtualScheduler::new());
//! let params = Arc::new(ParameterStore::new(Parameters { delay: 0.5, ..Default::default() }));
//! let pipes = PipePair::new(params, scheduler.clone(), Some(1));
//!
//! let delivered = Arc::new(std::sync::atomic::AtomicBool::new(false));
//! let d = delivered.clone();
//! pipes.up().attempt(
//!     Box::new(move || d.store(true, std::sync::atomic::Ordering::SeqCst)),
//!     Box::new(|| {}),
//!     0,
//! );
//! scheduler.advance(0.5);
//! assert!(delivered.load(std::sync::atomic::Ordering::SeqCst));
//! ```
//!
//! ## Architecture
//!
//! Adapter observes a packet → converts it into `(size, deliver_cb, drop_cb)`
//! → hands it to the direction's [`pipe::Pipe`] via `attempt` → the pipe
//! synchronously chooses a fate (admit / loss-drop / overflow-drop) and either
//! invokes `drop_cb` immediately or schedules release and delivery on the
//! [`scheduler::Scheduler`] → at the scheduled instants the pipe updates
//! occupancy and meters and invokes `deliver_cb`.

pub mod adapter;
pub mod core_handle;
pub mod error;
pub mod event_log;
pub mod parameters;
pub mod pipe;
pub mod pipe_pair;
pub mod scheduler;

pub use adapter::{Direction, PacketSource};
pub use core_handle::{CoreHandle, Meters};
pub use error::Error;
pub use event_log::{Event, EventLog, EventType};
pub use parameters::{ParameterStore, Parameters};
pub use pipe::Pipe;
pub use pipe_pair::PipePair;
pub use scheduler::{LiveScheduler, Scheduler, VirtualScheduler};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
