//! The discriminated error taxonomy shared by every fallible seam in the core.

use thiserror::Error;

/// Errors raised by the packet-queue simulation engine and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// A `ParameterStore::update` candidate failed validation. The store is
    /// left unchanged.
    #[error("malformed parameter `{key}`: {reason}")]
    MalformedParameter { key: String, reason: String },

    /// An adapter could not post a verdict or relay a packet. The core treats
    /// the affected packet as a silent drop; the adapter owns recovery.
    #[error("adapter failure: {0}")]
    AdapterFailure(String),

    /// A scheduled callback panicked. The scheduler has already logged and
    /// continued; this variant exists for callers that want to observe it.
    #[error("scheduler misuse: {0}")]
    SchedulerMisuse(String),

    /// An unrecoverable environment problem at startup (missing privileges,
    /// missing interface, unresolvable port). The process should exit non-zero.
    #[error("fatal environment error: {0}")]
    FatalEnvironment(String),
}

pub type Result<T> = std::result::Result<T, Error>;
