//! Error and outcome types.
//!
//! Three families, matching how problems actually surface:
//!
//! - [`PipelineError`]: instantiation refusals and submission routing
//!   mistakes. The only build-derived refusal is the fatal no-entry-points
//!   diagnostic; everything else about a build comes back as collected
//!   [`Diagnostic`](crate::diagnostics::Diagnostic) data.
//! - [`ReceiveError`] / [`TryReceiveError`]: receive outcomes. `Completed`
//!   (end of stream), `Empty` (queue temporarily empty) and `Cancelled` are
//!   distinct outcomes, not faults.
//! - Per-item handler failures never appear here at all: they are swallowed
//!   and logged at the stage boundary.

use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// Convenience alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Boxed error returned by step handlers and swallowed at the stage
/// boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by instantiation and submission routing.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The definition carries the fatal no-entry-points diagnostic; no
    /// stages were created.
    #[error("pipeline has no entry points and cannot be instantiated")]
    NoEntryPoints {
        /// The full diagnostic set of the refused definition.
        diagnostics: Vec<Diagnostic>,
    },

    /// A non-broadcast node has no handler registered for it.
    #[error("no handler registered for step '{0}'")]
    MissingHandler(String),

    /// A name-qualified submission referenced a name that is not an entry
    /// node.
    #[error("pipeline has no entry node named '{0}'")]
    UnknownEntry(String),

    /// An unqualified submission was used on a pipeline with more than one
    /// entry node.
    #[error("pipeline has {0} entry nodes; use submit_to / submit_async_to")]
    NoSingleEntry(usize),
}

/// Outcome of a blocking receive.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReceiveError {
    /// Every upstream stage completed and the exit queue drained; no
    /// further values will arrive.
    #[error("pipeline output has completed")]
    Completed,

    /// The cancellation signal fired while the receive was blocked.
    #[error("receive was cancelled")]
    Cancelled,

    /// A name-qualified receive referenced a name that is not an observable
    /// exit node.
    #[error("pipeline has no observable exit node named '{0}'")]
    UnknownExit(String),

    /// An unqualified receive was used while the pipeline does not have
    /// exactly one observable exit node.
    #[error("pipeline has {0} observable exit nodes; use the name-qualified receive")]
    NoSingleExit(usize),
}

/// Outcome of a non-blocking receive.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TryReceiveError {
    /// The exit queue is temporarily empty; more values may still arrive.
    #[error("exit queue is empty")]
    Empty,

    /// Every upstream stage completed and the exit queue drained.
    #[error("pipeline output has completed")]
    Completed,

    /// A name-qualified receive referenced a name that is not an observable
    /// exit node.
    #[error("pipeline has no observable exit node named '{0}'")]
    UnknownExit(String),

    /// An unqualified receive was used while the pipeline does not have
    /// exactly one observable exit node.
    #[error("pipeline has {0} observable exit nodes; use the name-qualified receive")]
    NoSingleExit(usize),
}
