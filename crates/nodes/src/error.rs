//! Node-level error type.

use thiserror::Error;

/// Errors returned while executing a single step.
///
/// The engine uses the variant to decide what happens next:
/// - `Upstream` / `Bindings` — recorded as a failed step; the walk follows
///   the step's failure edge.
/// - `PoolShutdown` — the whole run is aborted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The outbound call or reading its response failed.
    #[error("upstream call failed: {0}")]
    Upstream(String),

    /// Script bindings could not be rendered.
    #[error("invalid script bindings: {0}")]
    Bindings(String),

    /// The worker pool was torn down while the script was pending.
    #[error("Pool shutdown")]
    PoolShutdown,
}
