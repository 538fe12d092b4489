//! Pool-level error type.

use thiserror::Error;

/// Errors surfaced to whoever awaits a submission.
///
/// Script failures are not errors here: they come back as a failed
/// `ExecutionResult`. Only the pool's own lifecycle rejects a submission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool was shut down before the task settled.
    #[error("Pool shutdown")]
    Shutdown,
}
