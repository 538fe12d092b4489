//! Sandbox-level error type.

use thiserror::Error;

/// Reasons a sandboxed run did not produce a value.
///
/// These never escape the sandbox boundary as `Err`: [`crate::execute`]
/// flattens every variant into a failed [`crate::ExecutionResult`] whose
/// `error` field carries the `Display` text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// The watchdog terminated the isolate.
    #[error("Execution timed out")]
    Timeout,

    /// V8 approached the configured heap ceiling.
    #[error("Memory limit exceeded")]
    HeapLimitExceeded,

    /// Source was rejected before an isolate was created.
    #[error("code size {actual} exceeds the {max} byte limit")]
    CodeTooLarge { max: usize, actual: usize },

    /// A binding name is not a plain JavaScript identifier.
    #[error("invalid binding name '{0}'")]
    InvalidBinding(String),

    /// The script threw, failed to parse, or touched a denied capability.
    #[error("{0}")]
    Js(String),

    /// Host-side failure (thread, runtime, or result decoding).
    #[error("sandbox runtime error: {0}")]
    Runtime(String),
}
