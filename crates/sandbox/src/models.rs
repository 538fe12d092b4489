//! Limits and results for a single sandboxed run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SandboxError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Resource ceilings applied to one isolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Wall-clock budget before the isolate is terminated.
    pub timeout: Duration,
    /// V8 heap ceiling in bytes.
    pub memory_bytes: usize,
    /// Largest accepted source text, prelude included.
    pub max_code_bytes: usize,
}

impl SandboxLimits {
    pub fn new(timeout: Duration, memory_bytes: usize) -> Self {
        Self {
            timeout,
            memory_bytes,
            ..Self::default()
        }
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            memory_bytes: 100 * 1024 * 1024,
            max_code_bytes: 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Outcome of a sandboxed run. Always carries the elapsed time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(result: Option<Value>, elapsed: Duration) -> Self {
        Self {
            success: true,
            result,
            error: None,
            execution_time_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failed(error: &SandboxError, elapsed: Duration) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
            execution_time_ms: elapsed.as_millis() as u64,
        }
    }
}
