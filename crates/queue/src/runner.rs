//! The seam between the pool and whatever actually runs a script.

use async_trait::async_trait;
use sandbox::{ExecutionResult, SandboxLimits};

/// Runs one script to completion under the given limits.
///
/// Implementations must not fail: every problem is reported through the
/// returned `ExecutionResult`.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, code: &str, limits: SandboxLimits) -> ExecutionResult;
}

/// Production runner: a fresh V8 isolate per script.
#[derive(Debug, Default, Clone, Copy)]
pub struct IsolateRunner;

#[async_trait]
impl ScriptRunner for IsolateRunner {
    async fn run(&self, code: &str, limits: SandboxLimits) -> ExecutionResult {
        sandbox::execute(code, limits).await
    }
}
