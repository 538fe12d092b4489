//! Dispatch a step to the implementation for its kind.

use std::sync::Arc;

use queue::SandboxPool;
use serde_json::Value;

use crate::http::run_http_request;
use crate::script::run_script;
use crate::{ExecutionContext, HttpClient, NodeError, StepKind, StepResult};

/// Everything a step may need from the outside world.
#[derive(Clone)]
pub struct StepRunner {
    http: Arc<dyn HttpClient>,
    pool: Arc<SandboxPool>,
}

impl StepRunner {
    pub fn new(http: Arc<dyn HttpClient>, pool: Arc<SandboxPool>) -> Self {
        Self { http, pool }
    }

    pub fn pool(&self) -> &Arc<SandboxPool> {
        &self.pool
    }

    /// Execute `kind`. `input` and `trigger` only matter to script steps.
    pub async fn run(
        &self,
        kind: &StepKind,
        input: &Value,
        ctx: &ExecutionContext,
        trigger: Option<&Value>,
    ) -> Result<StepResult, NodeError> {
        match kind {
            StepKind::HttpRequest(props) => run_http_request(self.http.as_ref(), props, ctx).await,
            StepKind::Script(props) => run_script(&self.pool, props, input, ctx, trigger).await,
            StepKind::NoOp { .. } => Ok(StepResult::ok(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHttpClient;
    use queue::mock::MockScriptRunner;
    use queue::PoolConfig;
    use serde_json::json;

    #[tokio::test]
    async fn no_op_kinds_succeed_without_side_effects() {
        let http = Arc::new(MockHttpClient::replying(200, b"{}"));
        let scripts = Arc::new(MockScriptRunner::echoing());
        let pool = Arc::new(SandboxPool::new(PoolConfig::default(), scripts.clone()));
        let runner = StepRunner::new(http.clone(), pool);

        let kind = StepKind::from_parts("marker", json!({})).unwrap();
        let result = runner
            .run(&kind, &Value::Null, &ExecutionContext::new(), None)
            .await
            .unwrap();

        assert_eq!(result, StepResult::ok(None));
        assert_eq!(http.call_count(), 0);
        assert_eq!(scripts.call_count(), 0);
    }
}
