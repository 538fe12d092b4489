//! Shared run state and the outbound HTTP seam.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::http::{HttpCall, HttpReply};
use crate::NodeError;

/// Outcome of one step, as recorded in the run context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn ok(result: Option<Value>) -> Self {
        Self {
            success: true,
            result,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

impl From<sandbox::ExecutionResult> for StepResult {
    fn from(run: sandbox::ExecutionResult) -> Self {
        Self {
            success: run.success,
            result: run.result,
            error: run.error,
        }
    }
}

/// Per-run state: every finished step's result keyed by step name.
///
/// Owned by exactly one formula run and dropped with it. Defined here (in
/// the nodes crate) so step implementations can read it without depending
/// on the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionContext {
    pub steps: BTreeMap<String, StepResult>,
    /// Reserved; always empty.
    pub triggers: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step_name: impl Into<String>, result: StepResult) {
        self.steps.insert(step_name.into(), result);
    }

    pub fn step(&self, step_name: &str) -> Option<&StepResult> {
        self.steps.get(step_name)
    }

    /// JSON form handed to scripts as the `context` binding.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Sends one outbound request.
///
/// `ReqwestClient` is the production implementation; tests use
/// `mock::MockHttpClient`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, call: HttpCall) -> Result<HttpReply, NodeError>;
}
