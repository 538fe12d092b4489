use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use sandbox::{Bindings, ExecutionResult};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunJsRequest {
    pub code: Option<String>,
    /// Each entry becomes a `const` binding visible to the script.
    #[serde(default)]
    pub global_variables: Option<Map<String, Value>>,
    #[serde(default)]
    pub input: Option<Value>,
}

/// The sandbox outcome with a single timing field: `executionTime` is the
/// whole request in milliseconds and replaces the sandbox's own
/// `executionTimeMs`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunJsResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time: u64,
}

impl RunJsResponse {
    fn new(run: ExecutionResult, execution_time: u64) -> Self {
        Self {
            success: run.success,
            result: run.result,
            error: run.error,
            execution_time,
        }
    }
}

/// `POST /api/run-js`
///
/// Script failures are reported with status 200 and `success: false`;
/// only a shut-down pool is a server error.
#[instrument(skip_all)]
pub async fn run_js(
    State(state): State<AppState>,
    payload: Result<Json<RunJsRequest>, JsonRejection>,
) -> Result<Json<RunJsResponse>, ApiError> {
    let started = Instant::now();
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let code = request
        .code
        .ok_or_else(|| ApiError::BadRequest("Invalid request format. Required field: code".into()))?;

    let mut bindings = Bindings::with_done();
    for (name, value) in request.global_variables.unwrap_or_default() {
        bindings.insert(name, value);
    }
    if let Some(input) = request.input {
        bindings.insert("input", input);
    }

    let result = match bindings.wrap(&code) {
        Ok(source) => state.pool.submit(source).await?,
        Err(e) => ExecutionResult::failed(&e, started.elapsed()),
    };
    debug!(
        success = result.success,
        sandbox_ms = result.execution_time_ms,
        "run-js settled"
    );

    Ok(Json(RunJsResponse::new(
        result,
        started.elapsed().as_millis() as u64,
    )))
}
