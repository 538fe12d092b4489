use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use engine::Formula;
use nodes::StepResult;

use crate::{ApiError, AppState};

pub const INVALID_FORMAT: &str = "Invalid request format. Required fields: triggers, steps";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    #[serde(flatten)]
    pub result: StepResult,
    /// Whole-request wall time in milliseconds.
    pub execution_time: u64,
}

/// `POST /api/execute`
#[instrument(skip_all)]
pub async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let started = Instant::now();
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let present = |field: &str| body.get(field).is_some_and(|v| !v.is_null());
    if !present("triggers") || !present("steps") {
        return Err(ApiError::BadRequest(INVALID_FORMAT.to_owned()));
    }

    let formula: Formula = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("{INVALID_FORMAT} ({e})")))?;

    let result = state.executor.run(&formula, &formula.input).await?;
    let execution_time = started.elapsed().as_millis() as u64;
    info!(success = result.success, execution_time, "formula request served");

    Ok(Json(ExecuteResponse {
        result,
        execution_time,
    }))
}
