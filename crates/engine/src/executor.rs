//! Formula execution engine.
//!
//! `FormulaExecutor` is the central orchestrator:
//! 1. Validates the formula and finds its entry step.
//! 2. Runs steps one at a time, dispatching each via `StepRunner`.
//! 3. Records every step result in the run's `ExecutionContext`.
//! 4. Follows the first success or failure edge until none remains.

use std::time::Instant;

use serde_json::Value;
use tracing::{info, instrument, warn};

use nodes::{ExecutionContext, NodeError, StepResult, StepRunner};

use crate::graph::{validate_formula, StepGraph};
use crate::{EngineError, Formula, Step};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of step visits in one run. Bounds cyclic graphs.
    pub max_steps: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_steps: 1000 }
    }
}

// ---------------------------------------------------------------------------
// FormulaExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator: each call to [`FormulaExecutor::run`] owns its
/// own context, so one executor serves any number of concurrent runs.
pub struct FormulaExecutor {
    runner: StepRunner,
    config: ExecutorConfig,
}

impl FormulaExecutor {
    pub fn new(runner: StepRunner, config: ExecutorConfig) -> Self {
        Self { runner, config }
    }

    pub fn runner(&self) -> &StepRunner {
        &self.runner
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run the formula and return the last executed step's result.
    ///
    /// # Errors
    /// Returns `EngineError` for structural problems, an exhausted step
    /// budget, or a pool that shut down mid-run. A failing step is not an
    /// error: it is recorded and its failure edge is followed.
    #[instrument(skip_all, fields(run_id = %uuid::Uuid::new_v4(), steps = formula.steps.len()))]
    pub async fn run(&self, formula: &Formula, input: &Value) -> Result<StepResult, EngineError> {
        let entry = validate_formula(formula)?;
        let trigger = serde_json::to_value(entry.trigger).ok();
        info!(trigger = %entry.trigger.name, first_step = %entry.first_step.name, "formula validated");

        let graph = StepGraph::new(formula);
        let mut ctx = ExecutionContext::new();
        let mut current = entry.first_step;
        let mut visits = 0usize;

        loop {
            visits += 1;
            if visits > self.config.max_steps {
                warn!(limit = self.config.max_steps, step = %current.name, "step budget exhausted");
                return Err(EngineError::StepBudgetExceeded {
                    limit: self.config.max_steps,
                    step: current.name.clone(),
                });
            }

            let result = self
                .execute_step(current, input, &ctx, trigger.as_ref())
                .await?;
            let succeeded = result.success;
            ctx.record(current.name.clone(), result);

            match graph.next(current, succeeded) {
                Some(next) => current = next,
                None => {
                    info!(visits, last_step = %current.name, success = succeeded, "formula finished");
                    // The last step was just recorded under its own name.
                    return Ok(ctx
                        .steps
                        .remove(&current.name)
                        .unwrap_or_else(|| StepResult::ok(None)));
                }
            }
        }
    }

    async fn execute_step(
        &self,
        step: &Step,
        input: &Value,
        ctx: &ExecutionContext,
        trigger: Option<&Value>,
    ) -> Result<StepResult, EngineError> {
        let started = Instant::now();
        let outcome = self.runner.run(&step.kind, input, ctx, trigger).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                if result.success {
                    info!(step = %step.name, kind = step.kind.type_name(), elapsed_ms, "step succeeded");
                } else {
                    warn!(
                        step = %step.name,
                        kind = step.kind.type_name(),
                        elapsed_ms,
                        error = result.error.as_deref().unwrap_or(""),
                        "step failed"
                    );
                }
                Ok(result)
            }
            Err(NodeError::PoolShutdown) => {
                warn!(step = %step.name, "sandbox pool shut down mid-run");
                Err(EngineError::PoolShutdown)
            }
            Err(e) => {
                warn!(step = %step.name, kind = step.kind.type_name(), elapsed_ms, error = %e, "step failed");
                Ok(StepResult::failed(e.to_string()))
            }
        }
    }
}
