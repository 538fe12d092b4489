//! Engine-level error types.

use thiserror::Error;

/// Structural problems that stop a formula before any step runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormulaError {
    #[error("No active trigger found")]
    NoActiveTrigger,

    #[error("multiple active triggers: {}", .0.join(", "))]
    MultipleActiveTriggers(Vec<String>),

    #[error("No first step found")]
    NoFirstStep,

    /// Step names key the graph, so they must be unique.
    #[error("duplicate step name: '{0}'")]
    DuplicateStepName(String),
}

/// Run-level failures. Per-step failures are never errors: they are
/// recorded as failed step results and drive branching.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid formula: {0}")]
    InvalidFormula(#[from] FormulaError),

    /// The walk visited more steps than allowed; the graph most likely cycles.
    #[error("step budget of {limit} exceeded at step '{step}'")]
    StepBudgetExceeded { limit: usize, step: String },

    #[error("Pool shutdown")]
    PoolShutdown,
}
