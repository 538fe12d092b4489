//! `engine` crate — formula validation and the step-walking executor.
//!
//! A formula is a set of triggers plus a graph of named steps joined by
//! `onSuccess` / `onFailure` edges. [`FormulaExecutor`] picks the active
//! trigger, runs steps one at a time through `nodes::StepRunner`, and
//! returns the last step's result.

pub mod error;
pub mod executor;
pub mod graph;
pub mod models;

pub use error::{EngineError, FormulaError};
pub use executor::{ExecutorConfig, FormulaExecutor};
pub use graph::{validate_formula, Entry, StepGraph};
pub use models::{Formula, Step, StepId, Trigger};
