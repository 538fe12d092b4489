//! `nodes` crate — step kinds and their implementations.
//!
//! Every step of a formula is one of the kinds in [`StepKind`]:
//! - `httpRequest` — an outbound call through an [`HttpClient`].
//! - `script` — JavaScript run through the sandbox pool.
//! - anything else — a no-op that always succeeds.
//!
//! The engine crate dispatches execution through [`StepRunner`].

pub mod error;
pub mod http;
pub mod kind;
pub mod mock;
pub mod reference;
pub mod runner;
pub mod script;
pub mod traits;

pub use error::NodeError;
pub use http::{HttpCall, HttpReply, ReqwestClient};
pub use kind::{HttpRequestProps, ScriptProps, StepKind};
pub use runner::StepRunner;
pub use traits::{ExecutionContext, HttpClient, StepResult};
