//! `sandbox` crate — isolated, resource-bounded execution of untrusted scripts.
//!
//! [`execute`] runs one snippet in a fresh V8 isolate with a wall-clock
//! timeout, a heap ceiling and no host capabilities, and always returns an
//! [`ExecutionResult`]. [`Bindings`] renders named constants ahead of the
//! snippet.

pub mod bindings;
pub mod error;
pub mod isolate;
pub mod models;

pub use bindings::{Binding, Bindings};
pub use error::SandboxError;
pub use isolate::execute;
pub use models::{ExecutionResult, SandboxLimits};
