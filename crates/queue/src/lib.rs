//! `queue` crate — the in-memory worker pool that bounds concurrent sandbox runs.
//!
//! Scripts are queued FIFO, admitted under a `max_workers` ceiling and run
//! through a [`ScriptRunner`]. The pool is an explicit object with its own
//! lifecycle: construct it, share it behind an `Arc`, and shut it down.

pub mod error;
pub mod mock;
pub mod pool;
pub mod runner;

pub use error::PoolError;
pub use pool::{PoolConfig, PoolStats, SandboxPool, Submission, DEFAULT_MAX_WORKERS};
pub use runner::{IsolateRunner, ScriptRunner};
