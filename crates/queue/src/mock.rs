//! `MockScriptRunner` — a test double for `ScriptRunner`.
//!
//! Records every script it receives and tracks how many runs overlap, so
//! tests can check admission control without spinning up isolates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sandbox::{ExecutionResult, SandboxLimits};
use serde_json::Value;

use crate::ScriptRunner;

/// Behaviour injected into `MockScriptRunner` at construction time.
pub enum MockBehaviour {
    /// Succeed with a specific JSON value.
    ReturnValue(Value),
    /// Succeed with the script text itself as a JSON string.
    Echo,
    /// Fail with the given error message.
    Fail(String),
    /// Never settle.
    Hang,
}

pub struct MockScriptRunner {
    pub behaviour: MockBehaviour,
    /// Simulated run time before settling.
    pub delay: Duration,
    /// Every script seen, in start order.
    pub calls: Arc<Mutex<Vec<String>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockScriptRunner {
    fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn returning(value: Value) -> Self {
        Self::with_behaviour(MockBehaviour::ReturnValue(value))
    }

    pub fn echoing() -> Self {
        Self::with_behaviour(MockBehaviour::Echo)
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self::with_behaviour(MockBehaviour::Fail(msg.into()))
    }

    pub fn hanging() -> Self {
        Self::with_behaviour(MockBehaviour::Hang)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of overlapping runs observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptRunner for MockScriptRunner {
    async fn run(&self, code: &str, _limits: SandboxLimits) -> ExecutionResult {
        self.calls.lock().unwrap().push(code.to_owned());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = match &self.behaviour {
            MockBehaviour::ReturnValue(v) => ExecutionResult {
                success: true,
                result: Some(v.clone()),
                error: None,
                execution_time_ms: self.delay.as_millis() as u64,
            },
            MockBehaviour::Echo => ExecutionResult {
                success: true,
                result: Some(Value::String(code.to_owned())),
                error: None,
                execution_time_ms: self.delay.as_millis() as u64,
            },
            MockBehaviour::Fail(msg) => ExecutionResult {
                success: false,
                result: None,
                error: Some(msg.clone()),
                execution_time_ms: self.delay.as_millis() as u64,
            },
            MockBehaviour::Hang => std::future::pending::<ExecutionResult>().await,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
