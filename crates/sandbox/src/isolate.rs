//! One-shot V8 isolate runs.
//!
//! Every call gets a brand new `JsRuntime` on a dedicated OS thread with its
//! own current-thread tokio runtime, because isolates are `!Send`. Nothing
//! survives between calls.
//!
//! The bare `deno_core` runtime exposes no `fetch`, timers, file system,
//! environment, subprocess or FFI surface; the bootstrap removes the last
//! host object (`Deno`) so every such access fails as an ordinary script
//! error.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{ExecutionResult, SandboxError, SandboxLimits};

/// Extra time the host waits past the limit for the isolate thread to report.
const HOST_GRACE: Duration = Duration::from_millis(500);

/// Extra heap granted after termination so the exception can unwind.
const HEAP_GRACE_BYTES: usize = 1024 * 1024;

const BOOTSTRAP: &str = r#"
((globalObject) => {
    const indirectEval = globalObject.eval;
    const stringify = JSON.stringify;
    const describe = (error) =>
        error !== null && typeof error === "object" && "message" in error
            ? String(error.message)
            : String(error);
    let settled;
    const fail = (error) => {
        settled = stringify({ error: describe(error) });
    };
    const succeed = (value) => {
        try {
            settled = stringify({ ok: value });
        } catch (error) {
            fail(error);
        }
    };
    const run = (source) => {
        let value;
        try {
            value = indirectEval(source);
        } catch (error) {
            fail(error);
            return;
        }
        Promise.resolve(value).then(succeed, fail);
    };
    Object.defineProperty(globalObject, "__sandbox", {
        value: Object.freeze({ run, settled: () => (settled === undefined ? "" : settled) }),
        enumerable: false,
        writable: false,
        configurable: false,
    });
    delete globalObject.Deno;
})(globalThis);
"#;

/// Run `code` in a fresh isolate under `limits`.
///
/// Never fails: every error, including host-side ones, comes back as a
/// failed [`ExecutionResult`]. `execution_time_ms` covers the whole call.
#[instrument(skip(code), fields(code_len = code.len()))]
pub async fn execute(code: &str, limits: SandboxLimits) -> ExecutionResult {
    let started = Instant::now();
    match run_on_thread(code, limits).await {
        Ok(value) => ExecutionResult::succeeded(value, started.elapsed()),
        Err(err) => {
            debug!(error = %err, "sandboxed run failed");
            ExecutionResult::failed(&err, started.elapsed())
        }
    }
}

async fn run_on_thread(code: &str, limits: SandboxLimits) -> Result<Option<Value>, SandboxError> {
    if code.len() > limits.max_code_bytes {
        return Err(SandboxError::CodeTooLarge {
            max: limits.max_code_bytes,
            actual: code.len(),
        });
    }

    let code = code.to_owned();
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::Builder::new()
        .name("sandbox-isolate".into())
        .spawn(move || {
            let result = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt.block_on(run_isolate(&code, &limits)),
                Err(e) => Err(SandboxError::Runtime(e.to_string())),
            };
            if tx.send(result).is_err() {
                warn!("sandbox result receiver dropped before result was sent");
            }
        })
        .map_err(|e| SandboxError::Runtime(e.to_string()))?;

    match tokio::time::timeout(limits.timeout + HOST_GRACE, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(SandboxError::Runtime("sandbox thread panicked".into())),
        Err(_) => {
            warn!("isolate thread did not report after termination");
            Err(SandboxError::Timeout)
        }
    }
}

/// State for the near-heap-limit callback.
struct HeapLimitState {
    handle: v8::IsolateHandle,
    triggered: AtomicBool,
}

extern "C" fn near_heap_limit_callback(
    data: *mut c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points at the boxed `HeapLimitState` owned by
    // `run_isolate`, which drops the runtime before the box.
    let state = unsafe { &*(data as *const HeapLimitState) };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    current_heap_limit + HEAP_GRACE_BYTES
}

/// Must run on a dedicated thread: owns the isolate for its whole life.
async fn run_isolate(code: &str, limits: &SandboxLimits) -> Result<Option<Value>, SandboxError> {
    let create_params = v8::CreateParams::default().heap_limits(0, limits.memory_bytes);
    let mut runtime = JsRuntime::new(RuntimeOptions {
        create_params: Some(create_params),
        ..Default::default()
    });

    let heap_state = Box::new(HeapLimitState {
        handle: runtime.v8_isolate().thread_safe_handle(),
        triggered: AtomicBool::new(false),
    });
    runtime.v8_isolate().add_near_heap_limit_callback(
        near_heap_limit_callback,
        &*heap_state as *const HeapLimitState as *mut c_void,
    );

    let watchdog_handle = runtime.v8_isolate().thread_safe_handle();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog_timed_out = timed_out.clone();
    let timeout = limits.timeout;
    let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();
    let watchdog = std::thread::spawn(move || {
        if let Err(std::sync::mpsc::RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
            watchdog_timed_out.store(true, Ordering::SeqCst);
            watchdog_handle.terminate_execution();
        }
    });

    let outcome = evaluate(&mut runtime, code, timeout).await;

    // The watchdog holds an isolate handle; join it before the isolate goes.
    let _ = cancel_tx.send(());
    let _ = watchdog.join();
    drop(runtime);

    settle(
        heap_state.triggered.load(Ordering::SeqCst),
        timed_out.load(Ordering::SeqCst),
        outcome,
    )
}

/// Memory first, then timeout, then the script's own outcome.
fn settle(
    heap_exceeded: bool,
    timed_out: bool,
    outcome: Result<Option<Value>, SandboxError>,
) -> Result<Option<Value>, SandboxError> {
    if heap_exceeded {
        return Err(SandboxError::HeapLimitExceeded);
    }
    if timed_out {
        return Err(SandboxError::Timeout);
    }
    outcome
}

async fn evaluate(
    runtime: &mut JsRuntime,
    code: &str,
    timeout: Duration,
) -> Result<Option<Value>, SandboxError> {
    runtime
        .execute_script("[sandbox:bootstrap]", BOOTSTRAP)
        .map_err(js_error)?;

    let source = serde_json::to_string(code).map_err(|e| SandboxError::Runtime(e.to_string()))?;
    runtime
        .execute_script("[sandbox:run]", format!("globalThis.__sandbox.run({source});"))
        .map_err(js_error)?;

    match tokio::time::timeout(
        timeout,
        runtime.run_event_loop(PollEventLoopOptions::default()),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(js_error(e)),
        Err(_) => return Err(SandboxError::Timeout),
    }

    let settled = runtime
        .execute_script("[sandbox:collect]", "globalThis.__sandbox.settled()")
        .map_err(js_error)?;
    let envelope = {
        let scope = &mut runtime.handle_scope();
        let local = v8::Local::new(scope, settled);
        local.to_rust_string_lossy(scope)
    };
    decode_envelope(&envelope)
}

fn js_error(err: impl std::fmt::Display) -> SandboxError {
    SandboxError::Js(err.to_string())
}

/// `{"ok": value}` or `{"error": message}`; empty when the completion value
/// was a promise that never settled.
fn decode_envelope(envelope: &str) -> Result<Option<Value>, SandboxError> {
    if envelope.is_empty() {
        return Err(SandboxError::Js("script result never settled".into()));
    }
    let envelope: Value =
        serde_json::from_str(envelope).map_err(|e| SandboxError::Runtime(e.to_string()))?;
    if let Some(error) = envelope.get("error") {
        let message = error.as_str().unwrap_or("unknown error");
        return Err(SandboxError::Js(message.to_owned()));
    }
    Ok(envelope.get("ok").cloned())
}
