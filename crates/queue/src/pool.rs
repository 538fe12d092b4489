//! In-memory sandbox worker pool.
//!
//! `SandboxPool` owns a FIFO queue of scripts and runs at most
//! `max_workers` of them at once:
//! 1. `enqueue` / `submit` assign a strictly increasing id and hand the task
//!    to the scheduler over an unbounded channel.
//! 2. The scheduler task is the only owner of the queue. It waits for a
//!    semaphore permit, then dispatches the head of the queue.
//! 3. Each dispatched run races the pool's shutdown token.
//! 4. `shutdown` cancels the token; in-flight runs and everything still
//!    queued are rejected with `PoolError::Shutdown`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use sandbox::{ExecutionResult, SandboxLimits};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{PoolError, ScriptRunner};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default ceiling on concurrently running isolates.
pub const DEFAULT_MAX_WORKERS: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Maximum number of scripts running at the same time.
    pub max_workers: usize,
    /// Limits applied to every script the pool runs.
    pub limits: SandboxLimits,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            limits: SandboxLimits::default(),
        }
    }
}

/// Point-in-time view of the pool's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub max_workers: usize,
    pub active: usize,
    pub queued: usize,
    pub submitted: u64,
    pub shut_down: bool,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

type Reply = oneshot::Sender<Result<ExecutionResult, PoolError>>;

struct SandboxTask {
    id: u64,
    code: String,
    reply: Reply,
}

impl SandboxTask {
    fn reject(self) {
        debug!(task_id = self.id, "rejecting task on shutdown");
        let _ = self.reply.send(Err(PoolError::Shutdown));
    }
}

/// A queued script whose result can be awaited.
#[derive(Debug)]
pub struct Submission {
    id: u64,
    rx: oneshot::Receiver<Result<ExecutionResult, PoolError>>,
}

impl Submission {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolves once the script settles or the pool shuts down.
    pub async fn wait(self) -> Result<ExecutionResult, PoolError> {
        // A dropped sender means the task was discarded by a shutdown.
        self.rx.await.unwrap_or(Err(PoolError::Shutdown))
    }
}

// ---------------------------------------------------------------------------
// SandboxPool
// ---------------------------------------------------------------------------

struct PoolShared {
    config: PoolConfig,
    runner: Arc<dyn ScriptRunner>,
    active: Mutex<HashSet<u64>>,
    queued: AtomicUsize,
    shutdown: CancellationToken,
}

impl PoolShared {
    fn active(&self) -> MutexGuard<'_, HashSet<u64>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Bounded, FIFO, cancellable pool of sandboxed script runs.
///
/// Must be created inside a tokio runtime: construction spawns the
/// scheduler task. Dropping the pool shuts it down.
pub struct SandboxPool {
    shared: Arc<PoolShared>,
    queue_tx: mpsc::UnboundedSender<SandboxTask>,
    /// Last assigned id. Held while sending so queue order matches id order.
    next_id: Mutex<u64>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl SandboxPool {
    pub fn new(config: PoolConfig, runner: Arc<dyn ScriptRunner>) -> Self {
        let max_workers = config.max_workers.max(1);
        let shared = Arc::new(PoolShared {
            config: PoolConfig { max_workers, ..config },
            runner,
            active: Mutex::new(HashSet::new()),
            queued: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        });
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let scheduler = tokio::spawn(schedule(shared.clone(), queue_rx, semaphore));

        info!(max_workers, "sandbox pool initialised");

        Self {
            shared,
            queue_tx,
            next_id: Mutex::new(0),
            scheduler: Mutex::new(Some(scheduler)),
        }
    }

    fn next_id(&self) -> MutexGuard<'_, u64> {
        self.next_id.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Queue `code` and return a handle to its eventual result.
    pub fn enqueue(&self, code: impl Into<String>) -> Result<Submission, PoolError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(PoolError::Shutdown);
        }

        let (reply, rx) = oneshot::channel();
        let code = code.into();
        let id = {
            let mut next_id = self.next_id();
            let id = *next_id + 1;
            self.shared.queued.fetch_add(1, Ordering::SeqCst);
            if self.queue_tx.send(SandboxTask { id, code, reply }).is_err() {
                self.shared.queued.fetch_sub(1, Ordering::SeqCst);
                return Err(PoolError::Shutdown);
            }
            *next_id = id;
            id
        };

        debug!(
            task_id = id,
            queued = self.shared.queued.load(Ordering::SeqCst),
            "script submitted"
        );
        Ok(Submission { id, rx })
    }

    /// Queue `code` and wait for its result.
    pub async fn submit(&self, code: impl Into<String>) -> Result<ExecutionResult, PoolError> {
        self.enqueue(code)?.wait().await
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_workers: self.shared.config.max_workers,
            active: self.shared.active().len(),
            queued: self.shared.queued.load(Ordering::SeqCst),
            submitted: *self.next_id(),
            shut_down: self.shared.shutdown.is_cancelled(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Reject every in-flight and queued task and stop the scheduler.
    ///
    /// Idempotent. The pool cannot be restarted; build a new one instead.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();

        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }

        self.shared.active().clear();
        info!("sandbox pool shut down");
    }
}

impl Drop for SandboxPool {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

async fn schedule(
    shared: Arc<PoolShared>,
    mut queue_rx: mpsc::UnboundedReceiver<SandboxTask>,
    semaphore: Arc<Semaphore>,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            task = queue_rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        // Admission control: the head of the queue waits here for a free slot.
        let permit = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => {
                shared.queued.fetch_sub(1, Ordering::SeqCst);
                task.reject();
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    shared.queued.fetch_sub(1, Ordering::SeqCst);
                    task.reject();
                    break;
                }
            },
        };

        shared.queued.fetch_sub(1, Ordering::SeqCst);
        dispatch(shared.clone(), task, permit);
    }

    // Nothing new gets in once the receiver is closed; reject what is left.
    queue_rx.close();
    while let Some(task) = queue_rx.recv().await {
        shared.queued.fetch_sub(1, Ordering::SeqCst);
        task.reject();
    }
    debug!("scheduler stopped");
}

fn dispatch(shared: Arc<PoolShared>, task: SandboxTask, permit: OwnedSemaphorePermit) {
    shared.active().insert(task.id);
    debug!(task_id = task.id, "script admitted");

    tokio::spawn(async move {
        let _permit = permit;
        let outcome = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => Err(PoolError::Shutdown),
            result = shared.runner.run(&task.code, shared.config.limits) => Ok(result),
        };

        shared.active().remove(&task.id);
        match &outcome {
            Ok(result) => debug!(
                task_id = task.id,
                success = result.success,
                execution_time_ms = result.execution_time_ms,
                "script settled"
            ),
            Err(_) => debug!(task_id = task.id, "script aborted by shutdown"),
        }
        let _ = task.reply.send(outcome);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockScriptRunner;
    use serde_json::json;
    use std::time::Duration;

    fn pool_with(runner: Arc<MockScriptRunner>, max_workers: usize) -> SandboxPool {
        SandboxPool::new(
            PoolConfig {
                max_workers,
                ..PoolConfig::default()
            },
            runner,
        )
    }

    #[tokio::test]
    async fn submit_returns_runner_result() {
        let runner = Arc::new(MockScriptRunner::returning(json!(2)));
        let pool = pool_with(runner.clone(), 4);

        let result = pool.submit("1 + 1").await.unwrap();
        assert!(result.success);
        assert_eq!(result.result, Some(json!(2)));
        assert_eq!(runner.scripts(), vec!["1 + 1"]);
    }

    #[tokio::test]
    async fn ids_are_strictly_increasing() {
        let runner = Arc::new(MockScriptRunner::echoing());
        let pool = pool_with(runner, 2);

        let ids: Vec<u64> = (0..5)
            .map(|i| pool.enqueue(format!("{i}")).unwrap().id())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_max_workers() {
        let runner = Arc::new(MockScriptRunner::echoing().with_delay(Duration::from_millis(20)));
        let pool = Arc::new(pool_with(runner.clone(), 3));

        let submissions: Vec<Submission> = (0..12)
            .map(|i| pool.enqueue(format!("script {i}")).unwrap())
            .collect();

        let sampler = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut max_seen = 0;
                for _ in 0..40 {
                    max_seen = max_seen.max(pool.stats().active);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                max_seen
            })
        };

        for submission in submissions {
            assert!(submission.wait().await.unwrap().success);
        }

        assert!(sampler.await.unwrap() <= 3);
        assert!(runner.peak_concurrency() <= 3);
        assert_eq!(runner.call_count(), 12);
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn dispatch_follows_submission_order() {
        let runner = Arc::new(MockScriptRunner::echoing().with_delay(Duration::from_millis(1)));
        let pool = pool_with(runner.clone(), 1);

        let submissions: Vec<Submission> = (0..5)
            .map(|i| pool.enqueue(format!("s{i}")).unwrap())
            .collect();
        for submission in submissions {
            submission.wait().await.unwrap();
        }

        assert_eq!(runner.scripts(), vec!["s0", "s1", "s2", "s3", "s4"]);
    }

    #[tokio::test]
    async fn shutdown_rejects_in_flight_and_queued() {
        let runner = Arc::new(MockScriptRunner::hanging());
        let pool = pool_with(runner.clone(), 2);

        let submissions: Vec<Submission> =
            (0..6).map(|i| pool.enqueue(format!("{i}")).unwrap()).collect();

        // Let the scheduler admit the first two.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.stats().active, 2);

        pool.shutdown().await;

        for submission in submissions {
            let outcome = tokio::time::timeout(Duration::from_secs(1), submission.wait())
                .await
                .expect("submission must not hang after shutdown");
            assert_eq!(outcome, Err(PoolError::Shutdown));
        }
        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queued, 0);
        assert!(stats.shut_down);
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails_fast() {
        let pool = pool_with(Arc::new(MockScriptRunner::echoing()), 1);
        pool.shutdown().await;
        pool.shutdown().await;

        assert_eq!(pool.submit("1").await, Err(PoolError::Shutdown));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submitters_are_dispatched_in_id_order() {
        let runner = Arc::new(MockScriptRunner::echoing());
        let pool = Arc::new(pool_with(runner.clone(), 1));

        let submitters: Vec<_> = (0..8)
            .map(|t| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    (0..25)
                        .map(|n| {
                            let code = format!("t{t}-{n}");
                            (pool.enqueue(code.clone()).unwrap(), code)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut by_id = Vec::new();
        for submitter in submitters {
            for (submission, code) in submitter.await.unwrap() {
                by_id.push((submission.id(), code));
                submission.wait().await.unwrap();
            }
        }
        by_id.sort();

        let expected: Vec<String> = by_id.into_iter().map(|(_, code)| code).collect();
        assert_eq!(runner.scripts(), expected);
    }

    #[tokio::test]
    async fn failed_scripts_resolve_rather_than_reject() {
        let pool = pool_with(Arc::new(MockScriptRunner::failing("boom")), 1);
        let result = pool.submit("x").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn isolate_runner_end_to_end() {
        let pool = SandboxPool::new(PoolConfig::default(), Arc::new(crate::IsolateRunner));
        let ok = pool.enqueue("1 + 1").unwrap();
        let bad = pool.enqueue("1 + +").unwrap();

        assert_eq!(ok.wait().await.unwrap().result, Some(json!(2)));
        assert!(!bad.wait().await.unwrap().success);
    }

    #[test]
    fn zero_workers_is_clamped_to_one() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let pool = pool_with(Arc::new(MockScriptRunner::echoing()), 0);
            assert_eq!(pool.stats().max_workers, 1);
            assert_eq!(pool.submit("ok").await.unwrap().result, Some(json!("ok")));
        });
    }
}
