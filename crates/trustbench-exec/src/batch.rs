//! Batch executor: N independent runs, aggregate completion.

use crate::pool::WorkerPool;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use trustbench_core::{CancelHandle, EvaluationState, EvaluationTask, StepFault};

/// Cancels every task of one batch.
///
/// Cloneable so it can outlive the [`BatchHandle`] (e.g. wired to a signal
/// handler). Tasks already resolved are unaffected; running tasks resolve
/// `Interrupted` at their next tick boundary. Calling after the aggregate
/// completion is a guaranteed no-op.
#[derive(Debug, Clone)]
pub struct CancelAll {
    handles: Arc<Vec<CancelHandle>>,
}

impl CancelAll {
    /// Request cancellation of every task in the batch. Idempotent.
    pub fn cancel_all(&self) {
        for handle in self.handles.iter() {
            handle.cancel();
        }
    }
}

/// Handle to one running batch.
pub struct BatchHandle {
    cancel: CancelAll,
    finished: oneshot::Receiver<Vec<EvaluationState>>,
    len: usize,
}

impl BatchHandle {
    /// Request cancellation of every task in the batch.
    pub fn cancel_all(&self) {
        self.cancel.cancel_all();
    }

    /// A cloneable cancel-all handle that outlives this batch handle.
    pub fn canceller(&self) -> CancelAll {
        self.cancel.clone()
    }

    /// Number of tasks submitted with the batch.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the batch was submitted empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Wait for every task's terminal state, in submission order (opt-in
    /// all-of join).
    pub async fn join(self) -> Vec<EvaluationState> {
        match self.finished.await {
            Ok(results) => results,
            // only reachable if the runtime is torn down mid-batch
            Err(_) => (0..self.len)
                .map(|_| EvaluationState::Faulted {
                    tick: None,
                    error: StepFault::Worker(
                        "batch aggregator dropped before delivering results".to_string(),
                    ),
                })
                .collect(),
        }
    }
}

/// Runs batches of independent [`EvaluationTask`]s on the worker pool.
///
/// Tasks must not share protocol instances: steppers carry mutable
/// simulation state and are not safe for concurrent stepping, so batch
/// construction builds a fresh instance per task.
pub struct BatchExecutor {
    pool: Arc<WorkerPool>,
}

impl BatchExecutor {
    /// Create a batch executor on `pool`.
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    /// Start every task and return the batch handle.
    ///
    /// `on_progress` fires exactly once per task, as each resolves, in
    /// arrival order (not submission order). `on_finished` fires exactly
    /// once, after all tasks have resolved, with terminal states in
    /// submission order, possibly a mix of `Completed`, `Interrupted`
    /// and `Faulted`; one faulted task never affects its siblings.
    ///
    /// Parallelism is bounded by the pool capacity; excess tasks queue.
    /// Must be called from within a Tokio runtime.
    pub fn run_batch<P, F>(
        &self,
        tasks: Vec<EvaluationTask>,
        mut on_progress: P,
        on_finished: F,
    ) -> BatchHandle
    where
        P: FnMut(EvaluationState) + Send + 'static,
        F: FnOnce(Vec<EvaluationState>) + Send + 'static,
    {
        let len = tasks.len();
        let cancel = CancelAll {
            handles: Arc::new(tasks.iter().map(EvaluationTask::cancel_handle).collect()),
        };
        info!(tasks = len, "starting batch");

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, EvaluationState)>();
        for (index, task) in tasks.into_iter().enumerate() {
            let pool = Arc::clone(&self.pool);
            let result_tx = result_tx.clone();
            tokio::spawn(async move {
                let state = pool.execute(task).await;
                let _ = result_tx.send((index, state));
            });
        }
        // every worker task owns one sender clone; the channel closes once
        // all of them have reported
        drop(result_tx);

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let mut slots: Vec<Option<EvaluationState>> = (0..len).map(|_| None).collect();
            while let Some((index, state)) = result_rx.recv().await {
                debug!(index, %state, "batch task resolved");
                on_progress(state.clone());
                assert!(slots[index].is_none(), "batch task resolved twice");
                slots[index] = Some(state);
            }

            let results: Vec<EvaluationState> = slots
                .into_iter()
                .map(|slot| {
                    slot.unwrap_or_else(|| EvaluationState::Faulted {
                        tick: None,
                        error: StepFault::Worker("worker vanished before reporting".to_string()),
                    })
                })
                .collect();

            info!(tasks = len, "batch finished");
            on_finished(results.clone());
            let _ = done_tx.send(results);
        });

        BatchHandle {
            cancel,
            finished: done_rx,
            len,
        }
    }
}
