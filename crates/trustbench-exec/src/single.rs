//! Single-run asynchronous executor.

use crate::pool::WorkerPool;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::debug;
use trustbench_core::{CancelHandle, EvaluationState, EvaluationTask, StepFault};

/// Runs one [`EvaluationTask`] at a time on the worker pool.
///
/// The observable state moves `Idle -> Running -> terminal` and holds the
/// terminal state until the next [`submit`](SingleRunExecutor::submit),
/// which starts a fresh `Running` transition.
pub struct SingleRunExecutor {
    pool: Arc<WorkerPool>,
    state: Arc<watch::Sender<EvaluationState>>,
}

impl SingleRunExecutor {
    /// Create an executor on `pool`. No run has started: state is `Idle`.
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        let (state, _) = watch::channel(EvaluationState::Idle);
        Self {
            pool,
            state: Arc::new(state),
        }
    }

    /// Snapshot of the current run state. Never blocks.
    pub fn state(&self) -> EvaluationState {
        self.state.borrow().clone()
    }

    /// Start `task` on a worker and return its handle.
    ///
    /// The terminal state is delivered exactly once, through
    /// [`RunHandle::wait`] and the executor's observable state. Must be
    /// called from within a Tokio runtime.
    pub fn submit(&self, task: EvaluationTask) -> RunHandle {
        let seed = task.seed();
        let cancel = task.cancel_handle();
        debug!(seed, "submitting evaluation run");

        self.state.send_replace(EvaluationState::Running);

        let (done_tx, done_rx) = oneshot::channel();
        let state = Arc::clone(&self.state);
        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            let outcome = pool.execute(task).await;
            debug!(seed, %outcome, "evaluation run resolved");
            state.send_replace(outcome.clone());
            let _ = done_tx.send(outcome);
        });

        RunHandle {
            done: done_rx,
            cancel,
            state: self.state.subscribe(),
        }
    }
}

/// Handle to one submitted run.
pub struct RunHandle {
    done: oneshot::Receiver<EvaluationState>,
    cancel: CancelHandle,
    state: watch::Receiver<EvaluationState>,
}

impl RunHandle {
    /// Request cooperative cancellation of the run.
    ///
    /// Idempotent and safe from any thread; a no-op once the run has
    /// resolved. The run resolves `Interrupted` at its next tick boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A cloneable cancellation handle that outlives this run handle.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Snapshot of the run's current state. Never blocks.
    pub fn state(&self) -> EvaluationState {
        self.state.borrow().clone()
    }

    /// Wait for the run's terminal state (opt-in blocking point).
    pub async fn wait(self) -> EvaluationState {
        match self.done.await {
            Ok(state) => state,
            // the executor task is never dropped before sending; if the
            // runtime is torn down mid-run, surface it as a worker fault
            Err(_) => EvaluationState::Faulted {
                tick: None,
                error: StepFault::Worker("executor dropped before delivering a result".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use trustbench_core::{MetricId, Protocol, ServiceId, SyntheticProtocol, Tick};

    /// Stepper that sleeps each tick so tests can cancel mid-run.
    struct Sleepy {
        per_tick: Duration,
    }

    impl Protocol for Sleepy {
        fn step(&mut self, _tick: Tick) -> Result<(), StepFault> {
            std::thread::sleep(self.per_tick);
            Ok(())
        }

        fn services(&self) -> Vec<ServiceId> {
            vec![0]
        }

        fn value(&self, _metric: &MetricId, _service: ServiceId) -> f64 {
            1.0
        }

        fn trust_model(&self) -> &str {
            "sleepy-model"
        }

        fn scenario(&self) -> &str {
            "sleepy-scenario"
        }
    }

    /// Stepper that panics instead of returning an error.
    struct Panicky;

    impl Protocol for Panicky {
        fn step(&mut self, _tick: Tick) -> Result<(), StepFault> {
            panic!("stepper blew up");
        }

        fn services(&self) -> Vec<ServiceId> {
            vec![0]
        }

        fn value(&self, _metric: &MetricId, _service: ServiceId) -> f64 {
            0.0
        }

        fn trust_model(&self) -> &str {
            "panicky-model"
        }

        fn scenario(&self) -> &str {
            "panicky-scenario"
        }
    }

    fn metric_set() -> BTreeSet<MetricId> {
        [MetricId::new("m")].into_iter().collect()
    }

    fn synthetic_task(seed: u64, duration: Tick) -> EvaluationTask {
        EvaluationTask::new(
            Box::new(SyntheticProtocol::new(seed, 5)),
            duration,
            SyntheticProtocol::metrics(),
            seed,
        )
    }

    #[tokio::test]
    async fn test_state_is_idle_before_any_submit() {
        let executor = SingleRunExecutor::new(Arc::new(WorkerPool::new(1)));
        assert_eq!(executor.state(), EvaluationState::Idle);
    }

    #[tokio::test]
    async fn test_submit_runs_to_completion() {
        let executor = SingleRunExecutor::new(Arc::new(WorkerPool::new(1)));
        let handle = executor.submit(synthetic_task(5, 20));

        let state = handle.wait().await;
        match &state {
            EvaluationState::Completed { log } => {
                // duration x 2 metrics x 1 service
                assert_eq!(log.len(), 40);
                assert_eq!(log.seed(), 5);
            }
            other => panic!("expected completed, got {other}"),
        }

        // executor holds the terminal state after resolution
        assert_eq!(executor.state(), state);
    }

    #[tokio::test]
    async fn test_state_is_running_between_submit_and_resolution() {
        let executor = SingleRunExecutor::new(Arc::new(WorkerPool::new(1)));
        let task = EvaluationTask::new(
            Box::new(Sleepy {
                per_tick: Duration::from_millis(20),
            }),
            1_000,
            metric_set(),
            1,
        );

        let handle = executor.submit(task);
        assert!(executor.state().is_running());
        assert!(handle.state().is_running());

        handle.cancel();
        let state = handle.wait().await;
        assert!(matches!(state, EvaluationState::Interrupted { .. }));
    }

    #[tokio::test]
    async fn test_cancel_before_first_tick_yields_empty_log() {
        let executor = SingleRunExecutor::new(Arc::new(WorkerPool::new(1)));
        let task = synthetic_task(9, 500);

        // cancellation requested before the worker ever steps
        task.cancel_handle().cancel();
        let state = executor.submit(task).wait().await;

        match state {
            EvaluationState::Interrupted { tick, log } => {
                assert_eq!(tick, 1);
                assert!(log.is_empty());
            }
            other => panic!("expected interrupted, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_mid_run_cancel_keeps_whole_ticks() {
        let executor = SingleRunExecutor::new(Arc::new(WorkerPool::new(1)));
        let task = EvaluationTask::new(
            Box::new(Sleepy {
                per_tick: Duration::from_millis(10),
            }),
            1_000,
            metric_set(),
            1,
        );

        let handle = executor.submit(task);
        tokio::time::sleep(Duration::from_millis(35)).await;
        handle.cancel();

        match handle.wait().await {
            EvaluationState::Interrupted { tick, log } => {
                assert!(tick >= 1);
                // one metric, one service: one reading per completed tick
                assert_eq!(log.len(), (tick - 1) as usize);
            }
            other => panic!("expected interrupted, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_stepper_panic_resolves_faulted_with_unknown_tick() {
        let executor = SingleRunExecutor::new(Arc::new(WorkerPool::new(1)));
        let task = EvaluationTask::new(Box::new(Panicky), 10, metric_set(), 1);

        match executor.submit(task).wait().await {
            EvaluationState::Faulted { tick, error } => {
                assert_eq!(tick, None);
                assert!(matches!(error, StepFault::Worker(_)));
            }
            other => panic!("expected faulted, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_after_resolution_is_a_no_op() {
        let executor = SingleRunExecutor::new(Arc::new(WorkerPool::new(1)));
        let handle = executor.submit(synthetic_task(2, 5));
        let cancel = handle.cancel_handle();

        let state = handle.wait().await;
        assert!(state.is_terminal());

        cancel.cancel();
        cancel.cancel();
        assert_eq!(executor.state(), state);
    }

    #[tokio::test]
    async fn test_resubmit_starts_a_fresh_running_transition() {
        let executor = SingleRunExecutor::new(Arc::new(WorkerPool::new(1)));

        let first = executor.submit(synthetic_task(1, 5)).wait().await;
        assert!(first.is_terminal());

        let handle = executor.submit(synthetic_task(2, 5));
        let second = handle.wait().await;
        assert!(second.is_terminal());
        assert_ne!(first.seed(), second.seed());
    }
}
