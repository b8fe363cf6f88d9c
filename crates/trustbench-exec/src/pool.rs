//! Bounded worker capacity for evaluation runs.

use std::sync::Arc;
use std::thread;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::warn;
use trustbench_core::{EvaluationState, EvaluationTask, StepFault};

/// Explicit worker capacity shared by the executors.
///
/// A single run occupies one worker; a batch of N runs occupies up to N.
/// Tasks beyond the capacity queue on the internal semaphore; none start
/// before submission and none are dropped. The pool is passed into executor
/// constructors by the owning process rather than living as a process-wide
/// singleton.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool with room for `capacity` concurrent runs.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "worker pool needs at least one worker");
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Create a pool sized to the machine's available parallelism.
    pub fn with_hardware_parallelism() -> Self {
        let capacity = thread::available_parallelism().map(usize::from).unwrap_or(1);
        Self::new(capacity)
    }

    /// Number of runs this pool executes concurrently.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run one task to its terminal state on a blocking worker thread.
    ///
    /// Waits for a worker slot, then drives `task.run()` via
    /// `spawn_blocking`. Any panic or join failure is wrapped as
    /// `Faulted { tick: None }` so callers always receive exactly one
    /// terminal state.
    pub(crate) async fn execute(&self, task: EvaluationTask) -> EvaluationState {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // the pool's semaphore is never closed; treat it as a
                // worker failure rather than panicking across the boundary
                return EvaluationState::Faulted {
                    tick: None,
                    error: StepFault::Worker("worker pool closed".to_string()),
                };
            }
        };

        let outcome = task::spawn_blocking(move || task.run()).await;
        drop(permit);

        match outcome {
            Ok(state) => {
                assert!(state.is_terminal(), "task resolved to a non-terminal state");
                state
            }
            Err(join_error) => {
                warn!(%join_error, "evaluation worker died");
                EvaluationState::Faulted {
                    tick: None,
                    error: StepFault::Worker(join_error.to_string()),
                }
            }
        }
    }
}
