//! trustbench executors
//!
//! Drives [`EvaluationTask`](trustbench_core::EvaluationTask)s to their
//! terminal states on a bounded worker pool:
//!
//! - [`WorkerPool`]: explicit worker capacity shared by the executors,
//!   never a hidden process-wide singleton.
//! - [`SingleRunExecutor`]: one task at a time, observable
//!   `Idle -> Running -> terminal` state, cancel handle, opt-in await.
//! - [`BatchExecutor`]: N independent tasks, per-task progress in arrival
//!   order, one aggregate completion in submission order, cancel-all.
//!
//! All submission entry points must be called from within a Tokio runtime;
//! the step loops themselves run on blocking worker threads.

pub mod batch;
pub mod pool;
pub mod single;

pub use batch::{BatchExecutor, BatchHandle, CancelAll};
pub use pool::WorkerPool;
pub use single::{RunHandle, SingleRunExecutor};
