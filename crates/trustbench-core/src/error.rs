//! Fault taxonomy for evaluation runs.

use thiserror::Error;

/// An unrecoverable error raised while stepping an evaluation protocol.
///
/// A fault stops the run at the tick it occurred and resolves the task to
/// [`EvaluationState::Faulted`](crate::EvaluationState::Faulted). Faults are
/// never retried and never propagate to sibling runs in a batch.
///
/// Cloneable so a terminal state can be handed to multiple observers
/// (progress callback, aggregate callback, state snapshots).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepFault {
    /// The scenario failed to advance its simulated state.
    #[error("scenario error: {0}")]
    Scenario(String),

    /// The trust model failed to process the tick's experiences or opinions.
    #[error("trust model error: {0}")]
    TrustModel(String),

    /// A metric could not be evaluated against the current snapshot.
    #[error("metric error: {0}")]
    Metric(String),

    /// The worker executing the run died (panic or executor failure).
    ///
    /// Only produced by the executors' defensive wrap; the tick is unknown
    /// in this case.
    #[error("worker error: {0}")]
    Worker(String),
}
