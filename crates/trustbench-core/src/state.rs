//! Evaluation run lifecycle states.

use crate::error::StepFault;
use crate::log::EvaluationLog;
use crate::protocol::Tick;
use std::fmt;

/// Lifecycle state of an evaluation run.
///
/// Exactly one variant describes a run at any time. Transitions are
/// one-way: `Idle` to `Running` to one of the three terminal variants.
/// Terminal states are immutable and never re-entered; a new run always
/// starts fresh with a new log.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationState {
    /// No run has ever started.
    Idle,

    /// A run is in progress. Carries no payload; progress lives with the
    /// executor, not in the state.
    Running,

    /// The loop reached the configured duration without interruption or
    /// fault. The log holds `duration × |metrics| × |services|` readings.
    Completed {
        /// The finished run's readings.
        log: EvaluationLog,
    },

    /// Cancellation was observed at `tick`, before that tick was stepped.
    /// The log holds all readings for ticks strictly before `tick`.
    Interrupted {
        /// Tick at which the cancellation was observed.
        tick: Tick,
        /// Readings collected before the interruption.
        log: EvaluationLog,
    },

    /// Stepping failed. No readings were recorded for the failing tick.
    Faulted {
        /// Tick at which the fault occurred; `None` when the worker died
        /// and the tick is unknown.
        tick: Option<Tick>,
        /// The underlying failure.
        error: StepFault,
    },
}

impl EvaluationState {
    /// Whether this state is terminal (`Completed`, `Interrupted` or
    /// `Faulted`).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EvaluationState::Completed { .. }
                | EvaluationState::Interrupted { .. }
                | EvaluationState::Faulted { .. }
        )
    }

    /// Whether a run is currently in progress.
    pub fn is_running(&self) -> bool {
        matches!(self, EvaluationState::Running)
    }

    /// The log carried by a terminal-with-data state.
    pub fn log(&self) -> Option<&EvaluationLog> {
        match self {
            EvaluationState::Completed { log } | EvaluationState::Interrupted { log, .. } => {
                Some(log)
            }
            _ => None,
        }
    }

    /// Seed of the run this state describes, when data is attached.
    pub fn seed(&self) -> Option<u64> {
        self.log().map(EvaluationLog::seed)
    }
}

impl fmt::Display for EvaluationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationState::Idle => write!(f, "idle"),
            EvaluationState::Running => write!(f, "running"),
            EvaluationState::Completed { log } => {
                write!(f, "completed ({} readings)", log.len())
            }
            EvaluationState::Interrupted { tick, log } => {
                write!(f, "interrupted at tick {tick} ({} readings)", log.len())
            }
            EvaluationState::Faulted { tick: Some(tick), error } => {
                write!(f, "faulted at tick {tick}: {error}")
            }
            EvaluationState::Faulted { tick: None, error } => {
                write!(f, "faulted: {error}")
            }
        }
    }
}
