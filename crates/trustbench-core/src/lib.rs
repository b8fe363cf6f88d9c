//! trustbench core library
//!
//! Evaluates a pluggable trust model against a pluggable scenario by
//! stepping a discrete-time simulation and sampling a set of metrics at
//! every tick. This crate holds the evaluation domain model: the
//! [`Protocol`] stepper seam, the cancellable [`EvaluationTask`], the
//! [`EvaluationState`] lifecycle machine, the per-run [`EvaluationLog`],
//! and CSV/JSON export of finished logs.
//!
//! Executors that drive tasks on worker threads live in `trustbench-exec`.

pub mod error;
pub mod export;
pub mod log;
pub mod metric;
pub mod protocol;
pub mod state;
pub mod synthetic;
pub mod task;

pub use error::StepFault;
pub use export::{save_csv, save_json, write_csv, write_json, ExportError};
pub use log::{EvaluationLog, Reading};
pub use metric::MetricId;
pub use protocol::{Protocol, ProtocolInfo, ServiceId, Tick};
pub use state::EvaluationState;
pub use synthetic::SyntheticProtocol;
pub use task::{CancelHandle, EvaluationTask};
