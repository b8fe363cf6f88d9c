//! The evaluation protocol seam.
//!
//! A protocol combines a trust model and a scenario into a simulation that
//! advances one tick at a time. Concrete trust models, scenarios and metric
//! formulas are external; the core only drives the loop and reads values.

use crate::error::StepFault;
use crate::metric::MetricId;
use serde::{Deserialize, Serialize};

/// One discrete simulation time step, 1-indexed.
pub type Tick = u32;

/// Index of one evaluated entity within the scenario at a given tick.
pub type ServiceId = u32;

/// A trust-model/scenario pairing advanced one tick at a time.
///
/// Implementations carry internal mutable simulation state and are not safe
/// for concurrent stepping; every evaluation task must own a fresh instance.
/// Seeding happens externally, before the protocol is handed to a task.
pub trait Protocol: Send {
    /// Advance the simulated state for `tick`.
    ///
    /// On `Err` the run stops immediately and resolves to
    /// [`EvaluationState::Faulted`](crate::EvaluationState::Faulted); no
    /// readings are recorded for the failing tick.
    fn step(&mut self, tick: Tick) -> Result<(), StepFault>;

    /// Service indices present in the current snapshot.
    fn services(&self) -> Vec<ServiceId>;

    /// Read one metric value for `service` from the current snapshot.
    ///
    /// Called synchronously after every successful [`step`](Protocol::step),
    /// once per (metric, service) pair.
    fn value(&self, metric: &MetricId, service: ServiceId) -> f64;

    /// Name of the trust model under evaluation.
    fn trust_model(&self) -> &str;

    /// Name of the scenario the model is evaluated in.
    fn scenario(&self) -> &str;
}

/// Identity of the protocol a log was recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    /// Trust model name.
    pub trust_model: String,

    /// Scenario name.
    pub scenario: String,
}

impl ProtocolInfo {
    /// Capture the identity of a protocol instance.
    pub fn of(protocol: &dyn Protocol) -> Self {
        Self {
            trust_model: protocol.trust_model().to_string(),
            scenario: protocol.scenario().to_string(),
        }
    }
}
