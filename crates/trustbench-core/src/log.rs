//! Per-run reading accumulation.

use crate::metric::MetricId;
use crate::protocol::{ProtocolInfo, ServiceId, Tick};
use serde::{Deserialize, Serialize};

/// One recorded (tick, metric, service, value) sample.
///
/// Exactly one reading exists per (tick, metric, service) triple in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Tick the sample was taken at, 1-indexed.
    pub tick: Tick,

    /// Metric the value belongs to.
    pub metric: MetricId,

    /// Service the value was read for.
    pub service: ServiceId,

    /// Sampled metric value.
    pub value: f64,
}

/// Ordered accumulator of [`Reading`]s for one evaluation run.
///
/// Owns the run's identity: the protocol names, the metric set in its fixed
/// enumeration order, and the seed. Append-only while the run is in flight;
/// once a terminal state wraps the log it is never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationLog {
    protocol: ProtocolInfo,
    metrics: Vec<MetricId>,
    readings: Vec<Reading>,
    seed: u64,
}

impl EvaluationLog {
    /// Create an empty log for a run.
    ///
    /// `metrics` must already be in the enumeration order chosen at task
    /// construction; the log preserves it verbatim.
    pub fn new(protocol: ProtocolInfo, metrics: Vec<MetricId>, seed: u64) -> Self {
        Self {
            protocol,
            metrics,
            readings: Vec::new(),
            seed,
        }
    }

    /// Append one reading.
    ///
    /// Ticks must be non-decreasing across appends; a violation is a defect
    /// in the evaluation loop, not a recoverable condition.
    pub(crate) fn append(&mut self, reading: Reading) {
        assert!(
            self.readings
                .last()
                .map_or(true, |last| last.tick <= reading.tick),
            "readings must be appended in tick order"
        );
        self.readings.push(reading);
    }

    /// Identity of the protocol this log was recorded against.
    pub fn protocol(&self) -> &ProtocolInfo {
        &self.protocol
    }

    /// The metric set in its fixed enumeration order.
    pub fn metrics(&self) -> &[MetricId] {
        &self.metrics
    }

    /// All readings, in tick order.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Seed identifying the run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of readings collected so far.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether no readings have been collected.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Highest tick any reading was recorded for.
    pub fn last_tick(&self) -> Option<Tick> {
        self.readings.last().map(|r| r.tick)
    }
}
