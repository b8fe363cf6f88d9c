//! Metric identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one metric evaluated against the simulation snapshot.
///
/// Metric computation itself is owned by the protocol; the core only needs
/// a stable, ordered identifier so that readings can be attributed and the
/// per-tick (metric, service) enumeration order is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(String);

impl MetricId {
    /// Create a metric identifier from a display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The metric's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetricId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
