//! Built-in synthetic protocol for exercising the evaluation core.
//!
//! Pairs a random-drift scenario (per-agent capabilities that wander over
//! time) with a simple experience-averaging trust model. Fully determined
//! by its seed, which makes it the reference stepper for the CLI and for
//! determinism tests. Real trust models and scenarios plug in through the
//! [`Protocol`] trait instead.

use crate::error::StepFault;
use crate::metric::MetricId;
use crate::protocol::{Protocol, ServiceId, Tick};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

/// How far a capability may wander per tick.
const DRIFT: f64 = 0.01;

/// Half-width of the noise band around an interaction outcome.
const NOISE: f64 = 0.1;

/// Seeded scenario + trust model over a single service.
///
/// Each agent has a latent capability in `[0, 1]`. Every tick the scenario
/// drifts capabilities, generates one noisy interaction outcome per agent,
/// and the trust model folds the outcome into a running-mean estimate.
pub struct SyntheticProtocol {
    rng: ChaCha8Rng,
    capabilities: Vec<f64>,
    estimates: Vec<f64>,
    experiences: Vec<u32>,
}

impl SyntheticProtocol {
    /// Name of the estimate-accuracy metric: `1 - mean |estimate - capability|`.
    pub const ACCURACY: &'static str = "accuracy";

    /// Name of the partner-selection utility metric: capability of the
    /// best-estimated agent, normalized by the best capability available.
    pub const UTILITY: &'static str = "utility";

    /// Build a protocol with `agents` agents, fully determined by `seed`.
    pub fn new(seed: u64, agents: usize) -> Self {
        assert!(agents >= 1, "synthetic protocol needs at least one agent");

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let capabilities: Vec<f64> = (0..agents).map(|_| rng.gen_range(0.0..=1.0)).collect();
        // the 0.5 ignorance prior counts as one pseudo-experience
        let estimates = vec![0.5; agents];
        let experiences = vec![1; agents];

        Self {
            rng,
            capabilities,
            estimates,
            experiences,
        }
    }

    /// The metric set this protocol can evaluate.
    pub fn metrics() -> BTreeSet<MetricId> {
        [Self::ACCURACY, Self::UTILITY]
            .into_iter()
            .map(MetricId::from)
            .collect()
    }

    fn accuracy(&self) -> f64 {
        let total: f64 = self
            .estimates
            .iter()
            .zip(&self.capabilities)
            .map(|(est, cap)| (est - cap).abs())
            .sum();
        1.0 - total / self.capabilities.len() as f64
    }

    fn utility(&self) -> f64 {
        let selected = self
            .estimates
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let best = self.capabilities.iter().fold(0.0_f64, |acc, &c| acc.max(c));
        if best == 0.0 {
            1.0
        } else {
            self.capabilities[selected] / best
        }
    }
}

impl Protocol for SyntheticProtocol {
    fn step(&mut self, _tick: Tick) -> Result<(), StepFault> {
        // drift, then one noisy interaction per agent in index order so the
        // RNG draw sequence is reproducible
        for i in 0..self.capabilities.len() {
            let drift = self.rng.gen_range(-DRIFT..=DRIFT);
            self.capabilities[i] = (self.capabilities[i] + drift).clamp(0.0, 1.0);

            let noise = self.rng.gen_range(-NOISE..=NOISE);
            let outcome = (self.capabilities[i] + noise).clamp(0.0, 1.0);

            self.experiences[i] += 1;
            let n = f64::from(self.experiences[i]);
            self.estimates[i] += (outcome - self.estimates[i]) / n;
        }
        Ok(())
    }

    fn services(&self) -> Vec<ServiceId> {
        vec![0]
    }

    fn value(&self, metric: &MetricId, _service: ServiceId) -> f64 {
        match metric.as_str() {
            Self::ACCURACY => self.accuracy(),
            Self::UTILITY => self.utility(),
            _ => f64::NAN,
        }
    }

    fn trust_model(&self) -> &str {
        "simple"
    }

    fn scenario(&self) -> &str {
        "random_drift"
    }
}
