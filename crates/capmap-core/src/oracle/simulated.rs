use async_trait::async_trait;
use capmap_search::{EvaluationOracle, EvaluationRequest, OracleError, Outcome};
use capmap_tree::Difficulty;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Deterministic stand-in for the evaluation service
///
/// The pass probability falls with the difficulty level and with every
/// concept beyond the first. The same `(seed, phase, node, instance)` always
/// yields the same outcome.
#[derive(Debug, Clone)]
pub struct SimulatedOracle {
    seed: u64,
    skill: f64,
    latency: Duration,
}

impl SimulatedOracle {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            skill: 0.9,
            latency: Duration::ZERO,
        }
    }

    /// Pass probability of a single-concept `very_easy` challenge
    #[must_use]
    pub fn with_skill(mut self, skill: f64) -> Self {
        self.skill = skill.clamp(0.0, 1.0);
        self
    }

    /// Simulated time per evaluation
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Probability that `request` passes
    #[must_use]
    pub fn pass_probability(&self, request: &EvaluationRequest) -> f64 {
        let level = Difficulty::ALL
            .iter()
            .position(|d| *d == request.configuration.difficulty())
            .unwrap_or(0);
        let extra_concepts = request.configuration.concepts().len().saturating_sub(1);
        (self.skill - 0.15 * level as f64 - 0.05 * extra_concepts as f64).clamp(0.05, 0.95)
    }

    fn stream_seed(&self, request: &EvaluationRequest) -> u64 {
        let phase = request
            .phase
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3));
        let slot = (u64::from(request.node.0) << 32) | u64::from(request.instance);
        self.seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ phase ^ slot
    }
}

#[async_trait]
impl EvaluationOracle for SimulatedOracle {
    async fn evaluate(
        &self,
        request: &EvaluationRequest,
        _timeout: Duration,
    ) -> Result<Outcome, OracleError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let p = self.pass_probability(request);
        let roll: f64 = StdRng::seed_from_u64(self.stream_seed(request)).random();
        let outcome = if roll < p {
            Outcome::Pass
        } else if roll < p + 0.05 {
            Outcome::FixedByExternalFixer
        } else if roll < p + 0.08 {
            Outcome::Error
        } else {
            Outcome::Fail
        };
        Ok(outcome)
    }
}
