//! Testing utilities for the capmap workspace
//!
//! Scripted oracles and small search-space fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use capmap_search::{
    EvaluationOracle, EvaluationRequest, OracleError, Outcome, PhaseConfig,
};
use capmap_tree::{Configuration, Difficulty, SpaceBounds, Tree};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a scripted oracle does for one call
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Reply(Outcome),
    /// Sleep (tokio time) before replying
    Delayed(Duration, Outcome),
    Fail(OracleError),
}

type Script = dyn Fn(&EvaluationRequest, usize) -> Step + Send + Sync;

/// Oracle driven by a closure of `(request, call index)`
///
/// Every request is recorded in call order.
pub struct ScriptedOracle {
    script: Box<Script>,
    calls: AtomicUsize,
    requests: Mutex<Vec<EvaluationRequest>>,
}

impl std::fmt::Debug for ScriptedOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedOracle")
            .field("calls", &self.calls.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ScriptedOracle {
    pub fn from_fn(script: impl Fn(&EvaluationRequest, usize) -> Step + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(outcome: Outcome) -> Self {
        Self::from_fn(move |_, _| Step::Reply(outcome))
    }

    /// Steps in call order, then `fallback` forever
    pub fn sequence(steps: Vec<Step>, fallback: Outcome) -> Self {
        Self::from_fn(move |_, call| steps.get(call).cloned().unwrap_or(Step::Reply(fallback)))
    }

    /// Pass below `hardest_passing`, fail at or above it
    pub fn passes_up_to(hardest_passing: Difficulty) -> Self {
        Self::from_fn(move |request, _| {
            if request.configuration.difficulty() <= hardest_passing {
                Step::Reply(Outcome::Pass)
            } else {
                Step::Reply(Outcome::Fail)
            }
        })
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<EvaluationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl EvaluationOracle for ScriptedOracle {
    async fn evaluate(
        &self,
        request: &EvaluationRequest,
        _timeout: Duration,
    ) -> Result<Outcome, OracleError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        match (self.script)(request, call) {
            Step::Reply(outcome) => Ok(outcome),
            Step::Delayed(delay, outcome) => {
                tokio::time::sleep(delay).await;
                Ok(outcome)
            }
            Step::Fail(error) => Err(error),
        }
    }
}

pub const CONCEPTS: [&str; 2] = ["functions", "loops"];
pub const LEVELS: [Difficulty; 2] = [Difficulty::Easy, Difficulty::Medium];

/// `{functions, loops} x {easy, medium}`
pub fn small_space() -> SpaceBounds {
    SpaceBounds::new(CONCEPTS, LEVELS)
}

/// Tree over [`small_space`] rooted at `{loops} @ easy`
pub fn small_tree() -> Tree {
    Tree::with_root(small_space(), root_configuration()).unwrap()
}

pub fn root_configuration() -> Configuration {
    Configuration::new(["loops"], Difficulty::Easy)
}

/// Seeded phase config that never explores randomly and never converges
pub fn greedy_phase(name: &str, max_iterations: u32) -> PhaseConfig {
    let mut config = PhaseConfig::new(name);
    config.phase_params.max_iterations = max_iterations;
    config.phase_params.exploration_probability = 0.0;
    config.phase_params.value_delta_threshold = 0.0;
    config.environment.seed = Some(7);
    config
}

/// Assert two floats are within `1e-9`
#[track_caller]
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
