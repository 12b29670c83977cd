//! Capmap Search
//!
//! Multi-phase Monte Carlo Tree Search over a [`capmap_tree::Tree`].
//!
//! # Core Concepts
//!
//! - [`scorer`]: UCB1 with virtual visits and the outcome-to-delta table
//! - [`StrategyRegistry`]: select / expand / score strategies keyed by phase name
//! - [`PhaseEngine`]: the iteration loop, with bounded concurrent oracle calls
//! - [`PhaseState`]: `Initialized -> Running -> {Converged, Exhausted, Failed}`
//! - [`EvaluationOracle`]: the external service that judges configurations
//!
//! # Example
//!
//! ```rust,no_run
//! use capmap_search::{EvaluationOracle, PhaseConfig, PhaseEngine, StrategyRegistry};
//! use capmap_tree::Tree;
//! use std::sync::Arc;
//!
//! async fn run_phase(tree: &mut Tree, oracle: Arc<dyn EvaluationOracle>) {
//!     let mut engine = PhaseEngine::new(
//!         PhaseConfig::new("phase_1"),
//!         &StrategyRegistry::with_defaults(),
//!         oracle,
//!     )
//!     .unwrap();
//!     let outcome = engine.run(tree).await.unwrap();
//!     println!("{} after {} iterations", outcome.state, outcome.iterations);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
mod convergence;
mod engine;
mod error;
mod oracle;
pub mod phases;
pub mod registry;
pub mod scorer;
mod state_machine;
mod strategy;

pub use config::{CarryOver, Environment, PhaseConfig, PhaseParams, ScoringParams, SearchParams};
pub use convergence::ConvergenceMonitor;
pub use engine::{PhaseEngine, PhaseOutcome, PhaseRun};
pub use error::{ConfigError, SearchError};
pub use oracle::{EvaluationOracle, EvaluationRequest, OracleError, Outcome};
pub use registry::{Strategy, StrategyRegistry, StrategyRole};
pub use scorer::{apply_outcome, best_by_ucb, ucb_score, ucb_score_with_pending, Polarity};
pub use state_machine::{allowed_transitions, validate_transition, PhaseState};
pub use strategy::{
    ExpandStrategy, Expansion, Frontier, FrontierEntry, ScoreStrategy, ScoreTarget, SearchContext,
    SelectStrategy, StrategySet,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
