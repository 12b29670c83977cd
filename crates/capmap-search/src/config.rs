//! Per-phase configuration and its validation
//!
//! Every section carries serde defaults so a session document only needs to
//! spell out what differs. Durations are written as seconds (floats allowed).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Search-shape parameters of one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseParams {
    /// Deepest level new children may be created at
    pub max_depth: usize,
    /// Hard cap on iterations
    pub max_iterations: u32,
    /// Minimum mean value for phase-3 candidates
    pub performance_threshold: f64,
    /// Aggregate change below which an iteration counts as stable
    pub value_delta_threshold: f64,
    /// Consecutive stable iterations required to converge
    pub convergence_checks: u32,
    /// Probability of a random pick instead of the UCB pick
    pub exploration_probability: f64,
    /// Frontier size per iteration, also the per-node child cap
    pub num_nodes_per_iteration: usize,
    /// Bound on a single oracle call
    #[serde(with = "duration_secs")]
    pub task_timeout: Duration,
}

impl Default for PhaseParams {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_iterations: 50,
            performance_threshold: 0.0,
            value_delta_threshold: 0.01,
            convergence_checks: 5,
            exploration_probability: 0.2,
            num_nodes_per_iteration: 3,
            task_timeout: Duration::from_secs(120),
        }
    }
}

/// UCB and backpropagation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// UCB exploration constant `c`
    pub exploration_weight: f64,
    /// Per-level decay applied while backpropagating
    pub discount_factor: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            exploration_weight: std::f64::consts::SQRT_2,
            discount_factor: 0.9,
        }
    }
}

/// Outcome-to-delta table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    /// Delta for a pass, up to `max_num_passed` passes
    pub reward_per_pass: f64,
    /// Delta for a failed challenge
    pub penalty_per_failure: f64,
    /// Delta for an errored or timed-out evaluation
    pub penalty_per_error: f64,
    /// Applied when the external fixer had to repair the attempt
    pub penalty_per_attempt: f64,
    /// Passes on one node beyond this count score zero
    pub max_num_passed: u32,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            reward_per_pass: 0.1,
            penalty_per_failure: -0.1,
            penalty_per_error: -0.15,
            penalty_per_attempt: -0.05,
            max_num_passed: 5,
        }
    }
}

/// Where and how evaluations run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Base URL of the evaluation service
    pub oracle_endpoint: Option<String>,
    /// Bound on a whole iteration
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Oracle calls in flight at once
    pub max_concurrent_tasks: usize,
    /// Seed for the selection RNG; entropy when absent
    pub seed: Option<u64>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            oracle_endpoint: None,
            timeout: Duration::from_secs(600),
            max_concurrent_tasks: 8,
            seed: None,
        }
    }
}

/// What a phase inherits from the tree left by the previous phase
///
/// Written as `keep` or as `{ filter: { min_mean_value: 0.2 } }`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "CarryOverRepr", into = "CarryOverRepr")]
pub enum CarryOver {
    /// Whole tree
    #[default]
    Keep,
    /// Root plus every node whose mean value exceeds the threshold
    Filter { min_mean_value: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum CarryOverRepr {
    Mode(String),
    Filter { filter: FilterRepr },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FilterRepr {
    min_mean_value: f64,
}

impl TryFrom<CarryOverRepr> for CarryOver {
    type Error = String;

    fn try_from(repr: CarryOverRepr) -> Result<Self, Self::Error> {
        match repr {
            CarryOverRepr::Mode(mode) if mode == "keep" => Ok(Self::Keep),
            CarryOverRepr::Mode(other) => Err(format!("unknown carry_over mode `{other}`")),
            CarryOverRepr::Filter { filter } => Ok(Self::Filter {
                min_mean_value: filter.min_mean_value,
            }),
        }
    }
}

impl From<CarryOver> for CarryOverRepr {
    fn from(carry: CarryOver) -> Self {
        match carry {
            CarryOver::Keep => Self::Mode("keep".to_string()),
            CarryOver::Filter { min_mean_value } => Self::Filter {
                filter: FilterRepr { min_mean_value },
            },
        }
    }
}

/// Full configuration of one named phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Registry key of the phase's strategies
    pub name: String,
    /// Loop limits and thresholds
    #[serde(default)]
    pub phase_params: PhaseParams,
    /// UCB and backpropagation constants
    #[serde(default)]
    pub search_params: SearchParams,
    /// Outcome delta table
    #[serde(default)]
    pub scoring_params: ScoringParams,
    /// Oracle endpoint, deadlines and seed
    #[serde(default)]
    pub environment: Environment,
    /// What of the inherited tree this phase starts from
    #[serde(default)]
    pub carry_over: CarryOver,
}

impl PhaseConfig {
    /// Defaults for every section
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase_params: PhaseParams::default(),
            search_params: SearchParams::default(),
            scoring_params: ScoringParams::default(),
            environment: Environment::default(),
            carry_over: CarryOver::default(),
        }
    }

    /// Check every numeric range
    ///
    /// # Errors
    /// The first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.phase_params;
        let s = &self.search_params;
        let sc = &self.scoring_params;
        let env = &self.environment;

        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }

        at_least("phase_params.max_depth", p.max_depth as u64, 1)?;
        at_least("phase_params.max_iterations", u64::from(p.max_iterations), 1)?;
        at_least("phase_params.convergence_checks", u64::from(p.convergence_checks), 1)?;
        at_least("phase_params.num_nodes_per_iteration", p.num_nodes_per_iteration as u64, 1)?;
        at_least("environment.max_concurrent_tasks", env.max_concurrent_tasks as u64, 1)?;

        finite("phase_params.performance_threshold", p.performance_threshold)?;
        finite("phase_params.value_delta_threshold", p.value_delta_threshold)?;
        if p.value_delta_threshold < 0.0 {
            return Err(ConfigError::invalid("phase_params.value_delta_threshold", "must be >= 0"));
        }
        finite("phase_params.exploration_probability", p.exploration_probability)?;
        if !(0.0..=1.0).contains(&p.exploration_probability) {
            return Err(ConfigError::invalid(
                "phase_params.exploration_probability",
                "must lie in [0, 1]",
            ));
        }

        finite("search_params.exploration_weight", s.exploration_weight)?;
        if s.exploration_weight < 0.0 {
            return Err(ConfigError::invalid("search_params.exploration_weight", "must be >= 0"));
        }
        finite("search_params.discount_factor", s.discount_factor)?;
        if s.discount_factor <= 0.0 || s.discount_factor > 1.0 {
            return Err(ConfigError::invalid("search_params.discount_factor", "must lie in (0, 1]"));
        }

        finite("scoring_params.reward_per_pass", sc.reward_per_pass)?;
        finite("scoring_params.penalty_per_failure", sc.penalty_per_failure)?;
        finite("scoring_params.penalty_per_error", sc.penalty_per_error)?;
        finite("scoring_params.penalty_per_attempt", sc.penalty_per_attempt)?;

        positive("phase_params.task_timeout", p.task_timeout)?;
        positive("environment.timeout", env.timeout)?;

        if let CarryOver::Filter { min_mean_value } = self.carry_over {
            finite("carry_over.filter.min_mean_value", min_mean_value)?;
        }
        Ok(())
    }
}

fn at_least(field: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::invalid(field, format!("must be >= {min}, got {value}")));
    }
    Ok(())
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::invalid(field, "must be finite"));
    }
    Ok(())
}

fn positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::invalid(field, "must be > 0"));
    }
    Ok(())
}

/// Serde adapter: `Duration` as (fractional) seconds
pub mod duration_secs {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Write seconds as `f64`
    ///
    /// # Errors
    /// Propagates serializer failures
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    /// Read seconds, integer or float
    ///
    /// # Errors
    /// Negative, non-finite or overflowing values
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}
