//! Strategy registry keyed by `(phase name, role)`
//!
//! Provides [`StrategyRegistry`] plus one process-wide instance installed
//! before any phase runs and read-only afterwards.

use crate::error::SearchError;
use crate::phases;
use crate::strategy::{ExpandStrategy, ScoreStrategy, SelectStrategy, StrategySet};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which hook of a phase a strategy fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyRole {
    /// Picks the node to work on
    Select,
    /// Proposes what to evaluate for a node
    Expand,
    /// Turns an outcome into a value delta
    Score,
}

impl StrategyRole {
    /// All roles, in lifecycle order
    pub const ALL: [StrategyRole; 3] = [Self::Select, Self::Expand, Self::Score];

    /// Lowercase role name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Expand => "expand",
            Self::Score => "score",
        }
    }
}

impl fmt::Display for StrategyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "select" => Ok(Self::Select),
            "expand" => Ok(Self::Expand),
            "score" => Ok(Self::Score),
            other => Err(format!("unknown strategy role `{other}`")),
        }
    }
}

/// A registered strategy of any role
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Selection strategy
    Select(Arc<dyn SelectStrategy>),
    /// Expansion strategy
    Expand(Arc<dyn ExpandStrategy>),
    /// Scoring strategy
    Score(Arc<dyn ScoreStrategy>),
}

impl Strategy {
    /// Role this strategy fills
    #[must_use]
    pub fn role(&self) -> StrategyRole {
        match self {
            Self::Select(_) => StrategyRole::Select,
            Self::Expand(_) => StrategyRole::Expand,
            Self::Score(_) => StrategyRole::Score,
        }
    }

    /// Name of the wrapped strategy
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Select(s) => s.name(),
            Self::Expand(s) => s.name(),
            Self::Score(s) => s.name(),
        }
    }
}

/// Strategies per phase and role
#[derive(Debug, Default, Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<(String, StrategyRole), Strategy>,
}

impl StrategyRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Create registry with the built-in `phase_1`, `phase_2` and `phase_3` strategies
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        phases::register_defaults(&mut registry);
        registry
    }

    /// Register a strategy; a previous one under the same key is replaced and returned
    pub fn register(&mut self, phase: &str, strategy: Strategy) -> Option<Strategy> {
        self.strategies.insert((phase.to_string(), strategy.role()), strategy)
    }

    /// Register the select strategy of `phase`, replacing any earlier one
    pub fn register_select(&mut self, phase: &str, strategy: impl SelectStrategy + 'static) {
        self.register(phase, Strategy::Select(Arc::new(strategy)));
    }

    /// Register the expand strategy of `phase`, replacing any earlier one
    pub fn register_expand(&mut self, phase: &str, strategy: impl ExpandStrategy + 'static) {
        self.register(phase, Strategy::Expand(Arc::new(strategy)));
    }

    /// Register the score strategy of `phase`, replacing any earlier one
    pub fn register_score(&mut self, phase: &str, strategy: impl ScoreStrategy + 'static) {
        self.register(phase, Strategy::Score(Arc::new(strategy)));
    }

    /// Look up one strategy
    ///
    /// # Errors
    /// `UnknownStrategy` when nothing is registered under the key
    pub fn get(&self, phase: &str, role: StrategyRole) -> Result<&Strategy, SearchError> {
        self.strategies
            .get(&(phase.to_string(), role))
            .ok_or_else(|| SearchError::UnknownStrategy {
                phase: phase.to_string(),
                role,
            })
    }

    /// Resolve all three roles of a phase
    ///
    /// # Errors
    /// `UnknownStrategy` for the first missing role
    pub fn resolve(&self, phase: &str) -> Result<StrategySet, SearchError> {
        let select = match self.get(phase, StrategyRole::Select)? {
            Strategy::Select(s) => Arc::clone(s),
            _ => return Err(mismatch(phase, StrategyRole::Select)),
        };
        let expand = match self.get(phase, StrategyRole::Expand)? {
            Strategy::Expand(s) => Arc::clone(s),
            _ => return Err(mismatch(phase, StrategyRole::Expand)),
        };
        let score = match self.get(phase, StrategyRole::Score)? {
            Strategy::Score(s) => Arc::clone(s),
            _ => return Err(mismatch(phase, StrategyRole::Score)),
        };
        Ok(StrategySet {
            select,
            expand,
            score,
        })
    }

    /// Check if a strategy exists
    #[inline]
    #[must_use]
    pub fn contains(&self, phase: &str, role: StrategyRole) -> bool {
        self.strategies.contains_key(&(phase.to_string(), role))
    }

    /// Phase names with at least one strategy, sorted
    #[must_use]
    pub fn phases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(|(p, _)| p.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Registered `(phase, role)` entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

// Keys are derived from the variant, so this only fires on a corrupted map.
fn mismatch(phase: &str, role: StrategyRole) -> SearchError {
    SearchError::UnknownStrategy {
        phase: phase.to_string(),
        role,
    }
}

static GLOBAL: OnceCell<Arc<StrategyRegistry>> = OnceCell::new();

/// Install the process-wide registry
///
/// # Errors
/// Returns the registry back if one is already installed
pub fn install(registry: StrategyRegistry) -> Result<(), StrategyRegistry> {
    GLOBAL
        .set(Arc::new(registry))
        .map_err(|rejected| Arc::try_unwrap(rejected).unwrap_or_else(|arc| (*arc).clone()))
}

/// The process-wide registry, defaulting to [`StrategyRegistry::with_defaults`]
#[must_use]
pub fn global() -> Arc<StrategyRegistry> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(StrategyRegistry::with_defaults())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringParams;
    use crate::oracle::Outcome;
    use crate::phases::{PHASE_1, PHASE_2, PHASE_3};
    use crate::strategy::ScoreTarget;

    #[derive(Debug)]
    struct Fixed(&'static str, f64);

    impl ScoreStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn score(&self, _target: ScoreTarget<'_>, _outcome: Outcome, _params: &ScoringParams) -> f64 {
            self.1
        }
    }

    #[test]
    fn registry_new_empty() {
        let registry = StrategyRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve(PHASE_1).is_err());
    }

    #[test]
    fn registry_with_defaults_covers_every_role() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(registry.len(), 9);
        assert_eq!(registry.phases(), vec![PHASE_1, PHASE_2, PHASE_3]);
        for phase in [PHASE_1, PHASE_2, PHASE_3] {
            for role in StrategyRole::ALL {
                assert!(registry.contains(phase, role), "{phase}/{role}");
            }
            registry.resolve(phase).unwrap();
        }
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = StrategyRegistry::new();
        registry.register_score("custom", Fixed("first", 1.0));
        let previous = registry.register("custom", Strategy::Score(Arc::new(Fixed("second", 2.0))));

        assert_eq!(previous.map(|s| s.name()), Some("first"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("custom", StrategyRole::Score).unwrap().name(), "second");
    }

    #[test]
    fn missing_role_is_unknown_strategy() {
        let mut registry = StrategyRegistry::new();
        registry.register_score("custom", Fixed("only", 0.0));
        let err = registry.resolve("custom").unwrap_err();
        assert!(matches!(
            err,
            SearchError::UnknownStrategy { ref phase, role: StrategyRole::Select } if phase == "custom"
        ));
    }

    #[test]
    fn role_parses_from_str() {
        assert_eq!("expand".parse::<StrategyRole>(), Ok(StrategyRole::Expand));
        assert!("rollout".parse::<StrategyRole>().is_err());
    }

    #[test]
    fn global_defaults_resolve() {
        global().resolve(PHASE_2).unwrap();
    }
}
