//! Results and records produced by a phase sequence

use capmap_search::{PhaseConfig, PhaseOutcome, PhaseState};
use capmap_tree::Tree;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of one phase inside a sequence
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub phase: String,
    pub state: PhaseState,
    pub iterations: u32,
    pub final_aggregate: Option<f64>,
    pub best_aggregate: Option<f64>,
    /// Tree as the phase left it
    pub snapshot: Arc<Tree>,
}

impl PhaseResult {
    pub(crate) fn new(outcome: &PhaseOutcome, snapshot: Arc<Tree>) -> Self {
        Self {
            phase: outcome.phase.clone(),
            state: outcome.state,
            iterations: outcome.iterations,
            final_aggregate: outcome.final_aggregate,
            best_aggregate: outcome.best_aggregate,
            snapshot,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == PhaseState::Failed
    }
}

/// Persisted history entry for one finished phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    #[serde(flatten)]
    pub outcome: PhaseOutcome,
    /// Nodes in the tree when the phase ended
    pub tree_size: usize,
    pub recorded_at: DateTime<Utc>,
}

impl PhaseRecord {
    #[must_use]
    pub fn new(outcome: PhaseOutcome, tree_size: usize) -> Self {
        Self {
            outcome,
            tree_size,
            recorded_at: Utc::now(),
        }
    }
}

/// Everything a phase sequence needs besides the tree
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Key under which trees and history are stored
    pub session_id: String,
    /// Configured phases; looked up by name
    pub phases: Vec<PhaseConfig>,
}

impl SessionContext {
    #[must_use]
    pub fn new(session_id: impl Into<String>, phases: Vec<PhaseConfig>) -> Self {
        Self {
            session_id: session_id.into(),
            phases,
        }
    }

    /// First phase configured under `name`
    #[must_use]
    pub fn phase(&self, name: &str) -> Option<&PhaseConfig> {
        self.phases.iter().find(|p| p.name == name)
    }
}
