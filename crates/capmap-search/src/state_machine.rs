//! Phase lifecycle
//!
//! ```text
//! Initialized -> Running -> Converged
//!      |            |----> Exhausted
//!      '------------'----> Failed
//! ```

use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one phase run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    /// Created, not started
    Initialized,
    /// Iterating
    Running,
    /// Aggregate stopped moving
    Converged,
    /// Iteration cap hit or nothing left to expand
    Exhausted,
    /// Stopped by a fatal error
    Failed,
}

impl PhaseState {
    /// Whether no further transition is allowed
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted | Self::Failed)
    }

    /// Lowercase state name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Converged => "converged",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: PhaseState) -> &'static [PhaseState] {
    use PhaseState::{Converged, Exhausted, Failed, Initialized, Running};
    match from {
        Initialized => &[Running, Failed],
        Running => &[Converged, Exhausted, Failed],
        Converged | Exhausted | Failed => &[],
    }
}

/// Validate a state transition
///
/// # Errors
/// `IllegalTransition` when `to` is not reachable from `from`
pub fn validate_transition(from: PhaseState, to: PhaseState) -> Result<(), SearchError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SearchError::IllegalTransition { from, to })
    }
}
