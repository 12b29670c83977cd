//! Error types for phase configuration and execution

use crate::oracle::OracleError;
use crate::registry::StrategyRole;
use crate::state_machine::PhaseState;
use capmap_tree::{NodeId, TreeError};
use std::time::Duration;

/// Invalid phase configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A field is out of range or inconsistent
    #[error("invalid value for {field}: {reason}")]
    InvalidField {
        /// Dotted path of the field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// A phase was requested that the session does not configure
    #[error("phase `{0}` is not configured")]
    MissingPhase(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Field-level error for callers outside this crate
    #[must_use]
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::invalid(field, reason)
    }
}

/// Phase engine errors
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Rejected before the phase started
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// No strategy registered under `(phase, role)`
    #[error("no {role} strategy registered for phase `{phase}`")]
    UnknownStrategy { phase: String, role: StrategyRole },

    /// One evaluation exceeded its bound; scored as an error, never fatal
    #[error("evaluation of {node} timed out after {timeout:?}")]
    EvaluationTimeout { node: NodeId, timeout: Duration },

    /// The oracle could not be reached or spoke garbage
    #[error("oracle failure: {0}")]
    OracleTransport(#[source] OracleError),

    /// Tree invariant broken
    #[error("tree integrity: {0}")]
    TreeIntegrity(#[from] TreeError),

    /// Engine bug
    #[error("illegal phase transition: {from} -> {to}")]
    IllegalTransition { from: PhaseState, to: PhaseState },
}

impl SearchError {
    /// Whether the phase must stop
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EvaluationTimeout { .. })
    }
}
