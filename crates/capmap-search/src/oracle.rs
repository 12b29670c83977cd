//! Boundary to the external evaluation service

use async_trait::async_trait;
use capmap_tree::{Configuration, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result of evaluating one challenge instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Challenge solved
    Pass,
    /// Challenge attempted and failed
    Fail,
    /// Errored or timed out
    Error,
    /// Passed only after the external fixer repaired the attempt
    FixedByExternalFixer,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
            Self::FixedByExternalFixer => "fixed_by_external_fixer",
        };
        f.write_str(s)
    }
}

/// One evaluation the engine wants performed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Phase issuing the request
    pub phase: String,
    /// Node the result will be scored on
    pub node: NodeId,
    /// Configuration to build the challenge from
    pub configuration: Configuration,
    /// Distinguishes repeated evaluations of the same node
    pub instance: u32,
}

/// Oracle failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    /// Service unreachable or failing
    #[error("transport: {0}")]
    Transport(String),

    /// Reply could not be understood
    #[error("protocol: {0}")]
    Protocol(String),

    /// The oracle itself gave up
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl OracleError {
    /// Timeouts are scored as errors; everything else stops the phase
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Timeout(_))
    }
}

/// External evaluator of configurations
#[async_trait]
pub trait EvaluationOracle: Send + Sync {
    /// Generate, run and judge one challenge for `request`
    ///
    /// `timeout` is advisory; the engine enforces it independently.
    async fn evaluate(
        &self,
        request: &EvaluationRequest,
        timeout: Duration,
    ) -> Result<Outcome, OracleError>;
}
