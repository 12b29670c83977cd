//! Error types for capmap core
//!
//! Covers configuration loading, session persistence and phase sequences.

use crate::types::PhaseResult;
use capmap_search::{ConfigError, SearchError};
use capmap_tree::TreeError;

/// Main capmap error type
#[derive(Debug, thiserror::Error)]
pub enum CapmapError {
    /// Phase engine failure
    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    /// Tree operation failure
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Session store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session document is not valid YAML for the schema
    #[error("cannot parse session config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A phase sequence stopped early
    #[error(transparent)]
    Sequence(#[from] Box<SequenceError>),
}

impl CapmapError {
    /// Whether the error happened before any phase ran
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Config(_) | Self::ConfigParse(_) => true,
            Self::Search(e) => matches!(
                e,
                SearchError::Configuration(_) | SearchError::UnknownStrategy { .. }
            ),
            _ => false,
        }
    }
}

/// Session store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session id unusable as a storage key
    #[error("invalid session id `{0}`")]
    InvalidSessionId(String),

    /// Stored tree fails its integrity check
    #[error("stored tree for `{session}` is corrupt: {source}")]
    Corrupt {
        session: String,
        #[source]
        source: TreeError,
    },
}

/// A phase sequence that stopped before running every phase
///
/// `results` holds every phase that ran, the failed one included.
#[derive(Debug, thiserror::Error)]
#[error("phase sequence stopped after {} phase(s): {cause}", .results.len())]
pub struct SequenceError {
    pub results: Vec<PhaseResult>,
    #[source]
    pub cause: Box<CapmapError>,
}

impl SequenceError {
    pub(crate) fn new(results: Vec<PhaseResult>, cause: impl Into<CapmapError>) -> Self {
        Self {
            results,
            cause: Box::new(cause.into()),
        }
    }

    /// Phase that failed, if one ran
    #[must_use]
    pub fn failed_phase(&self) -> Option<&PhaseResult> {
        self.results.last().filter(|r| r.is_failed())
    }
}
