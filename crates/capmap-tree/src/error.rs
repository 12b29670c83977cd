//! Error types for tree construction and integrity checks

use crate::configuration::Configuration;
use crate::node::NodeId;

/// Tree operation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    /// Configuration already present on the branch that would receive it
    #[error("configuration {configuration} already present on the branch ending at {parent}")]
    DuplicateConfiguration {
        /// Node that was about to receive the child
        parent: NodeId,
        /// Rejected configuration
        configuration: Configuration,
    },

    /// Unknown node id
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// `create_root` called twice
    #[error("tree already has a root ({0})")]
    RootExists(NodeId),

    /// Operation requires a root
    #[error("tree has no root")]
    MissingRoot,

    /// Configuration uses concepts or a difficulty outside the tree's bounds
    #[error("configuration {0} lies outside the search space")]
    OutOfBounds(Configuration),

    /// No node id left to issue
    #[error("tree is full: node slot {0} has no id")]
    CapacityExceeded(usize),

    /// Structural invariant violated
    #[error("tree integrity violation: {0}")]
    Integrity(String),
}

impl TreeError {
    /// Whether the error signals an engine bug rather than a rejected operation
    #[inline]
    #[must_use]
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}
