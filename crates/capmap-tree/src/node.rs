//! Tree nodes and their per-phase counters

use crate::configuration::Configuration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node inside its tree's arena
///
/// Ids are handed out in creation order, so comparing two ids compares
/// creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Arena slot
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Outcome counters collected while one phase operates on a node
///
/// Cleared whenever a new phase starts on an inherited tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseMetadata {
    /// Passing evaluations
    pub passed: u32,
    /// Failing evaluations
    pub failed: u32,
    /// Evaluations that errored or timed out
    pub errored: u32,
    /// Evaluations repaired by the external fixer
    pub fixed: u32,
    /// Every evaluation attempt, whatever the outcome
    pub attempts: u32,
}

impl PhaseMetadata {
    /// Share of attempts that passed
    #[must_use]
    pub fn pass_rate(&self) -> Option<f64> {
        (self.attempts > 0).then(|| f64::from(self.passed) / f64::from(self.attempts))
    }

    /// Zero every counter
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One configuration inside one tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) configuration: Configuration,
    pub(crate) visits: u64,
    pub(crate) value: f64,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) depth: usize,
    pub(crate) phase_metadata: PhaseMetadata,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        configuration: Configuration,
        parent: Option<NodeId>,
        depth: usize,
    ) -> Self {
        Self {
            id,
            configuration,
            visits: 0,
            value: 0.0,
            children: Vec::new(),
            parent,
            depth,
            phase_metadata: PhaseMetadata::default(),
        }
    }

    /// Stable id
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Configuration this node evaluates
    #[inline]
    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Number of backpropagated evaluations through this node
    #[inline]
    #[must_use]
    pub fn visits(&self) -> u64 {
        self.visits
    }

    /// Accumulated (discounted) reward
    #[inline]
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// `value / visits`, if visited
    #[inline]
    #[must_use]
    pub fn mean_value(&self) -> Option<f64> {
        (self.visits > 0).then(|| self.value / self.visits as f64)
    }

    /// Children in creation order
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent id; `None` for the root
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Distance from the root
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Counters of the phase currently operating on the tree
    #[inline]
    #[must_use]
    pub fn phase_metadata(&self) -> &PhaseMetadata {
        &self.phase_metadata
    }

    /// Whether the node has no children
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the node has no parent
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Difficulty;

    #[test]
    fn fresh_node_has_no_mean() {
        let node = Node::new(NodeId(0), Configuration::new(["a"], Difficulty::Easy), None, 0);
        assert_eq!(node.visits(), 0);
        assert!(node.mean_value().is_none());
        assert!(node.is_leaf());
        assert!(node.is_root());
    }

    #[test]
    fn pass_rate_needs_attempts() {
        let mut meta = PhaseMetadata::default();
        assert!(meta.pass_rate().is_none());

        meta.attempts = 4;
        meta.passed = 1;
        assert_eq!(meta.pass_rate(), Some(0.25));

        meta.reset();
        assert_eq!(meta, PhaseMetadata::default());
    }
}
