//! Pluggable select / expand / score behaviour of a phase

use crate::config::{PhaseConfig, ScoringParams};
use crate::oracle::Outcome;
use crate::scorer;
use capmap_tree::{Configuration, NodeId, PhaseMetadata, SpaceBounds, Tree};
use rand::rngs::StdRng;
use std::fmt::Debug;
use std::sync::Arc;

/// What an iteration will evaluate for a selected node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Create a child with this configuration and evaluate it
    Child(Configuration),
    /// Evaluate another challenge instance of the node itself
    Instance,
}

/// One planned evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Selected node
    pub node: NodeId,
    /// What to evaluate for it
    pub expansion: Expansion,
}

/// Evaluations planned for the current iteration
#[derive(Debug, Clone, Default)]
pub struct Frontier {
    entries: Vec<FrontierEntry>,
}

impl Frontier {
    /// Plan one more evaluation
    pub fn push(&mut self, node: NodeId, expansion: Expansion) {
        self.entries.push(FrontierEntry { node, expansion });
    }

    /// Planned entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is planned
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in planning order
    #[must_use]
    pub fn entries(&self) -> &[FrontierEntry] {
        &self.entries
    }

    /// Consume into entries, planning order kept
    #[must_use]
    pub fn into_entries(self) -> Vec<FrontierEntry> {
        self.entries
    }

    /// Entries already planned on `node`, used as virtual visits
    #[must_use]
    pub fn pending(&self, node: NodeId) -> u64 {
        self.entries.iter().filter(|e| e.node == node).count() as u64
    }

    /// Child configurations already planned under `node`
    pub fn planned_children(&self, node: NodeId) -> impl Iterator<Item = &Configuration> + '_ {
        self.entries.iter().filter_map(move |e| match &e.expansion {
            Expansion::Child(configuration) if e.node == node => Some(configuration),
            _ => None,
        })
    }
}

/// Read-only view handed to strategies while planning
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    /// Tree being searched
    pub tree: &'a Tree,
    /// Configuration of the running phase
    pub config: &'a PhaseConfig,
    /// Entries planned so far this iteration
    pub frontier: &'a Frontier,
}

impl<'a> SearchContext<'a> {
    /// Bundle the planning inputs
    #[must_use]
    pub fn new(tree: &'a Tree, config: &'a PhaseConfig, frontier: &'a Frontier) -> Self {
        Self {
            tree,
            config,
            frontier,
        }
    }

    /// UCB of `node` including virtual visits planned this iteration
    #[must_use]
    pub fn ucb(&self, node: NodeId) -> f64 {
        scorer::ucb_score_with_pending(
            self.tree,
            node,
            self.config.search_params.exploration_weight,
            self.frontier.pending(node),
        )
    }

    /// Best of `candidates` by UCB with pending visits
    #[must_use]
    pub fn best_by_ucb(&self, candidates: impl IntoIterator<Item = NodeId>) -> Option<NodeId> {
        scorer::best_by_ucb(
            self.tree,
            candidates,
            self.config.search_params.exploration_weight,
            |id| self.frontier.pending(id),
        )
    }

    /// `candidates` ordered best first
    #[must_use]
    pub fn rank_by_ucb(&self, candidates: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
        scorer::rank_by_ucb(
            self.tree,
            candidates,
            self.config.search_params.exploration_weight,
            |id| self.frontier.pending(id),
        )
    }
}

/// Mutable scoring view of one node
#[derive(Debug)]
pub struct ScoreTarget<'a> {
    /// Configuration of the scored node
    pub configuration: &'a Configuration,
    /// Search space of the tree
    pub bounds: &'a SpaceBounds,
    /// Phase counters to update
    pub metadata: &'a mut PhaseMetadata,
}

/// Picks the node the next frontier entry is planned on
pub trait SelectStrategy: Send + Sync + Debug {
    /// Strategy name, for logs
    fn name(&self) -> &'static str;

    /// Node to expand next, or `None` when nothing can be planned
    ///
    /// Only nodes for which `expander` proposes an expansion should be
    /// returned.
    fn select(
        &self,
        ctx: &SearchContext<'_>,
        expander: &dyn ExpandStrategy,
        rng: &mut StdRng,
    ) -> Option<NodeId>;
}

/// Decides what to evaluate for a selected node
pub trait ExpandStrategy: Send + Sync + Debug {
    /// Strategy name, for logs
    fn name(&self) -> &'static str;

    /// `None` when the node is closed for this iteration
    fn expand(&self, ctx: &SearchContext<'_>, node: NodeId) -> Option<Expansion>;
}

/// Turns an outcome into a value delta
pub trait ScoreStrategy: Send + Sync + Debug {
    /// Strategy name, for logs
    fn name(&self) -> &'static str;

    /// Update the node's counters and return the delta to backpropagate
    fn score(&self, target: ScoreTarget<'_>, outcome: Outcome, params: &ScoringParams) -> f64;
}

/// The three strategies one phase runs with
#[derive(Debug, Clone)]
pub struct StrategySet {
    /// Selection
    pub select: Arc<dyn SelectStrategy>,
    /// Expansion
    pub expand: Arc<dyn ExpandStrategy>,
    /// Scoring
    pub score: Arc<dyn ScoreStrategy>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use capmap_tree::Difficulty;

    #[test]
    fn pending_counts_entries_per_node() {
        let mut frontier = Frontier::default();
        let child = Configuration::new(["loops"], Difficulty::Medium);
        frontier.push(NodeId(0), Expansion::Child(child.clone()));
        frontier.push(NodeId(0), Expansion::Instance);
        frontier.push(NodeId(2), Expansion::Instance);

        assert_eq!(frontier.pending(NodeId(0)), 2);
        assert_eq!(frontier.pending(NodeId(1)), 0);
        assert_eq!(frontier.planned_children(NodeId(0)).collect::<Vec<_>>(), vec![&child]);
        assert_eq!(frontier.planned_children(NodeId(2)).count(), 0);
    }
}
