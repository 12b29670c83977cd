//! Pieces shared by the structural phases

use crate::config::ScoringParams;
use crate::oracle::Outcome;
use crate::scorer::{apply_outcome, Polarity};
use crate::strategy::{
    ExpandStrategy, Expansion, ScoreStrategy, ScoreTarget, SearchContext, SelectStrategy,
};
use capmap_tree::{Configuration, Node, NodeId};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;

/// Structural successors of `node` still available this iteration
///
/// Concept combinations and the difficulty step alternate in priority with
/// every child slot the node fills. Empty at `max_depth`, once the node holds
/// `num_nodes_per_iteration` children (planned ones included), or when every
/// candidate already exists on the branch or among the siblings.
#[must_use]
pub fn successors(ctx: &SearchContext<'_>, id: NodeId) -> Vec<Configuration> {
    let Ok(node) = ctx.tree.get(id) else {
        return Vec::new();
    };
    let params = &ctx.config.phase_params;
    if node.depth() >= params.max_depth {
        return Vec::new();
    }

    let planned: Vec<&Configuration> = ctx.frontier.planned_children(id).collect();
    let slot = node.children().len() + planned.len();
    if slot >= params.num_nodes_per_iteration {
        return Vec::new();
    }

    let bounds = ctx.tree.bounds();
    let current = node.configuration();
    let combinations = bounds
        .missing_concepts(current)
        .map(|concept| current.with_concept(concept));
    let progression = bounds
        .next_difficulty(current.difficulty())
        .map(|difficulty| current.with_difficulty(difficulty));

    let ordered: Vec<Configuration> = if slot % 2 == 0 {
        combinations.chain(progression).collect()
    } else {
        progression.into_iter().chain(combinations).collect()
    };

    ordered
        .into_iter()
        .filter(|candidate| {
            !planned.contains(&candidate)
                && !ctx.tree.children_of(id).any(|c| c.configuration() == candidate)
                && !ctx.tree.branch_contains(id, candidate)
        })
        .collect()
}

/// Unvisited nodes are evaluated before anything grows under them
pub(crate) fn first_visit(ctx: &SearchContext<'_>, node: &Node) -> Option<Expansion> {
    (node.visits() == 0 && ctx.frontier.pending(node.id()) == 0).then_some(Expansion::Instance)
}

/// A leaf that can never grow is sampled again instead
pub(crate) fn terminal_resample(ctx: &SearchContext<'_>, node: &Node) -> Option<Expansion> {
    let open = node.is_leaf()
        && ctx.frontier.planned_children(node.id()).next().is_none()
        && node.depth() < ctx.config.phase_params.max_depth;
    open.then_some(Expansion::Instance)
}

/// Select policy of the structural phases
///
/// With probability `exploration_probability` a random unvisited expandable
/// leaf is picked (falling back to the best expandable leaf by UCB).
/// Otherwise the tree is descended from the root, children in UCB order,
/// stopping at the first node that can still be expanded.
#[derive(Debug, Clone, Copy, Default)]
pub struct UcbDescentSelector;

impl UcbDescentSelector {
    fn descend(ctx: &SearchContext<'_>, expander: &dyn ExpandStrategy, id: NodeId) -> Option<NodeId> {
        if expander.expand(ctx, id).is_some() {
            return Some(id);
        }
        let children = ctx.tree.get(id).ok()?.children().to_vec();
        ctx.rank_by_ucb(children)
            .into_iter()
            .find_map(|child| Self::descend(ctx, expander, child))
    }
}

impl SelectStrategy for UcbDescentSelector {
    fn name(&self) -> &'static str {
        "ucb_descent"
    }

    fn select(
        &self,
        ctx: &SearchContext<'_>,
        expander: &dyn ExpandStrategy,
        rng: &mut StdRng,
    ) -> Option<NodeId> {
        let probability = ctx.config.phase_params.exploration_probability;
        if probability > 0.0 && rng.random_bool(probability) {
            let open: Vec<&Node> = ctx
                .tree
                .leaves()
                .filter(|leaf| expander.expand(ctx, leaf.id()).is_some())
                .collect();
            let unvisited: Vec<NodeId> = open
                .iter()
                .filter(|leaf| leaf.visits() == 0 && ctx.frontier.pending(leaf.id()) == 0)
                .map(|leaf| leaf.id())
                .collect();
            if let Some(pick) = unvisited.choose(rng) {
                return Some(*pick);
            }
            if let Some(best) = ctx.best_by_ucb(open.iter().map(|leaf| leaf.id())) {
                return Some(best);
            }
        }
        Self::descend(ctx, expander, ctx.tree.root()?)
    }
}

/// Fixed outcome table with a polarity
#[derive(Debug, Clone, Copy)]
pub struct OutcomeTableScorer {
    polarity: Polarity,
}

impl OutcomeTableScorer {
    /// Scorer applying `polarity` to the standard table
    #[must_use]
    pub fn new(polarity: Polarity) -> Self {
        Self { polarity }
    }
}

impl ScoreStrategy for OutcomeTableScorer {
    fn name(&self) -> &'static str {
        match self.polarity {
            Polarity::Normal => "outcome_table",
            Polarity::Inverted => "inverted_outcome_table",
        }
    }

    fn score(&self, target: ScoreTarget<'_>, outcome: Outcome, params: &ScoringParams) -> f64 {
        apply_outcome(target.metadata, outcome, params, self.polarity)
    }
}
