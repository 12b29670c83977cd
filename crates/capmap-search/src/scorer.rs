//! UCB selection scores and outcome deltas

use crate::config::ScoringParams;
use crate::oracle::Outcome;
use capmap_tree::{NodeId, PhaseMetadata, Tree};
use std::cmp::Ordering;

/// Sign applied to outcome deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Passes raise value
    #[default]
    Normal,
    /// Failures raise value
    Inverted,
}

/// UCB1 score of `id`
///
/// Unvisited nodes score `+inf`. Without a visited parent only the mean
/// value is returned.
#[must_use]
pub fn ucb_score(tree: &Tree, id: NodeId, exploration_weight: f64) -> f64 {
    ucb_score_with_pending(tree, id, exploration_weight, 0)
}

/// UCB1 score counting `pending` in-flight selections as zero-reward visits
///
/// Unknown ids score `-inf`.
#[must_use]
pub fn ucb_score_with_pending(tree: &Tree, id: NodeId, exploration_weight: f64, pending: u64) -> f64 {
    let Ok(node) = tree.get(id) else {
        return f64::NEG_INFINITY;
    };
    let visits = node.visits() + pending;
    if visits == 0 {
        return f64::INFINITY;
    }
    let n = visits as f64;
    let exploitation = node.value() / n;

    let parent_visits = node
        .parent()
        .and_then(|p| tree.get(p).ok())
        .map_or(0, |p| p.visits() + pending);
    if parent_visits == 0 {
        return exploitation;
    }
    exploitation + exploration_weight * ((parent_visits as f64).ln() / n).sqrt()
}

#[derive(Debug, Clone, Copy)]
struct Ranked {
    id: NodeId,
    score: f64,
    visits: u64,
}

// Greater is better: higher score, then fewer visits, then older node.
fn rank(a: &Ranked, b: &Ranked) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| b.visits.cmp(&a.visits))
        .then_with(|| b.id.cmp(&a.id))
}

/// Best candidate by UCB with deterministic tie-breaking
#[must_use]
pub fn best_by_ucb<I, P>(tree: &Tree, candidates: I, exploration_weight: f64, pending: P) -> Option<NodeId>
where
    I: IntoIterator<Item = NodeId>,
    P: Fn(NodeId) -> u64,
{
    candidates
        .into_iter()
        .filter_map(|id| {
            let node = tree.get(id).ok()?;
            let extra = pending(id);
            Some(Ranked {
                id,
                score: ucb_score_with_pending(tree, id, exploration_weight, extra),
                visits: node.visits() + extra,
            })
        })
        .max_by(rank)
        .map(|r| r.id)
}

/// Candidates ordered best first, same ordering as [`best_by_ucb`]
#[must_use]
pub fn rank_by_ucb<I, P>(tree: &Tree, candidates: I, exploration_weight: f64, pending: P) -> Vec<NodeId>
where
    I: IntoIterator<Item = NodeId>,
    P: Fn(NodeId) -> u64,
{
    let mut ranked: Vec<Ranked> = candidates
        .into_iter()
        .filter_map(|id| {
            let node = tree.get(id).ok()?;
            let extra = pending(id);
            Some(Ranked {
                id,
                score: ucb_score_with_pending(tree, id, exploration_weight, extra),
                visits: node.visits() + extra,
            })
        })
        .collect();
    ranked.sort_by(|a, b| rank(b, a));
    ranked.into_iter().map(|r| r.id).collect()
}

/// Record `outcome` on the node's counters and return the value delta
pub fn apply_outcome(
    metadata: &mut PhaseMetadata,
    outcome: Outcome,
    params: &ScoringParams,
    polarity: Polarity,
) -> f64 {
    metadata.attempts += 1;
    let delta = match outcome {
        Outcome::Pass => {
            let counted = metadata.passed < params.max_num_passed;
            metadata.passed += 1;
            if counted {
                params.reward_per_pass
            } else {
                0.0
            }
        }
        Outcome::Fail => {
            metadata.failed += 1;
            params.penalty_per_failure
        }
        Outcome::Error => {
            metadata.errored += 1;
            params.penalty_per_error
        }
        Outcome::FixedByExternalFixer => {
            metadata.fixed += 1;
            params.penalty_per_attempt
        }
    };
    match polarity {
        Polarity::Normal => delta,
        Polarity::Inverted => -delta,
    }
}
