use crate::config::ScoringParams;
use crate::oracle::Outcome;
use crate::scorer::{apply_outcome, Polarity};
use crate::strategy::{
    ExpandStrategy, Expansion, ScoreStrategy, ScoreTarget, SearchContext, SelectStrategy,
};
use capmap_tree::NodeId;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;

/// Picks among visited nodes whose mean value exceeds `performance_threshold`
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdSelector;

impl SelectStrategy for ThresholdSelector {
    fn name(&self) -> &'static str {
        "threshold_ucb"
    }

    fn select(
        &self,
        ctx: &SearchContext<'_>,
        expander: &dyn ExpandStrategy,
        rng: &mut StdRng,
    ) -> Option<NodeId> {
        let threshold = ctx.config.phase_params.performance_threshold;
        let candidates: Vec<NodeId> = ctx
            .tree
            .all_nodes()
            .filter(|n| n.mean_value().is_some_and(|mean| mean > threshold))
            .map(|n| n.id())
            .filter(|id| expander.expand(ctx, *id).is_some())
            .collect();

        let probability = ctx.config.phase_params.exploration_probability;
        if probability > 0.0 && rng.random_bool(probability) {
            if let Some(pick) = candidates.choose(rng) {
                return Some(*pick);
            }
        }
        ctx.best_by_ucb(candidates)
    }
}

/// Never adds structure; every selection is another challenge instance
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceResampler;

impl ExpandStrategy for InstanceResampler {
    fn name(&self) -> &'static str {
        "instance_resample"
    }

    fn expand(&self, ctx: &SearchContext<'_>, id: NodeId) -> Option<Expansion> {
        ctx.tree.get(id).ok().map(|_| Expansion::Instance)
    }
}

/// Outcome table scaled by `1 + rank / levels`, harder levels weigh more
#[derive(Debug, Clone, Copy, Default)]
pub struct DifficultyWeightedScorer;

impl DifficultyWeightedScorer {
    /// Challenge weight `1 + rank / levels` of the target's difficulty
    #[must_use]
    pub fn weight(target: &ScoreTarget<'_>) -> f64 {
        let levels = target.bounds.difficulties().len().max(1);
        let rank = target
            .bounds
            .difficulty_rank(target.configuration.difficulty())
            .unwrap_or(0);
        1.0 + rank as f64 / levels as f64
    }
}

impl ScoreStrategy for DifficultyWeightedScorer {
    fn name(&self) -> &'static str {
        "difficulty_weighted"
    }

    fn score(&self, target: ScoreTarget<'_>, outcome: Outcome, params: &ScoringParams) -> f64 {
        let weight = Self::weight(&target);
        apply_outcome(target.metadata, outcome, params, Polarity::Normal) * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhaseConfig;
    use crate::strategy::Frontier;
    use capmap_tree::{Configuration, Difficulty, SpaceBounds, Tree};
    use rand::SeedableRng;

    fn setup() -> (Tree, Vec<NodeId>) {
        let bounds = SpaceBounds::new(["functions", "loops"], [Difficulty::Easy, Difficulty::Medium]);
        let mut tree = Tree::with_root(bounds, Configuration::new(["loops"], Difficulty::Easy)).unwrap();
        let root = tree.root().unwrap();
        let good = tree
            .add_child(root, Configuration::new(["functions", "loops"], Difficulty::Easy))
            .unwrap();
        let bad = tree
            .add_child(root, Configuration::new(["loops"], Difficulty::Medium))
            .unwrap();
        let fresh = tree
            .add_child(good, Configuration::new(["functions", "loops"], Difficulty::Medium))
            .unwrap();
        tree.backpropagate(good, 0.3, 1.0).unwrap();
        tree.backpropagate(bad, -0.3, 1.0).unwrap();
        (tree, vec![root, good, bad, fresh])
    }

    #[test]
    fn only_strong_visited_nodes_are_selected() {
        let (tree, ids) = setup();
        let mut config = PhaseConfig::new("phase_3");
        config.phase_params.performance_threshold = 0.1;
        config.phase_params.exploration_probability = 1.0;
        let frontier = Frontier::default();
        let ctx = SearchContext::new(&tree, &config, &frontier);
        let mut rng = StdRng::seed_from_u64(9);

        for _ in 0..16 {
            assert_eq!(ThresholdSelector.select(&ctx, &InstanceResampler, &mut rng), Some(ids[1]));
        }
    }

    #[test]
    fn nothing_above_threshold_selects_nothing() {
        let (tree, _) = setup();
        let mut config = PhaseConfig::new("phase_3");
        config.phase_params.performance_threshold = 0.5;
        let frontier = Frontier::default();
        let ctx = SearchContext::new(&tree, &config, &frontier);
        let mut rng = StdRng::seed_from_u64(9);
        assert!(ThresholdSelector.select(&ctx, &InstanceResampler, &mut rng).is_none());
    }

    #[test]
    fn harder_levels_weigh_more() {
        let (mut tree, ids) = setup();
        let params = ScoringParams::default();
        let score = |tree: &mut Tree, id: NodeId| {
            let (configuration, bounds, metadata) = tree.scoring_target(id).unwrap();
            DifficultyWeightedScorer.score(
                ScoreTarget {
                    configuration,
                    bounds,
                    metadata,
                },
                Outcome::Pass,
                &params,
            )
        };
        let easy = score(&mut tree, ids[1]);
        let medium = score(&mut tree, ids[3]);
        assert!((easy - 0.1).abs() < 1e-12);
        assert!((medium - 0.15).abs() < 1e-12);
    }
}
