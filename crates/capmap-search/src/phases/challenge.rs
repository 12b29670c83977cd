use super::common::{first_visit, successors, terminal_resample};
use crate::strategy::{ExpandStrategy, Expansion, SearchContext};
use capmap_tree::{Configuration, NodeId, Tree};

/// Up to `limit` visited nodes the target model handles worst
///
/// Nodes evaluated in the current phase are ranked by pass rate. Before any
/// such evaluation exists, the mean value inherited from earlier phases is
/// used instead. Ties go to the older node.
#[must_use]
pub fn weakest_nodes(tree: &Tree, limit: usize) -> Vec<NodeId> {
    let mut ranked: Vec<(f64, NodeId)> = tree
        .all_nodes()
        .filter_map(|n| n.phase_metadata().pass_rate().map(|rate| (rate, n.id())))
        .collect();
    if ranked.is_empty() {
        ranked = tree
            .all_nodes()
            .filter_map(|n| n.mean_value().map(|mean| (mean, n.id())))
            .collect();
    }
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    ranked.into_iter().take(limit).map(|(_, id)| id).collect()
}

fn affinity(candidate: &Configuration, weak: &[&Configuration]) -> f64 {
    weak.iter()
        .map(|w| {
            let same_level = if w.difficulty() == candidate.difficulty() { 0.5 } else { 0.0 };
            candidate.concept_overlap(w) + same_level
        })
        .sum()
}

/// Grows toward the configurations that currently fail most
///
/// Uses the same successor set as phase 1, picking the candidate with the
/// highest affinity (concept overlap plus matching difficulty) to the
/// weakest nodes. Earlier candidates win ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeaknessAffinityExpander;

impl ExpandStrategy for WeaknessAffinityExpander {
    fn name(&self) -> &'static str {
        "weakness_affinity"
    }

    fn expand(&self, ctx: &SearchContext<'_>, id: NodeId) -> Option<Expansion> {
        let node = ctx.tree.get(id).ok()?;
        if let Some(expansion) = first_visit(ctx, node) {
            return Some(expansion);
        }
        let candidates = successors(ctx, id);
        if candidates.is_empty() {
            return terminal_resample(ctx, node);
        }

        let weak: Vec<&Configuration> =
            weakest_nodes(ctx.tree, ctx.config.phase_params.num_nodes_per_iteration)
                .into_iter()
                .filter_map(|w| ctx.tree.get(w).ok())
                .map(|n| n.configuration())
                .collect();

        candidates
            .into_iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                affinity(a, &weak)
                    .total_cmp(&affinity(b, &weak))
                    .then_with(|| ib.cmp(ia))
            })
            .map(|(_, configuration)| Expansion::Child(configuration))
    }
}
