use super::common::{first_visit, successors, terminal_resample};
use crate::strategy::{ExpandStrategy, Expansion, SearchContext};
use capmap_tree::NodeId;

/// Grows the tree by one concept or one difficulty step at a time
#[derive(Debug, Clone, Copy, Default)]
pub struct ConceptDifficultyExpander;

impl ExpandStrategy for ConceptDifficultyExpander {
    fn name(&self) -> &'static str {
        "concept_difficulty"
    }

    fn expand(&self, ctx: &SearchContext<'_>, id: NodeId) -> Option<Expansion> {
        let node = ctx.tree.get(id).ok()?;
        if let Some(expansion) = first_visit(ctx, node) {
            return Some(expansion);
        }
        match successors(ctx, id).into_iter().next() {
            Some(configuration) => Some(Expansion::Child(configuration)),
            None => terminal_resample(ctx, node),
        }
    }
}
