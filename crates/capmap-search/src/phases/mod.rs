//! Built-in phase strategies
//!
//! | Phase | Goal | Select | Expand | Score |
//! |---|---|---|---|---|
//! | `phase_1` | map the capability surface | UCB descent | concept / difficulty successors | outcome table |
//! | `phase_2` | find weaknesses | UCB descent | successors closest to weak nodes | inverted table |
//! | `phase_3` | re-test strong nodes | above-threshold UCB | new instance | difficulty weighted |

mod capability;
mod challenge;
mod common;
mod evaluation;

pub use capability::ConceptDifficultyExpander;
pub use challenge::{weakest_nodes, WeaknessAffinityExpander};
pub use common::{successors, OutcomeTableScorer, UcbDescentSelector};
pub use evaluation::{DifficultyWeightedScorer, InstanceResampler, ThresholdSelector};

use crate::registry::StrategyRegistry;
use crate::scorer::Polarity;

/// Capability mapping
pub const PHASE_1: &str = "phase_1";
/// Challenge discovery
pub const PHASE_2: &str = "phase_2";
/// Comprehensive evaluation
pub const PHASE_3: &str = "phase_3";

pub(crate) fn register_defaults(registry: &mut StrategyRegistry) {
    registry.register_select(PHASE_1, UcbDescentSelector);
    registry.register_expand(PHASE_1, ConceptDifficultyExpander);
    registry.register_score(PHASE_1, OutcomeTableScorer::new(Polarity::Normal));

    registry.register_select(PHASE_2, UcbDescentSelector);
    registry.register_expand(PHASE_2, WeaknessAffinityExpander);
    registry.register_score(PHASE_2, OutcomeTableScorer::new(Polarity::Inverted));

    registry.register_select(PHASE_3, ThresholdSelector);
    registry.register_expand(PHASE_3, InstanceResampler);
    registry.register_score(PHASE_3, DifficultyWeightedScorer);
}
