//! Flat, read-only export of a tree
//!
//! One [`NodeRecord`] per node carries enough to rebuild the tree elsewhere
//! (visualization, offline statistics) without re-running the search.

use crate::configuration::{Configuration, Difficulty, SpaceBounds};
use crate::error::TreeError;
use crate::node::{Node, NodeId};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Exported view of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node id
    pub id: NodeId,
    /// Parent id (`None` for the root)
    pub parent: Option<NodeId>,
    /// Concepts, sorted
    pub concepts: Vec<String>,
    /// Difficulty level
    pub difficulty: Difficulty,
    /// Visit count
    pub visits: u64,
    /// Accumulated value
    pub value: f64,
}

/// Exported view of a whole tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeExport {
    /// Allowed concepts
    pub concepts: Vec<String>,
    /// Allowed difficulties, ascending
    pub difficulties: Vec<Difficulty>,
    /// Nodes in creation order
    pub nodes: Vec<NodeRecord>,
}

/// Per-difficulty aggregates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DifficultyStats {
    /// Nodes at this level
    pub nodes: usize,
    /// Sum of their visits
    pub visits: u64,
    /// Mean of `value / visits` over visited nodes
    pub mean_value: Option<f64>,
}

/// Headline numbers for a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Nodes in the tree
    pub node_count: usize,
    /// Deepest node depth
    pub max_depth: usize,
    /// Visits of the root
    pub root_visits: u64,
    /// Aggregates per difficulty level
    pub per_difficulty: BTreeMap<Difficulty, DifficultyStats>,
}

impl Tree {
    /// Export every node
    #[must_use]
    pub fn export(&self) -> TreeExport {
        TreeExport {
            concepts: self.bounds().concepts().iter().cloned().collect(),
            difficulties: self.bounds().difficulties().to_vec(),
            nodes: self.all_nodes().map(NodeRecord::from).collect(),
        }
    }

    /// Rebuild a tree from its export
    ///
    /// Phase counters are not exported and start at zero.
    ///
    /// # Errors
    /// `Integrity` if the records do not describe a valid tree
    pub fn from_export(export: &TreeExport) -> Result<Tree, TreeError> {
        let bounds = SpaceBounds::new(export.concepts.iter().cloned(), export.difficulties.iter().copied());

        let mut records: Vec<&NodeRecord> = export.nodes.iter().collect();
        records.sort_by_key(|r| r.id);

        let mut nodes: Vec<Node> = Vec::with_capacity(records.len());
        for (slot, record) in records.iter().enumerate() {
            if record.id.index() != slot {
                return Err(TreeError::Integrity(format!("non-contiguous id {}", record.id)));
            }
            let depth = match record.parent {
                None => 0,
                Some(parent) => {
                    let parent_node = nodes.get_mut(parent.index()).ok_or_else(|| {
                        TreeError::Integrity(format!("{} exported before its parent", record.id))
                    })?;
                    parent_node.children.push(record.id);
                    parent_node.depth + 1
                }
            };

            let mut node = Node::new(
                record.id,
                Configuration::new(record.concepts.iter().cloned(), record.difficulty),
                record.parent,
                depth,
            );
            node.visits = record.visits;
            node.value = record.value;
            nodes.push(node);
        }

        Tree::from_parts(bounds, nodes)
    }
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id(),
            parent: node.parent(),
            concepts: node.configuration().concepts().iter().cloned().collect(),
            difficulty: node.configuration().difficulty(),
            visits: node.visits(),
            value: node.value(),
        }
    }
}

impl TreeExport {
    /// Pretty JSON rendering
    ///
    /// # Errors
    /// Propagates serializer failures
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Aggregate statistics over the exported nodes
    #[must_use]
    pub fn summary(&self) -> ExportSummary {
        let mut depth: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut per_difficulty: BTreeMap<Difficulty, DifficultyStats> = BTreeMap::new();
        let mut mean_sums: BTreeMap<Difficulty, (f64, usize)> = BTreeMap::new();
        let mut root_visits = 0;

        for record in &self.nodes {
            let d = record
                .parent
                .and_then(|p| depth.get(&p).copied())
                .map_or(0, |pd| pd + 1);
            depth.insert(record.id, d);
            if record.parent.is_none() {
                root_visits = record.visits;
            }

            let stats = per_difficulty.entry(record.difficulty).or_default();
            stats.nodes += 1;
            stats.visits += record.visits;
            if record.visits > 0 {
                let entry = mean_sums.entry(record.difficulty).or_insert((0.0, 0));
                entry.0 += record.value / record.visits as f64;
                entry.1 += 1;
            }
        }

        for (difficulty, (sum, count)) in mean_sums {
            if let Some(stats) = per_difficulty.get_mut(&difficulty) {
                stats.mean_value = Some(sum / count as f64);
            }
        }

        ExportSummary {
            node_count: self.nodes.len(),
            max_depth: depth.values().copied().max().unwrap_or(0),
            root_visits,
            per_difficulty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Tree {
        let bounds = SpaceBounds::new(["loops", "functions"], [Difficulty::Easy, Difficulty::Medium]);
        let mut tree = Tree::with_root(bounds, Configuration::new(["loops"], Difficulty::Easy)).unwrap();
        let root = tree.root().unwrap();
        let a = tree
            .add_child(root, Configuration::new(["loops", "functions"], Difficulty::Easy))
            .unwrap();
        let b = tree
            .add_child(root, Configuration::new(["loops"], Difficulty::Medium))
            .unwrap();
        tree.backpropagate(a, 0.5, 0.9).unwrap();
        tree.backpropagate(b, -0.1, 0.9).unwrap();
        tree
    }

    #[test]
    fn export_round_trips_structure_and_stats() {
        let tree = sample();
        let rebuilt = Tree::from_export(&tree.export()).unwrap();
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn export_rejects_dangling_parent() {
        let mut export = sample().export();
        export.nodes[1].parent = Some(NodeId(42));
        assert!(Tree::from_export(&export).is_err());
    }

    #[test]
    fn summary_groups_by_difficulty() {
        let summary = sample().export().summary();
        assert_eq!(summary.node_count, 3);
        assert_eq!(summary.max_depth, 1);
        assert_eq!(summary.root_visits, 2);

        let easy = summary.per_difficulty[&Difficulty::Easy];
        assert_eq!(easy.nodes, 2);
        assert_eq!(easy.visits, 3);

        let medium = summary.per_difficulty[&Difficulty::Medium];
        assert_eq!(medium.mean_value, Some(-0.1));
    }

    #[test]
    fn json_contains_records() {
        let json = sample().export().to_json_pretty().unwrap();
        assert!(json.contains("\"difficulty\": \"medium\""));
        assert!(json.contains("\"parent\": null"));
    }
}
