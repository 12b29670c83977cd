//! Arena-backed search tree
//!
//! Nodes live in a single `Vec` indexed by [`NodeId`]. Parent links are
//! plain ids, so the tree never forms an ownership cycle and can be cloned
//! or serialized as a whole.

use crate::configuration::{Configuration, SpaceBounds};
use crate::error::TreeError;
use crate::node::{Node, NodeId, PhaseMetadata};
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

/// Search tree over one configuration space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    bounds: SpaceBounds,
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Tree {
    /// Create an empty tree
    #[inline]
    #[must_use]
    pub fn new(bounds: SpaceBounds) -> Self {
        Self {
            bounds,
            nodes: Vec::new(),
            root: None,
        }
    }

    /// Create a tree with its root in place
    ///
    /// # Errors
    /// `OutOfBounds` if the root configuration is outside `bounds`
    pub fn with_root(bounds: SpaceBounds, root: Configuration) -> Result<Self, TreeError> {
        let mut tree = Self::new(bounds);
        tree.create_root(root)?;
        Ok(tree)
    }

    /// Space bounds
    #[inline]
    #[must_use]
    pub fn bounds(&self) -> &SpaceBounds {
        &self.bounds
    }

    /// Root id, once created
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create the root node
    ///
    /// # Errors
    /// - `RootExists` if a root was already created
    /// - `OutOfBounds` if the configuration is outside the space
    pub fn create_root(&mut self, configuration: Configuration) -> Result<NodeId, TreeError> {
        if let Some(root) = self.root {
            return Err(TreeError::RootExists(root));
        }
        if !self.bounds.contains(&configuration) {
            return Err(TreeError::OutOfBounds(configuration));
        }

        let id = self.next_id()?;
        self.nodes.push(Node::new(id, configuration, None, 0));
        self.root = Some(id);
        Ok(id)
    }

    /// Attach a new child to `parent`
    ///
    /// # Errors
    /// - `NodeNotFound` if `parent` is unknown
    /// - `OutOfBounds` if the configuration is outside the space
    /// - `DuplicateConfiguration` if the configuration already appears on
    ///   the path from the root to `parent` (inclusive)
    /// - `CapacityExceeded` once every `u32` id has been issued
    pub fn add_child(
        &mut self,
        parent: NodeId,
        configuration: Configuration,
    ) -> Result<NodeId, TreeError> {
        let depth = self.get(parent)?.depth + 1;
        if !self.bounds.contains(&configuration) {
            return Err(TreeError::OutOfBounds(configuration));
        }
        if self.branch_contains(parent, &configuration) {
            return Err(TreeError::DuplicateConfiguration {
                parent,
                configuration,
            });
        }

        let id = self.next_id()?;
        self.nodes.push(Node::new(id, configuration, Some(parent), depth));
        self.nodes[parent.index()].children.push(id);
        Ok(id)
    }

    /// Look up a node
    ///
    /// # Errors
    /// `NodeNotFound` for ids this tree never issued
    #[inline]
    pub fn get(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(id.index()).ok_or(TreeError::NodeNotFound(id))
    }

    /// The node and every ancestor up to the root, nearest first
    ///
    /// Empty for an unknown id.
    #[inline]
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.nodes.get(id.index()).map(|n| n.id),
        }
    }

    /// Every node in creation order
    ///
    /// The iterator is `Clone`, so a traversal can be restarted from any
    /// point without touching the tree.
    #[inline]
    pub fn all_nodes(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    /// Nodes without children
    pub fn leaves(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(|n| n.is_leaf())
    }

    /// Children of `id` in creation order
    pub fn children_of(&self, id: NodeId) -> impl Iterator<Item = &Node> + '_ {
        self.nodes
            .get(id.index())
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |child| &self.nodes[child.index()])
    }

    /// Whether `configuration` appears on the path from the root to `id`
    #[must_use]
    pub fn branch_contains(&self, id: NodeId, configuration: &Configuration) -> bool {
        self.ancestors(id)
            .any(|node| node.configuration == *configuration)
    }

    /// Deepest node depth
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Record one evaluation at `id`
    ///
    /// Every node from `id` up to the root gains one visit and
    /// `delta * discount^k`, where `k` is its distance from `id`.
    ///
    /// # Errors
    /// `NodeNotFound` if `id` is unknown
    pub fn backpropagate(&mut self, id: NodeId, delta: f64, discount: f64) -> Result<(), TreeError> {
        self.get(id)?;

        let path: Vec<NodeId> = self.ancestors(id).map(|n| n.id).collect();
        let mut weight = 1.0;
        for node_id in path {
            let node = &mut self.nodes[node_id.index()];
            node.visits += 1;
            node.value += delta * weight;
            weight *= discount;
        }
        Ok(())
    }

    /// Configuration, bounds and mutable counters of one node
    ///
    /// Scoring needs all three at once.
    ///
    /// # Errors
    /// `NodeNotFound` if `id` is unknown
    pub fn scoring_target(
        &mut self,
        id: NodeId,
    ) -> Result<(&Configuration, &SpaceBounds, &mut PhaseMetadata), TreeError> {
        let bounds = &self.bounds;
        let node = self
            .nodes
            .get_mut(id.index())
            .ok_or(TreeError::NodeNotFound(id))?;
        Ok((&node.configuration, bounds, &mut node.phase_metadata))
    }

    /// Clear phase counters on every node
    pub fn reset_phase_metadata(&mut self) {
        for node in &mut self.nodes {
            node.phase_metadata.reset();
        }
    }

    /// Copy of the tree keeping only nodes whose mean value exceeds `min_mean_value`
    ///
    /// The root is always kept. A node is kept only if its parent was kept,
    /// so the result stays connected. Ids are reassigned densely in the
    /// original creation order; statistics are copied unchanged.
    #[must_use]
    pub fn filtered(&self, min_mean_value: f64) -> Tree {
        let mut out = Tree::new(self.bounds.clone());
        let mut remap: Vec<Option<NodeId>> = vec![None; self.nodes.len()];

        for node in &self.nodes {
            let parent = match node.parent {
                None => None,
                Some(parent) => match remap[parent.index()] {
                    Some(mapped) => Some(mapped),
                    None => continue,
                },
            };
            let keep = parent.is_none()
                || node.mean_value().map_or(false, |mean| mean > min_mean_value);
            if !keep {
                continue;
            }

            // never more nodes than the source, whose ids all fit
            let Ok(id) = out.next_id() else {
                break;
            };
            let mut copy = node.clone();
            copy.id = id;
            copy.parent = parent;
            copy.children.clear();
            copy.depth = parent.map_or(0, |p| out.nodes[p.index()].depth + 1);
            out.nodes.push(copy);

            match parent {
                Some(p) => out.nodes[p.index()].children.push(id),
                None => out.root = Some(id),
            }
            remap[node.id.index()] = Some(id);
        }
        out
    }

    /// Check every structural invariant
    ///
    /// # Errors
    /// `Integrity` describing the first violation found
    pub fn verify_integrity(&self) -> Result<(), TreeError> {
        let Some(root) = self.root else {
            return if self.nodes.is_empty() {
                Ok(())
            } else {
                Err(TreeError::Integrity("nodes present without a root".into()))
            };
        };

        // links first: the branch walks below assume finite parent chains
        let mut graph: DiGraphMap<u32, ()> = DiGraphMap::new();
        for (slot, node) in self.nodes.iter().enumerate() {
            if node.id.index() != slot {
                return Err(TreeError::Integrity(format!("{} stored at slot {slot}", node.id)));
            }
            graph.add_node(node.id.0);

            if let Some(parent) = node.parent {
                let parent_node = self.nodes.get(parent.index()).ok_or_else(|| {
                    TreeError::Integrity(format!("{} points at missing parent {parent}", node.id))
                })?;
                let listed = parent_node.children.iter().filter(|c| **c == node.id).count();
                if listed != 1 {
                    return Err(TreeError::Integrity(format!(
                        "{} listed {listed} times by parent {parent}",
                        node.id
                    )));
                }
            } else if node.id != root {
                return Err(TreeError::Integrity(format!("orphaned node {}", node.id)));
            }

            for child in &node.children {
                let child_node = self.nodes.get(child.index()).ok_or_else(|| {
                    TreeError::Integrity(format!("{} lists missing child {child}", node.id))
                })?;
                if child_node.parent != Some(node.id) {
                    return Err(TreeError::Integrity(format!(
                        "{child} does not point back at {}",
                        node.id
                    )));
                }
                graph.add_edge(node.id.0, child.0, ());
            }
        }

        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(TreeError::Integrity("cycle detected".into()));
        }

        for node in &self.nodes {
            let Some(parent) = node.parent else {
                if node.depth != 0 {
                    return Err(TreeError::Integrity("root depth is not zero".into()));
                }
                continue;
            };
            let parent_node = &self.nodes[parent.index()];
            if node.depth != parent_node.depth + 1 {
                return Err(TreeError::Integrity(format!("{} has wrong depth", node.id)));
            }
            if node.visits > parent_node.visits {
                return Err(TreeError::Integrity(format!(
                    "{} has more visits than its parent",
                    node.id
                )));
            }
            if self.branch_contains(parent, &node.configuration) {
                return Err(TreeError::Integrity(format!(
                    "{} repeats a configuration of its branch",
                    node.id
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn from_parts(bounds: SpaceBounds, nodes: Vec<Node>) -> Result<Self, TreeError> {
        let root = nodes.iter().find(|n| n.parent.is_none()).map(|n| n.id);
        let tree = Self { bounds, nodes, root };
        tree.verify_integrity()?;
        Ok(tree)
    }

    fn next_id(&self) -> Result<NodeId, TreeError> {
        id_for_slot(self.nodes.len())
    }
}

fn id_for_slot(slot: usize) -> Result<NodeId, TreeError> {
    u32::try_from(slot)
        .map(NodeId)
        .map_err(|_| TreeError::CapacityExceeded(slot))
}

/// Iterator from a node up to the root
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.nodes.get(self.next?.index())?;
        self.next = node.parent;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Difficulty;
    use pretty_assertions::assert_eq;

    fn bounds() -> SpaceBounds {
        SpaceBounds::new(
            ["loops", "functions", "recursion"],
            [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard],
        )
    }

    fn cfg(concepts: &[&str], difficulty: Difficulty) -> Configuration {
        Configuration::new(concepts.iter().copied(), difficulty)
    }

    #[test]
    fn create_root_once() {
        let mut tree = Tree::new(bounds());
        let root = tree.create_root(cfg(&["loops"], Difficulty::Easy)).unwrap();
        assert_eq!(tree.root(), Some(root));

        let again = tree.create_root(cfg(&["functions"], Difficulty::Easy));
        assert_eq!(again, Err(TreeError::RootExists(root)));
    }

    #[test]
    fn add_child_rejects_branch_duplicate() {
        let mut tree = Tree::with_root(bounds(), cfg(&["loops"], Difficulty::Easy)).unwrap();
        let root = tree.root().unwrap();
        let child = tree.add_child(root, cfg(&["loops"], Difficulty::Medium)).unwrap();

        let dup = tree.add_child(child, cfg(&["loops"], Difficulty::Easy));
        assert!(matches!(dup, Err(TreeError::DuplicateConfiguration { .. })));

        // the same configuration on a sibling branch is fine
        let other = tree.add_child(root, cfg(&["loops", "functions"], Difficulty::Easy)).unwrap();
        assert!(tree.add_child(other, cfg(&["loops"], Difficulty::Medium)).is_ok());
        tree.verify_integrity().unwrap();
    }

    #[test]
    fn add_child_rejects_out_of_bounds() {
        let mut tree = Tree::with_root(bounds(), cfg(&["loops"], Difficulty::Easy)).unwrap();
        let root = tree.root().unwrap();
        let res = tree.add_child(root, cfg(&["loops", "pointers"], Difficulty::Easy));
        assert!(matches!(res, Err(TreeError::OutOfBounds(_))));
    }

    #[test]
    fn ancestors_walk_to_root() {
        let mut tree = Tree::with_root(bounds(), cfg(&["loops"], Difficulty::Easy)).unwrap();
        let root = tree.root().unwrap();
        let a = tree.add_child(root, cfg(&["loops"], Difficulty::Medium)).unwrap();
        let b = tree.add_child(a, cfg(&["loops"], Difficulty::Hard)).unwrap();

        let path: Vec<NodeId> = tree.ancestors(b).map(Node::id).collect();
        assert_eq!(path, vec![b, a, root]);
        assert_eq!(tree.ancestors(NodeId(99)).count(), 0);
    }

    #[test]
    fn all_nodes_is_restartable() {
        let mut tree = Tree::with_root(bounds(), cfg(&["loops"], Difficulty::Easy)).unwrap();
        let root = tree.root().unwrap();
        tree.add_child(root, cfg(&["loops"], Difficulty::Medium)).unwrap();

        let iter = tree.all_nodes();
        let first: Vec<NodeId> = iter.clone().map(Node::id).collect();
        let second: Vec<NodeId> = iter.map(Node::id).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn backpropagate_discounts_by_distance() {
        let mut tree = Tree::with_root(bounds(), cfg(&["loops"], Difficulty::Easy)).unwrap();
        let root = tree.root().unwrap();
        let a = tree.add_child(root, cfg(&["loops"], Difficulty::Medium)).unwrap();
        let b = tree.add_child(a, cfg(&["loops"], Difficulty::Hard)).unwrap();

        tree.backpropagate(b, 1.0, 0.5).unwrap();

        assert_eq!(tree.get(b).unwrap().value(), 1.0);
        assert_eq!(tree.get(a).unwrap().value(), 0.5);
        assert_eq!(tree.get(root).unwrap().value(), 0.25);
        for id in [root, a, b] {
            assert_eq!(tree.get(id).unwrap().visits(), 1);
        }
    }

    #[test]
    fn filtered_keeps_connected_strong_nodes() {
        let mut tree = Tree::with_root(bounds(), cfg(&["loops"], Difficulty::Easy)).unwrap();
        let root = tree.root().unwrap();
        let strong = tree.add_child(root, cfg(&["loops"], Difficulty::Medium)).unwrap();
        let weak = tree.add_child(root, cfg(&["loops", "functions"], Difficulty::Easy)).unwrap();
        let under_weak = tree
            .add_child(weak, cfg(&["loops", "functions"], Difficulty::Medium))
            .unwrap();

        tree.backpropagate(strong, 1.0, 1.0).unwrap();
        tree.backpropagate(weak, -1.0, 1.0).unwrap();
        tree.backpropagate(under_weak, 1.0, 1.0).unwrap();

        let kept = tree.filtered(0.0);
        assert_eq!(kept.len(), 2);
        kept.verify_integrity().unwrap();

        let configs: Vec<String> = kept.all_nodes().map(|n| n.configuration().to_string()).collect();
        assert_eq!(configs, vec!["{loops} @ easy", "{loops} @ medium"]);
    }

    #[test]
    fn reset_clears_counters_only() {
        let mut tree = Tree::with_root(bounds(), cfg(&["loops"], Difficulty::Easy)).unwrap();
        let root = tree.root().unwrap();
        {
            let (_, _, meta) = tree.scoring_target(root).unwrap();
            meta.attempts = 3;
        }
        tree.backpropagate(root, 0.5, 1.0).unwrap();
        tree.reset_phase_metadata();

        let node = tree.get(root).unwrap();
        assert_eq!(node.phase_metadata().attempts, 0);
        assert_eq!(node.visits(), 1);
    }

    #[test]
    fn integrity_detects_tampered_parent() {
        let mut tree = Tree::with_root(bounds(), cfg(&["loops"], Difficulty::Easy)).unwrap();
        let root = tree.root().unwrap();
        let child = tree.add_child(root, cfg(&["loops"], Difficulty::Medium)).unwrap();
        tree.nodes[child.index()].parent = None;

        let err = tree.verify_integrity().unwrap_err();
        assert!(err.is_integrity_violation());
    }

    #[test]
    fn ids_stop_at_the_u32_range() {
        assert_eq!(id_for_slot(0), Ok(NodeId(0)));
        assert_eq!(id_for_slot(u32::MAX as usize), Ok(NodeId(u32::MAX)));
        assert_eq!(
            id_for_slot(u32::MAX as usize + 1),
            Err(TreeError::CapacityExceeded(u32::MAX as usize + 1))
        );
    }
}
