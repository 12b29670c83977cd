//! Capmap Tree
//!
//! Arena-backed search tree over the configuration space explored by the
//! capability mapping search.
//!
//! # Core Concepts
//!
//! - [`Configuration`]: a (concept set, difficulty) pair, compared by set equality
//! - [`SpaceBounds`]: the allowed concepts and difficulty levels of one tree
//! - [`Node`]: visit/value statistics for one configuration
//! - [`Tree`]: owns every node; parents are plain [`NodeId`] back-references
//! - [`TreeExport`]: flat, serializable view used for statistics and visualization
//!
//! # Example
//!
//! ```rust
//! use capmap_tree::{Configuration, Difficulty, SpaceBounds, Tree};
//!
//! let bounds = SpaceBounds::new(["loops", "functions"], [Difficulty::Easy, Difficulty::Medium]);
//! let mut tree = Tree::new(bounds);
//!
//! let root = tree.create_root(Configuration::new(["loops"], Difficulty::Easy)).unwrap();
//! let child = tree
//!     .add_child(root, Configuration::new(["loops", "functions"], Difficulty::Easy))
//!     .unwrap();
//!
//! tree.backpropagate(child, -0.1, 1.0).unwrap();
//! assert_eq!(tree.get(root).unwrap().visits(), 1);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod configuration;
mod error;
mod export;
mod node;
mod tree;

pub use configuration::{Configuration, Difficulty, ParseDifficultyError, SpaceBounds};
pub use error::TreeError;
pub use export::{DifficultyStats, ExportSummary, NodeRecord, TreeExport};
pub use node::{Node, NodeId, PhaseMetadata};
pub use tree::{Ancestors, Tree};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
