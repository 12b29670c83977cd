//! Capmap Core - session orchestration
//!
//! Ties the search engine to its collaborators:
//! - runs ordered phase sequences with carry-over between phases
//! - persists trees and phase history in a session store
//! - loads YAML session documents
//! - talks to the evaluation service (HTTP) or simulates it
//!
//! # Example
//!
//! ```rust,no_run
//! use capmap_core::{MemorySessionStore, Orchestrator, SessionConfig, SimulatedOracle};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::load("session.yaml").await?;
//! let orchestrator = Orchestrator::new(
//!     Arc::new(SimulatedOracle::new(7)),
//!     Arc::new(MemorySessionStore::new()),
//! );
//!
//! for result in orchestrator.run_session(&config).await? {
//!     println!("{}: {} after {} iterations", result.phase, result.state, result.iterations);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod oracle;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod types;

pub use error::{CapmapError, SequenceError, StoreError};
pub use oracle::{HttpOracle, SimulatedOracle};
pub use orchestrator::Orchestrator;
pub use session::{RootConfig, SessionConfig, TreeConfig};
pub use store::{FileSessionStore, MemorySessionStore, SessionDocument, SessionStore};
pub use types::{PhaseRecord, PhaseResult, SessionContext};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
