//! Evaluation oracle implementations
//!
//! - [`HttpOracle`]: the real evaluation service over HTTP
//! - [`SimulatedOracle`]: seeded, deterministic outcomes for dry runs

mod http;
mod simulated;

pub use http::HttpOracle;
pub use simulated::SimulatedOracle;
