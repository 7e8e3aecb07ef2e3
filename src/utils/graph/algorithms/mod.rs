//! Graph algorithms.
//!
//! - [`strongly_connected_components`] - Tarjan's algorithm, iterative

mod scc;

pub use scc::strongly_connected_components;
