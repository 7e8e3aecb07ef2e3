//! Generic directed graph infrastructure.
//!
//! The call graph and any other graph-shaped analysis result are stored as an
//! [`AdjacencyGraph`] and analyzed through the [`GraphBase`] / [`Successors`] /
//! [`Predecessors`] traits, so algorithms stay independent of what the nodes describe.
//!
//! # Key Components
//!
//! - [`NodeId`] - strongly-typed node identifier
//! - [`AdjacencyGraph`] - directed graph with deduplicated adjacency lists
//! - [`algorithms`] - graph algorithms (SCC)

mod adjacency;
pub mod algorithms;
mod node;
mod traits;

pub use adjacency::AdjacencyGraph;
pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, Successors};
