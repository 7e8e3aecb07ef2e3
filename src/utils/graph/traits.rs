//! Trait definitions for graph abstractions.
//!
//! Algorithms are written against these traits rather than a concrete graph type:
//!
//! - [`GraphBase`] - node count and node iteration
//! - [`Successors`] - forward edge traversal
//! - [`Predecessors`] - backward edge traversal
//!
//! All adjacency queries return iterators rather than collections.

use crate::utils::graph::NodeId;

/// Core graph properties: the number of nodes and their identifiers.
pub trait GraphBase {
    /// Returns the number of nodes in the graph.
    fn node_count(&self) -> usize;

    /// Returns an iterator over all node identifiers, by ascending index.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Graphs supporting forward edge traversal.
///
/// # Examples
///
/// ```rust,ignore
/// use silcore::utils::graph::{AdjacencyGraph, Successors};
///
/// let mut graph = AdjacencyGraph::new();
/// let a = graph.add_node("a");
/// let b = graph.add_node("b");
/// graph.add_edge(a, b);
/// assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b]);
/// ```
pub trait Successors: GraphBase {
    /// Returns an iterator over the targets of the edges leaving `node`.
    ///
    /// # Panics
    ///
    /// May panic if `node` is not a valid node in the graph.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Graphs supporting backward edge traversal.
pub trait Predecessors: GraphBase {
    /// Returns an iterator over the sources of the edges entering `node`.
    ///
    /// # Panics
    ///
    /// May panic if `node` is not a valid node in the graph.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}
