//! Node identifiers.

use std::fmt;

/// A strongly-typed identifier for a node of a graph.
///
/// Node IDs are assigned sequentially starting from 0 as nodes are added, so they can be
/// used directly to index per-node vectors.
///
/// # Examples
///
/// ```rust,ignore
/// use silcore::utils::graph::{AdjacencyGraph, NodeId};
///
/// let mut graph = AdjacencyGraph::new();
/// let a: NodeId = graph.add_node("a");
/// assert_eq!(a.index(), 0);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a `NodeId` from a raw index.
    ///
    /// Normal usage obtains IDs from
    /// [`AdjacencyGraph::add_node`](crate::utils::graph::AdjacencyGraph::add_node).
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw 0-based index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(7);
        assert_eq!(node.index(), 7);
        assert_eq!(format!("{node}"), "n7");
        assert_eq!(format!("{node:?}"), "NodeId(7)");
        assert_eq!(NodeId::from(7), node);
    }

    #[test]
    fn test_node_id_ordering() {
        let mut ids = vec![NodeId::new(2), NodeId::new(0), NodeId::new(1)];
        ids.sort();
        assert_eq!(ids, vec![NodeId::new(0), NodeId::new(1), NodeId::new(2)]);
    }
}
