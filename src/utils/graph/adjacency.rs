//! Adjacency list graph.

use crate::utils::graph::{GraphBase, NodeId, Predecessors, Successors};

/// A directed graph storing node data and deduplicated adjacency lists.
///
/// Parallel edges collapse into one: analyses over it care about reachability, not
/// multiplicity. Edges keep their insertion order, which makes traversals deterministic.
///
/// # Examples
///
/// ```rust,ignore
/// use silcore::utils::graph::AdjacencyGraph;
///
/// let mut graph = AdjacencyGraph::new();
/// let a = graph.add_node("a");
/// let b = graph.add_node("b");
/// assert!(graph.add_edge(a, b));
/// assert!(!graph.add_edge(a, b));
/// assert_eq!(graph.edge_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct AdjacencyGraph<N> {
    nodes: Vec<N>,
    successors: Vec<Vec<NodeId>>,
    predecessors: Vec<Vec<NodeId>>,
    edge_count: usize,
}

impl<N> Default for AdjacencyGraph<N> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            edge_count: 0,
        }
    }
}

impl<N> AdjacencyGraph<N> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty graph with room for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            successors: Vec::with_capacity(capacity),
            predecessors: Vec::with_capacity(capacity),
            edge_count: 0,
        }
    }

    /// Adds a node and returns its identifier.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(data);
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        id
    }

    /// Adds the edge `source -> target`.
    ///
    /// # Returns
    ///
    /// `false` if the edge already existed.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is not a node of the graph.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> bool {
        assert!(target.index() < self.nodes.len(), "edge target {target} out of range");
        let out = &mut self.successors[source.index()];
        if out.contains(&target) {
            return false;
        }
        out.push(target);
        self.predecessors[target.index()].push(source);
        self.edge_count += 1;
        true
    }

    /// Returns the data of a node.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index())
    }

    /// Iterates `(id, data)` pairs by ascending id.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::new(i), n))
    }

    /// Returns the number of distinct edges.
    #[must_use]
    pub const fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Returns `true` if the edge `source -> target` exists.
    #[must_use]
    pub fn contains_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.successors
            .get(source.index())
            .is_some_and(|out| out.contains(&target))
    }

    /// Returns the number of edges leaving `node`.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.successors[node.index()].len()
    }

    /// Returns the number of edges entering `node`.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.predecessors[node.index()].len()
    }
}

impl<N> GraphBase for AdjacencyGraph<N> {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }
}

impl<N> Successors for AdjacencyGraph<N> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.successors[node.index()].iter().copied()
    }
}

impl<N> Predecessors for AdjacencyGraph<N> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.predecessors[node.index()].iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_are_deduplicated() {
        let mut graph = AdjacencyGraph::new();
        let a = graph.add_node('a');
        let b = graph.add_node('b');
        assert!(graph.add_edge(a, b));
        assert!(!graph.add_edge(a, b));
        assert!(graph.add_edge(b, a));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.out_degree(a), 1);
        assert_eq!(graph.in_degree(a), 1);
        assert!(graph.contains_edge(b, a));
    }

    #[test]
    fn test_adjacency_queries() {
        let mut graph = AdjacencyGraph::with_capacity(3);
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        graph.add_edge(a, c);
        graph.add_edge(a, b);
        graph.add_edge(b, c);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![c, b]);
        assert_eq!(graph.predecessors(c).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(graph.node(b), Some(&"b"));
        assert_eq!(graph.node(NodeId::new(9)), None);
        assert_eq!(graph.nodes().count(), 3);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_edge_to_missing_node_panics() {
        let mut graph = AdjacencyGraph::new();
        let a = graph.add_node(());
        graph.add_edge(a, NodeId::new(5));
    }
}
