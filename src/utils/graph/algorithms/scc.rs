//! Strongly Connected Components (SCC) using Tarjan's algorithm.
//!
//! A strongly connected component is a maximal set of nodes such that there is a path
//! from every node to every other node in the set. In a call graph the non-trivial SCCs
//! are the groups of mutually recursive functions.
//!
//! The depth-first search is driven by an explicit frame stack instead of recursion, so
//! arbitrarily deep graphs cannot overflow the native stack.

use crate::utils::graph::{NodeId, Successors};

/// Computes the strongly connected components of a directed graph.
///
/// Uses Tarjan's algorithm with a single DFS pass. Each node gets a discovery index and a
/// "lowlink", the smallest index reachable from its DFS subtree through at most one back
/// edge. When a node's lowlink equals its index it is the root of an SCC, which is popped
/// off the node stack.
///
/// # Arguments
///
/// * `graph` - The directed graph to analyze
///
/// # Returns
///
/// A vector of SCCs in **reverse topological order**: if there is an edge from SCC A to
/// SCC B, then B appears before A. Roots are tried by ascending node index, which makes
/// the result deterministic.
///
/// # Complexity
///
/// - Time: O(V + E)
/// - Space: O(V)
///
/// # Examples
///
/// ```rust,ignore
/// use silcore::utils::graph::{AdjacencyGraph, algorithms::strongly_connected_components};
///
/// // A -> B -> A, B -> C
/// let mut graph = AdjacencyGraph::new();
/// let a = graph.add_node('A');
/// let b = graph.add_node('B');
/// let c = graph.add_node('C');
/// graph.add_edge(a, b);
/// graph.add_edge(b, a);
/// graph.add_edge(b, c);
///
/// let sccs = strongly_connected_components(&graph);
/// assert_eq!(sccs.len(), 2);
/// assert_eq!(sccs[0], vec![c]);
/// ```
pub fn strongly_connected_components<G>(graph: &G) -> Vec<Vec<NodeId>>
where
    G: Successors,
{
    let node_count = graph.node_count();
    if node_count == 0 {
        return Vec::new();
    }

    let mut state = TarjanState::new(node_count);
    for root in graph.node_ids() {
        if state.index[root.index()].is_none() {
            state.search_from(graph, root);
        }
    }
    state.sccs
}

/// One suspended DFS visit.
struct Frame {
    node: NodeId,
    successors: Vec<NodeId>,
    next: usize,
}

/// Internal state for Tarjan's algorithm.
struct TarjanState {
    /// Discovery index for each node, `None` if not yet visited
    index: Vec<Option<usize>>,
    /// Lowlink value for each node
    lowlink: Vec<usize>,
    /// Whether a node is currently on the node stack
    on_stack: Vec<bool>,
    /// Nodes of the SCCs not yet completed
    stack: Vec<NodeId>,
    /// Next discovery index
    current_index: usize,
    /// Completed SCCs
    sccs: Vec<Vec<NodeId>>,
}

impl TarjanState {
    fn new(n: usize) -> Self {
        Self {
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            current_index: 0,
            sccs: Vec::new(),
        }
    }

    fn discover<G: Successors>(&mut self, graph: &G, v: NodeId) -> Frame {
        self.index[v.index()] = Some(self.current_index);
        self.lowlink[v.index()] = self.current_index;
        self.current_index += 1;
        self.stack.push(v);
        self.on_stack[v.index()] = true;
        Frame {
            node: v,
            successors: graph.successors(v).collect(),
            next: 0,
        }
    }

    fn search_from<G: Successors>(&mut self, graph: &G, root: NodeId) {
        let mut frames = vec![self.discover(graph, root)];

        while let Some(frame) = frames.last_mut() {
            let v = frame.node.index();
            let successor = frame.successors.get(frame.next).copied();
            frame.next += 1;

            if let Some(w) = successor {
                match self.index[w.index()] {
                    None => {
                        let child = self.discover(graph, w);
                        frames.push(child);
                    }
                    Some(w_index) if self.on_stack[w.index()] => {
                        self.lowlink[v] = self.lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            // All successors of v are done: propagate its lowlink and maybe close an SCC.
            frames.pop();
            if let Some(parent) = frames.last() {
                let p = parent.node.index();
                self.lowlink[p] = self.lowlink[p].min(self.lowlink[v]);
            }
            if Some(self.lowlink[v]) == self.index[v] {
                let mut scc = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w.index()] = false;
                    scc.push(w);
                    if w.index() == v {
                        break;
                    }
                }
                self.sccs.push(scc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::utils::graph::{
        algorithms::scc::strongly_connected_components, AdjacencyGraph, NodeId,
    };

    fn position(sccs: &[Vec<NodeId>], node: NodeId) -> usize {
        sccs.iter().position(|scc| scc.contains(&node)).unwrap()
    }

    #[test]
    fn test_scc_empty_graph() {
        let graph: AdjacencyGraph<()> = AdjacencyGraph::new();
        assert!(strongly_connected_components(&graph).is_empty());
    }

    #[test]
    fn test_scc_single_node_self_loop() {
        let mut graph = AdjacencyGraph::new();
        let a = graph.add_node(());
        graph.add_edge(a, a);

        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs, vec![vec![a]]);
    }

    #[test]
    fn test_scc_linear_chain() {
        // A -> B -> C
        let mut graph = AdjacencyGraph::new();
        let a = graph.add_node('A');
        let b = graph.add_node('B');
        let c = graph.add_node('C');
        graph.add_edge(a, b);
        graph.add_edge(b, c);

        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs, vec![vec![c], vec![b], vec![a]]);
    }

    #[test]
    fn test_scc_mutual_recursion_with_leaf() {
        // f1 <-> f2, f2 -> f3
        let mut graph = AdjacencyGraph::new();
        let f1 = graph.add_node("f1");
        let f2 = graph.add_node("f2");
        let f3 = graph.add_node("f3");
        graph.add_edge(f1, f2);
        graph.add_edge(f2, f1);
        graph.add_edge(f2, f3);

        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs.len(), 2);
        assert_eq!(sccs[0], vec![f3]);
        let cycle: HashSet<_> = sccs[1].iter().copied().collect();
        assert_eq!(cycle, HashSet::from([f1, f2]));
    }

    #[test]
    fn test_scc_reverse_topological_order() {
        // (A <-> B) -> (C <-> D) -> E
        let mut graph = AdjacencyGraph::new();
        let a = graph.add_node('A');
        let b = graph.add_node('B');
        let c = graph.add_node('C');
        let d = graph.add_node('D');
        let e = graph.add_node('E');
        graph.add_edge(a, b);
        graph.add_edge(b, a);
        graph.add_edge(b, c);
        graph.add_edge(c, d);
        graph.add_edge(d, c);
        graph.add_edge(d, e);

        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs.len(), 3);
        assert!(position(&sccs, e) < position(&sccs, c));
        assert!(position(&sccs, c) < position(&sccs, a));
        assert_eq!(position(&sccs, c), position(&sccs, d));
    }

    #[test]
    fn test_scc_cross_edge_to_finished_component() {
        // A -> B, A -> C, C -> B; B finishes before C is discovered
        let mut graph = AdjacencyGraph::new();
        let a = graph.add_node('A');
        let b = graph.add_node('B');
        let c = graph.add_node('C');
        graph.add_edge(a, b);
        graph.add_edge(a, c);
        graph.add_edge(c, b);

        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs, vec![vec![b], vec![c], vec![a]]);
    }

    #[test]
    fn test_scc_deep_chain_does_not_recurse() {
        let mut graph = AdjacencyGraph::with_capacity(100_000);
        let nodes: Vec<_> = (0..100_000).map(|i| graph.add_node(i)).collect();
        for pair in nodes.windows(2) {
            graph.add_edge(pair[0], pair[1]);
        }
        graph.add_edge(nodes[nodes.len() - 1], nodes[0]);

        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), 100_000);
    }

    #[test]
    fn test_scc_disconnected_components() {
        let mut graph = AdjacencyGraph::new();
        let a = graph.add_node(0);
        let b = graph.add_node(1);
        let c = graph.add_node(2);
        graph.add_edge(b, c);
        graph.add_edge(c, b);

        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs.len(), 2);
        assert_eq!(sccs[0], vec![a]);
        assert_eq!(sccs[1].len(), 2);
    }
}
