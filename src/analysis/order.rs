//! Call graph and bottom-up function ordering.
//!
//! The [`CallGraph`] has one node per live function and an edge from `F` to `G` whenever a
//! full apply in `F` ultimately calls `G`, looking through closures and representation
//! conversions. Indirect calls whose target cannot be resolved contribute no edge.
//!
//! [`BottomUpFunctionOrder`] groups the functions into strongly connected components and
//! orders them so that callees come before their callers wherever the graph is acyclic.
//! Interprocedural passes walk functions in this order so that the facts they compute for a
//! callee are ready when its callers are processed.

use std::collections::HashMap;

use crate::{
    ir::{full_apply_sites, FunctionId, Module},
    utils::{
        graph::{
            algorithms::strongly_connected_components, AdjacencyGraph, GraphBase, NodeId,
            Successors,
        },
        DotWriter,
    },
};

/// Direct call relationships between the functions of a module.
#[derive(Debug, Clone)]
pub struct CallGraph {
    graph: AdjacencyGraph<FunctionId>,
    nodes: HashMap<FunctionId, NodeId>,
}

impl CallGraph {
    /// Builds the call graph of every live function in `module`.
    #[must_use]
    pub fn build(module: &Module) -> Self {
        let mut graph = AdjacencyGraph::with_capacity(module.function_count());
        let mut nodes = HashMap::new();
        for id in module.functions() {
            nodes.insert(id, graph.add_node(id));
        }

        for caller in module.functions() {
            let func = module.function(caller);
            for site in full_apply_sites(func) {
                let Some(callee) = site.site().ultimate_callee(func) else {
                    continue;
                };
                if let Some(&target) = nodes.get(&callee) {
                    graph.add_edge(nodes[&caller], target);
                }
            }
        }

        Self { graph, nodes }
    }

    /// Returns the number of functions in the graph.
    #[must_use]
    pub fn function_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of distinct caller/callee pairs.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the node of a function.
    #[must_use]
    pub fn node(&self, function: FunctionId) -> Option<NodeId> {
        self.nodes.get(&function).copied()
    }

    /// Returns the function at a node.
    #[must_use]
    pub fn function(&self, node: NodeId) -> Option<FunctionId> {
        self.graph.node(node).copied()
    }

    /// Returns the functions `caller` calls.
    #[must_use]
    pub fn callees(&self, caller: FunctionId) -> Vec<FunctionId> {
        self.node(caller)
            .map(|node| {
                self.graph
                    .successors(node)
                    .filter_map(|succ| self.function(succ))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the underlying graph.
    #[must_use]
    pub fn graph(&self) -> &AdjacencyGraph<FunctionId> {
        &self.graph
    }

    /// Renders the graph in DOT format, one cluster per recursive component.
    #[must_use]
    pub fn to_dot(&self, module: &Module) -> String {
        let mut dot = DotWriter::new(&format!("calls of {}", module.name()));
        for (node, function) in self.graph.nodes() {
            dot.node(node.index(), &format!("@{}", module.function(*function).name()));
        }
        for node in self.graph.node_ids() {
            for succ in self.graph.successors(node) {
                dot.edge(node.index(), succ.index());
            }
        }
        let sccs = strongly_connected_components(&self.graph);
        for (index, scc) in sccs.iter().filter(|scc| scc.len() > 1).enumerate() {
            let members: Vec<usize> = scc.iter().map(|n| n.index()).collect();
            dot.cluster(index, &format!("recursive {index}"), &members);
        }
        dot.finish()
    }
}

/// Functions grouped into strongly connected components, callees first.
#[derive(Debug, Clone)]
pub struct BottomUpFunctionOrder {
    sccs: Vec<Vec<FunctionId>>,
}

impl BottomUpFunctionOrder {
    /// Computes the order for `module`.
    #[must_use]
    pub fn new(module: &Module) -> Self {
        Self::from_call_graph(&CallGraph::build(module))
    }

    /// Computes the order from an existing call graph.
    #[must_use]
    pub fn from_call_graph(calls: &CallGraph) -> Self {
        let sccs = strongly_connected_components(calls.graph())
            .into_iter()
            .map(|scc| {
                scc.into_iter()
                    .filter_map(|node| calls.function(node))
                    .collect()
            })
            .collect();
        Self { sccs }
    }

    /// Returns the components, each component after every component it calls into.
    #[must_use]
    pub fn sccs(&self) -> &[Vec<FunctionId>] {
        &self.sccs
    }

    /// Returns all functions, flattened in component order.
    #[must_use]
    pub fn functions(&self) -> Vec<FunctionId> {
        self.sccs.iter().flatten().copied().collect()
    }
}
