//! DOT format utilities for graph visualization.
//!
//! The output can be rendered with Graphviz tools.

use std::fmt::Write;

/// Escapes a string for use inside a double-quoted DOT label or identifier.
///
/// # Arguments
///
/// * `s` - The string to escape
///
/// # Returns
///
/// A new string with quotes, backslashes and line breaks escaped.
///
/// # Examples
///
/// ```rust,ignore
/// use silcore::utils::escape_dot;
///
/// assert_eq!(escape_dot("say \"hi\""), "say \\\"hi\\\"");
/// ```
#[must_use]
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
}

/// Incrementally builds a `digraph` document.
#[derive(Debug)]
pub struct DotWriter {
    out: String,
}

impl DotWriter {
    /// Starts a digraph named `name` with box-shaped nodes.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape_dot(name));
        let _ = writeln!(out, "    node [shape=box, fontname=\"monospace\"];");
        Self { out }
    }

    /// Emits a node with a label.
    pub fn node(&mut self, id: usize, label: &str) {
        let _ = writeln!(self.out, "    n{id} [label=\"{}\"];", escape_dot(label));
    }

    /// Emits an edge.
    pub fn edge(&mut self, from: usize, to: usize) {
        let _ = writeln!(self.out, "    n{from} -> n{to};");
    }

    /// Groups nodes in a labelled cluster.
    pub fn cluster(&mut self, index: usize, label: &str, members: &[usize]) {
        let _ = writeln!(self.out, "    subgraph cluster_{index} {{");
        let _ = writeln!(self.out, "        label=\"{}\";", escape_dot(label));
        for member in members {
            let _ = writeln!(self.out, "        n{member};");
        }
        let _ = writeln!(self.out, "    }}");
    }

    /// Closes the graph and returns the document.
    #[must_use]
    pub fn finish(mut self) -> String {
        self.out.push_str("}\n");
        self.out
    }
}
