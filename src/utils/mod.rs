//! Utility infrastructure shared by the analyses.

mod dot;
pub mod graph;

pub use dot::{escape_dot, DotWriter};
