//! Module-wide analyses over the IR.
//!
//! # Architecture
//!
//! The analysis module is organized into focused sub-modules:
//!
//! - [`cha`] - Class Hierarchy Analysis: direct and transitive subclasses, protocol
//!   implementers
//! - [`order`] - the call graph and the bottom-up (callees first) function order
//!
//! Both analyses are snapshots of the module at the time they are built. Transformations
//! that change the class hierarchy or the call structure must rebuild them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use silcore::analysis::{BottomUpFunctionOrder, ClassHierarchyAnalysis};
//!
//! let cha = ClassHierarchyAnalysis::new(&module);
//! let order = BottomUpFunctionOrder::new(&module);
//! for scc in order.sccs() {
//!     for function in scc {
//!         // callees of `function` outside its component were visited already
//!     }
//! }
//! ```

pub mod cha;
pub mod order;

pub use cha::ClassHierarchyAnalysis;
pub use order::{BottomUpFunctionOrder, CallGraph};
