// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # silcore
//!
//! An SSA intermediate representation for an ahead-of-time compiler of a language with
//! classes, protocols and generics, together with the optimizations that need the most
//! from it: class-hierarchy-driven devirtualization and generic function specialization.
//!
//! ## Features
//!
//! - **Typed SSA IR** - functions of basic blocks with block arguments, multi-result
//!   instructions and operand use lists kept up to date on every rewrite
//! - **Ownership and conventions** - parameter and result conventions, value ownership and
//!   address types checked by a structural verifier
//! - **Class hierarchy analysis** - direct and transitive subclasses, protocol adopters
//! - **Devirtualization** - `class_method`, `super_method` and `witness_method` calls
//!   rewritten into direct calls when the implementation is statically known
//! - **Generic specialization** - concrete clones of generic functions with indirect
//!   parameters and results re-abstracted to direct ones
//! - **Pass pipeline** - bottom-up pass scheduling with an event log of every rewrite
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use silcore::prelude::*;
//!
//! let mut module = Module::new("main", TypeContext::new(), ModuleOptions::default());
//! let f = module.create_function("answer", FunctionType::thin(vec![], vec![Type::int(64)]), Linkage::Public)?;
//! let entry = module.create_entry_block(f);
//! let mut b = module.builder_at(f, InsertPoint::End(entry));
//! let value = b.integer_literal(Type::int(64), 42);
//! b.return_(value);
//! verify_function(&module, f)?;
//!
//! let report = PassPipeline::with_defaults(OptimizerConfig::default()).run(&mut module)?;
//! println!("{}", report.events.summary());
//! # Ok::<(), silcore::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - types, declarations, values, instructions, blocks, functions and the module
//! - [`analysis`] - class hierarchy, call graph and bottom-up function order
//! - [`opt`] - devirtualization, specialization and the pass pipeline
//! - [`config`] - module options and optimizer configuration
//! - [`utils`] - graph algorithms and DOT output
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: every rewrite at `debug`, every rejected
//! candidate at `trace`. No logger is installed.
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result<T, Error>`](Result):
//!
//! ```rust,ignore
//! use silcore::Error;
//!
//! match module.create_function("f", ty, Linkage::Public) {
//!     Ok(f) => println!("created {f}"),
//!     Err(Error::DuplicateFunction(name)) => println!("@{name} already exists"),
//!     Err(e) => println!("error: {e}"),
//! }
//! ```

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;


/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,ignore
/// use silcore::prelude::*;
///
/// let module = Module::new("m", TypeContext::new(), ModuleOptions::default());
/// ```
pub mod prelude;

/// Module options and optimizer configuration.
pub mod config;

/// The intermediate representation.
pub mod ir;

/// Whole-module analyses.
pub mod analysis;

/// Optimizations and the pass pipeline.
pub mod opt;

/// Graph algorithms and output helpers.
pub mod utils;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `silcore` Error type
///
/// The main error type for all fallible operations in this crate: module registration,
/// verification and re-abstraction input checks.
pub use error::Error;
