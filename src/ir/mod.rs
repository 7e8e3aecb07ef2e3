//! The SSA intermediate representation.
//!
//! This module contains the data model every analysis and transformation works on:
//!
//! - [`value`] - SSA values, operands and ownership kinds
//! - [`instruction`] - instruction kinds, shapes, memory behavior and terminators
//! - [`block`], [`function`], [`module`] - the control flow containers
//! - [`builder`] - the instruction factories
//! - [`types`], [`subst`], [`decl`] - lowered types, generic substitutions and declarations
//! - [`apply`] - call site views
//! - [`cloner`] - remapping clones of instructions and bodies
//! - [`verify`] - the structural verifier
//! - [`printer`] - the textual dump
//!
//! # Architecture
//!
//! Entities live in arenas and refer to each other through `Copy` handles
//! ([`ValueId`], [`InstId`], [`BlockId`], [`FunctionId`]). Values, instructions and blocks
//! belong to the arenas of their [`Function`]; functions belong to the [`Module`].
//! Erasing an entity leaves a hole in its arena, so handles stay stable.
//!
//! Use-lists are vectors of [`Operand`] handles stored with each value. Predecessor lists
//! are vectors of [`PredecessorEdge`]s stored with each block. Both are maintained by the
//! function whenever an instruction is inserted, rebound or erased, so they always mirror
//! the operand arrays and successor edges exactly.
//!
//! # Examples
//!
//! ```rust,ignore
//! use silcore::prelude::*;
//!
//! let mut module = Module::new("m", TypeContext::new(), ModuleOptions::default());
//! let f = module.create_function("main", FunctionType::thin(vec![], vec![]), Linkage::Public)?;
//! let entry = module.create_entry_block(f);
//! let mut b = module.builder(f);
//! b.position_at_end(entry);
//! let unit = b.tuple(vec![]);
//! b.return_(unit);
//! verify_function(&module, f)?;
//! ```

pub mod apply;
pub mod block;
pub mod builder;
pub mod cloner;
pub mod decl;
pub mod function;
pub mod instruction;
pub mod module;
pub mod printer;
pub mod subst;
pub mod types;
pub mod value;
pub mod verify;

pub use apply::{
    apply_sites, full_apply_sites, ultimate_function_ref, ApplyKind, ApplySite, FullApplySite,
};
pub use block::{Block, BlockId, PredecessorEdge};
pub use builder::{Builder, InsertPoint};
pub use cloner::{BodySnapshot, InstSnapshot, Remapper};
pub use decl::{
    AccessLevel, ConformanceId, ConformanceRef, DeclId, DeclKind, MethodDecl, MethodId,
    NominalDecl, ProtocolConformance, TypeContext,
};
pub use function::{
    Function, FunctionFlags, FunctionId, IsSerialized, Linkage, SpecializationKind,
    SpecializeAttr,
};
pub use instruction::{
    InstId, InstKind, InstShape, Instruction, LoadQualifier, MemoryBehavior, Opcode, SourceLoc,
    StoreQualifier, SuccessorArity, SuccessorEdge,
};
pub use module::{DefaultWitnessTable, IrStats, Module, VTable, WitnessTable};
pub use printer::{FunctionPrinter, TypeName};
pub use subst::{GenericParamKey, GenericSignature, SubstitutionMap};
pub use types::{
    ArgumentConvention, BuiltinType, FunctionType, ParamConvention, ParamInfo, Representation,
    ResultConvention, ResultInfo, SilType, Type,
};
pub use value::{Operand, OwnershipKind, ValueData, ValueDef, ValueId};
pub use verify::{verify_function, verify_module};
