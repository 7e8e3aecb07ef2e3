//! # silcore Prelude
//!
//! The types needed to build a module, analyze it and run the optimizer, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

pub use crate::{Error, Result};

pub use crate::config::{ModuleOptions, ModuleStage, OptimizerConfig};

// ================================================================================================
// IR
// ================================================================================================

pub use crate::ir::{
    apply_sites, full_apply_sites, verify_function, verify_module, ApplySite, BlockId, Builder,
    ConformanceRef, FullApplySite, Function, FunctionFlags, FunctionId, FunctionType,
    GenericParamKey, GenericSignature, InsertPoint, InstId, InstKind, IsSerialized, Linkage,
    LoadQualifier, MethodDecl, MethodId, Module, NominalDecl, Opcode, ParamConvention, ParamInfo,
    Representation, ResultConvention, ResultInfo, SilType, StoreQualifier, SubstitutionMap, Type,
    TypeContext, VTable, ValueId, WitnessTable,
};

// ================================================================================================
// Analyses and Optimizations
// ================================================================================================

pub use crate::analysis::{BottomUpFunctionOrder, CallGraph, ClassHierarchyAnalysis};

pub use crate::opt::{
    can_devirtualize, try_devirtualize, Devirtualizer, EventKind, EventLog, GenericCloner,
    GenericSpecializer, ModulePass, PassContext, PassPipeline, ReabstractionInfo,
};
