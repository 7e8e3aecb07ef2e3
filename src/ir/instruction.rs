//! Instructions: kinds, shapes, memory behavior and terminators.
//!
//! An [`Instruction`] consists of a kind-specific payload ([`InstKind`]), an operand array,
//! a result array and, for terminators, an array of successor edges. All arrays are boxed
//! slices sized once by the factory that creates the instruction (see
//! [`Builder`](crate::ir::Builder)); they are never grown afterwards.
//!
//! # Shapes
//!
//! Each [`Opcode`] has a fixed [`InstShape`]:
//!
//! - **NonValue** - no result (stores, releases, terminators)
//! - **SingleValue** - exactly one result; the instruction "is" that value
//! - **MultipleValue** - one result per element of the destructured aggregate, each result
//!   recording its `(instruction, index)` definition
//!
//! # Memory behavior
//!
//! Each opcode statically declares a [`MemoryBehavior`]. Behaviors of composite operations
//! combine with [`MemoryBehavior::combine`]: the maximum of both, except that a read
//! combined with a write yields read-write.
//!
//! # Terminators
//!
//! Terminators declare a [`SuccessorArity`]. Their [`SuccessorEdge`]s carry an optional
//! execution count and are mirrored in the predecessor list of the target block.

use std::fmt;

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::ir::{
    block::BlockId,
    decl::{ConformanceRef, MethodId},
    function::FunctionId,
    subst::SubstitutionMap,
    types::{SilType, Type},
    value::ValueId,
};

entity_id!(
    /// Handle of an instruction in its function's instruction arena.
    InstId, "inst"
);

/// Source position an instruction was generated from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    /// 1-based line, 0 if unknown
    pub line: u32,
    /// 1-based column, 0 if unknown
    pub column: u32,
}

impl SourceLoc {
    /// Creates a location.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Returns `true` if the location is unknown.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.line == 0
    }
}

/// Ownership effect of a `load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadQualifier {
    /// No ownership semantics
    Unqualified,
    /// Moves the value out of memory
    Take,
    /// Copies the value, leaving memory initialized
    Copy,
    /// Loads a trivial value
    Trivial,
}

/// Ownership effect of a `store`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreQualifier {
    /// No ownership semantics
    Unqualified,
    /// Initializes uninitialized memory
    Init,
    /// Replaces and destroys the old value
    Assign,
    /// Stores a trivial value
    Trivial,
}

/// A control flow edge to a successor block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuccessorEdge {
    /// The target block
    pub block: BlockId,
    /// Profile count of the edge, if known
    pub count: Option<u64>,
}

impl SuccessorEdge {
    /// Creates an edge without profile information.
    #[must_use]
    pub const fn new(block: BlockId) -> Self {
        Self { block, count: None }
    }

    /// Creates an edge with an execution count.
    #[must_use]
    pub const fn with_count(block: BlockId, count: u64) -> Self {
        Self {
            block,
            count: Some(count),
        }
    }
}

/// Kind-specific payload of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// Integer constant
    IntegerLiteral {
        /// The constant value
        value: i128,
    },
    /// Reference to a function of the module
    FunctionRef {
        /// The referenced function
        function: FunctionId,
    },
    /// Metatype of the result's instance type
    Metatype,
    /// Allocates an instance of the result's class type
    AllocRef,
    /// Allocates a stack slot
    AllocStack,
    /// Deallocates a stack slot
    DeallocStack,
    /// Reads from an address
    Load {
        /// Ownership effect
        qualifier: LoadQualifier,
    },
    /// Writes a value to an address
    Store {
        /// Ownership effect
        qualifier: StoreQualifier,
    },
    /// Copies between two addresses
    CopyAddr {
        /// Source is left uninitialized
        take: bool,
        /// Destination is uninitialized
        initialize: bool,
    },
    /// Builds a struct from its fields
    Struct,
    /// Builds a tuple from its elements
    Tuple,
    /// Builds an enum value
    Enum {
        /// Case index
        case: u32,
    },
    /// Reads one field of a struct
    StructExtract {
        /// Field index
        field: u32,
    },
    /// Reads one element of a tuple
    TupleExtract {
        /// Element index
        index: u32,
    },
    /// Splits a struct into its fields
    DestructureStruct,
    /// Splits a tuple into its elements
    DestructureTuple,
    /// Converts a class reference to a superclass reference
    Upcast,
    /// Reinterprets a reference as another reference type
    UncheckedRefCast,
    /// Reinterprets an address as another address type
    UncheckedAddrCast,
    /// Reinterprets the bits of a value
    UncheckedBitwiseCast,
    /// Checked cast that traps on failure
    UnconditionalCheckedCast,
    /// Converts between ABI compatible function types
    ConvertFunction,
    /// Turns a thin function into a thick one with empty context
    ThinToThickFunction,
    /// Increments a reference count
    StrongRetain,
    /// Decrements a reference count
    StrongRelease,
    /// Looks up a method in the vtable of the operand's dynamic class
    ClassMethod {
        /// The member being called
        member: MethodId,
    },
    /// Looks up a method in the superclass of the operand's static class
    SuperMethod {
        /// The member being called
        member: MethodId,
    },
    /// Looks up a protocol requirement in a witness table
    WitnessMethod {
        /// The conforming type
        lookup_type: Type,
        /// The conformance providing the witness table
        conformance: ConformanceRef,
        /// The protocol requirement
        member: MethodId,
    },
    /// Calls a function and returns to the next instruction
    Apply {
        /// Substitutions for the callee's generic signature
        subs: SubstitutionMap,
        /// Callee is known not to throw
        nonthrowing: bool,
    },
    /// Binds trailing arguments, producing a closure
    PartialApply {
        /// Substitutions for the callee's generic signature
        subs: SubstitutionMap,
    },
    /// Compiler builtin
    Builtin {
        /// Builtin name
        name: Box<str>,
    },
    /// Traps if the operand is true
    CondFail,
    /// Returns from the function
    Return,
    /// Throws an error from the function
    Throw,
    /// Unwinds a coroutine
    Unwind,
    /// Marks unreachable code
    Unreachable,
    /// Unconditional branch, operands are the successor's arguments
    Branch,
    /// Conditional branch on operand 0
    CondBranch {
        /// Number of operands after the condition passed to the true successor
        true_args: u32,
    },
    /// Calls a throwing function with normal and error successors
    TryApply {
        /// Substitutions for the callee's generic signature
        subs: SubstitutionMap,
    },
    /// Multiway branch on an enum case
    SwitchEnum {
        /// Case index per successor, in successor order
        cases: Box<[u32]>,
        /// The last successor is the default
        has_default: bool,
    },
    /// Multiway branch on an integer value
    SwitchValue {
        /// Case value per successor, in successor order
        cases: Box<[i128]>,
        /// The last successor is the default
        has_default: bool,
    },
    /// Checked cast with success and failure successors
    CheckedCastBranch {
        /// Cast succeeds only for exactly this type
        exact: bool,
        /// Type cast to
        target: SilType,
    },
}

/// Instruction opcode, the payload-free tag of [`InstKind`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[allow(missing_docs)]
pub enum Opcode {
    IntegerLiteral,
    FunctionRef,
    Metatype,
    AllocRef,
    AllocStack,
    DeallocStack,
    Load,
    Store,
    CopyAddr,
    Struct,
    Tuple,
    Enum,
    StructExtract,
    TupleExtract,
    DestructureStruct,
    DestructureTuple,
    Upcast,
    UncheckedRefCast,
    UncheckedAddrCast,
    UncheckedBitwiseCast,
    UnconditionalCheckedCast,
    ConvertFunction,
    ThinToThickFunction,
    StrongRetain,
    StrongRelease,
    ClassMethod,
    SuperMethod,
    WitnessMethod,
    Apply,
    PartialApply,
    Builtin,
    CondFail,
    Return,
    Throw,
    Unwind,
    Unreachable,
    #[strum(serialize = "br")]
    Branch,
    #[strum(serialize = "cond_br")]
    CondBranch,
    TryApply,
    SwitchEnum,
    SwitchValue,
    #[strum(serialize = "checked_cast_br")]
    CheckedCastBranch,
}

/// Result shape of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstShape {
    /// No results
    NonValue,
    /// Exactly one result
    SingleValue,
    /// One result per element of a destructured aggregate
    MultipleValue,
}

/// What an instruction may do to memory, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemoryBehavior {
    /// No memory access
    None,
    /// May read memory
    MayRead,
    /// May write memory
    MayWrite,
    /// May read and write memory
    MayReadWrite,
    /// Arbitrary side effects
    MayHaveSideEffects,
}

impl MemoryBehavior {
    /// Combines two behaviors: the stronger one, except that read and write together give
    /// read-write.
    #[must_use]
    pub fn combine(self, other: MemoryBehavior) -> MemoryBehavior {
        match (self, other) {
            (MemoryBehavior::MayRead, MemoryBehavior::MayWrite)
            | (MemoryBehavior::MayWrite, MemoryBehavior::MayRead) => MemoryBehavior::MayReadWrite,
            (a, b) => a.max(b),
        }
    }

    /// Returns `true` if the behavior includes reading memory.
    #[must_use]
    pub fn may_read(self) -> bool {
        matches!(
            self,
            Self::MayRead | Self::MayReadWrite | Self::MayHaveSideEffects
        )
    }

    /// Returns `true` if the behavior includes writing memory.
    #[must_use]
    pub fn may_write(self) -> bool {
        matches!(
            self,
            Self::MayWrite | Self::MayReadWrite | Self::MayHaveSideEffects
        )
    }
}

/// Number of successors a terminator kind declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessorArity {
    /// Leaves the function
    Zero,
    /// Unconditional
    One,
    /// Two-way
    Two,
    /// Any number of successors
    Many,
}

impl SuccessorArity {
    /// Returns `true` if `count` successors are allowed.
    #[must_use]
    pub const fn accepts(self, count: usize) -> bool {
        match self {
            Self::Zero => count == 0,
            Self::One => count == 1,
            Self::Two => count == 2,
            Self::Many => true,
        }
    }
}

impl Opcode {
    /// Returns the mnemonic used by the textual dump.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Returns the result shape.
    #[must_use]
    pub const fn shape(self) -> InstShape {
        match self {
            Self::DeallocStack
            | Self::Store
            | Self::CopyAddr
            | Self::StrongRetain
            | Self::StrongRelease
            | Self::CondFail
            | Self::Return
            | Self::Throw
            | Self::Unwind
            | Self::Unreachable
            | Self::Branch
            | Self::CondBranch
            | Self::TryApply
            | Self::SwitchEnum
            | Self::SwitchValue
            | Self::CheckedCastBranch => InstShape::NonValue,
            Self::DestructureStruct | Self::DestructureTuple => InstShape::MultipleValue,
            _ => InstShape::SingleValue,
        }
    }

    /// Returns the statically declared memory behavior.
    #[must_use]
    pub const fn memory_behavior(self) -> MemoryBehavior {
        match self {
            Self::Load => MemoryBehavior::MayRead,
            Self::Store => MemoryBehavior::MayWrite,
            Self::CopyAddr => MemoryBehavior::MayReadWrite,
            Self::AllocRef
            | Self::DeallocStack
            | Self::StrongRetain
            | Self::StrongRelease
            | Self::Apply
            | Self::PartialApply
            | Self::TryApply
            | Self::Builtin
            | Self::CondFail
            | Self::UnconditionalCheckedCast
            | Self::CheckedCastBranch
            | Self::Throw
            | Self::Unwind => MemoryBehavior::MayHaveSideEffects,
            _ => MemoryBehavior::None,
        }
    }

    /// Returns the successor arity for terminators, `None` for other opcodes.
    #[must_use]
    pub const fn successor_arity(self) -> Option<SuccessorArity> {
        match self {
            Self::Return | Self::Throw | Self::Unwind | Self::Unreachable => {
                Some(SuccessorArity::Zero)
            }
            Self::Branch => Some(SuccessorArity::One),
            Self::CondBranch | Self::TryApply | Self::CheckedCastBranch => {
                Some(SuccessorArity::Two)
            }
            Self::SwitchEnum | Self::SwitchValue => Some(SuccessorArity::Many),
            _ => None,
        }
    }

    /// Returns `true` for block terminators.
    #[must_use]
    pub const fn is_terminator(self) -> bool {
        self.successor_arity().is_some()
    }

    /// Returns `true` for `apply` and `try_apply`.
    #[must_use]
    pub const fn is_full_apply(self) -> bool {
        matches!(self, Self::Apply | Self::TryApply)
    }

    /// Returns `true` for the dynamic dispatch instructions.
    #[must_use]
    pub const fn is_dispatch(self) -> bool {
        matches!(
            self,
            Self::ClassMethod | Self::SuperMethod | Self::WitnessMethod
        )
    }

    /// Returns `true` for conversions that keep the reference identity of their operand.
    #[must_use]
    pub const fn is_identity_preserving_cast(self) -> bool {
        matches!(self, Self::Upcast | Self::UncheckedRefCast)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl InstKind {
    /// Returns the payload-free opcode.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            InstKind::IntegerLiteral { .. } => Opcode::IntegerLiteral,
            InstKind::FunctionRef { .. } => Opcode::FunctionRef,
            InstKind::Metatype => Opcode::Metatype,
            InstKind::AllocRef => Opcode::AllocRef,
            InstKind::AllocStack => Opcode::AllocStack,
            InstKind::DeallocStack => Opcode::DeallocStack,
            InstKind::Load { .. } => Opcode::Load,
            InstKind::Store { .. } => Opcode::Store,
            InstKind::CopyAddr { .. } => Opcode::CopyAddr,
            InstKind::Struct => Opcode::Struct,
            InstKind::Tuple => Opcode::Tuple,
            InstKind::Enum { .. } => Opcode::Enum,
            InstKind::StructExtract { .. } => Opcode::StructExtract,
            InstKind::TupleExtract { .. } => Opcode::TupleExtract,
            InstKind::DestructureStruct => Opcode::DestructureStruct,
            InstKind::DestructureTuple => Opcode::DestructureTuple,
            InstKind::Upcast => Opcode::Upcast,
            InstKind::UncheckedRefCast => Opcode::UncheckedRefCast,
            InstKind::UncheckedAddrCast => Opcode::UncheckedAddrCast,
            InstKind::UncheckedBitwiseCast => Opcode::UncheckedBitwiseCast,
            InstKind::UnconditionalCheckedCast => Opcode::UnconditionalCheckedCast,
            InstKind::ConvertFunction => Opcode::ConvertFunction,
            InstKind::ThinToThickFunction => Opcode::ThinToThickFunction,
            InstKind::StrongRetain => Opcode::StrongRetain,
            InstKind::StrongRelease => Opcode::StrongRelease,
            InstKind::ClassMethod { .. } => Opcode::ClassMethod,
            InstKind::SuperMethod { .. } => Opcode::SuperMethod,
            InstKind::WitnessMethod { .. } => Opcode::WitnessMethod,
            InstKind::Apply { .. } => Opcode::Apply,
            InstKind::PartialApply { .. } => Opcode::PartialApply,
            InstKind::Builtin { .. } => Opcode::Builtin,
            InstKind::CondFail => Opcode::CondFail,
            InstKind::Return => Opcode::Return,
            InstKind::Throw => Opcode::Throw,
            InstKind::Unwind => Opcode::Unwind,
            InstKind::Unreachable => Opcode::Unreachable,
            InstKind::Branch => Opcode::Branch,
            InstKind::CondBranch { .. } => Opcode::CondBranch,
            InstKind::TryApply { .. } => Opcode::TryApply,
            InstKind::SwitchEnum { .. } => Opcode::SwitchEnum,
            InstKind::SwitchValue { .. } => Opcode::SwitchValue,
            InstKind::CheckedCastBranch { .. } => Opcode::CheckedCastBranch,
        }
    }

    /// Returns the substitutions of an apply-like instruction.
    #[must_use]
    pub fn substitutions(&self) -> Option<&SubstitutionMap> {
        match self {
            InstKind::Apply { subs, .. }
            | InstKind::PartialApply { subs }
            | InstKind::TryApply { subs } => Some(subs),
            _ => None,
        }
    }
}

/// An instruction in its function's arena.
#[derive(Debug, Clone)]
pub struct Instruction {
    kind: InstKind,
    operands: Box<[ValueId]>,
    results: Box<[ValueId]>,
    successors: Box<[SuccessorEdge]>,
    parent: Option<BlockId>,
    loc: SourceLoc,
}

impl Instruction {
    pub(crate) fn new(
        kind: InstKind,
        operands: Box<[ValueId]>,
        successors: Box<[SuccessorEdge]>,
        loc: SourceLoc,
    ) -> Self {
        Self {
            kind,
            operands,
            results: Box::new([]),
            successors,
            parent: None,
            loc,
        }
    }

    /// Returns the kind payload.
    #[must_use]
    pub const fn kind(&self) -> &InstKind {
        &self.kind
    }

    /// Returns the opcode.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.kind.opcode()
    }

    /// Returns all operands.
    #[must_use]
    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    /// Returns the number of operands.
    #[must_use]
    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    /// Returns operand `index`.
    #[must_use]
    pub fn operand(&self, index: usize) -> ValueId {
        self.operands[index]
    }

    /// Returns the results: none, one, or one per destructured element.
    #[must_use]
    pub fn results(&self) -> &[ValueId] {
        &self.results
    }

    /// Returns the single result of a SingleValue instruction.
    #[must_use]
    pub fn result(&self) -> Option<ValueId> {
        match self.opcode().shape() {
            InstShape::SingleValue => self.results.first().copied(),
            _ => None,
        }
    }

    /// Returns the successor edges of a terminator.
    #[must_use]
    pub fn successors(&self) -> &[SuccessorEdge] {
        &self.successors
    }

    /// Returns the containing block, `None` once erased.
    #[must_use]
    pub const fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    /// Returns the source location.
    #[must_use]
    pub const fn loc(&self) -> SourceLoc {
        self.loc
    }

    /// Returns `true` for terminators.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.opcode().is_terminator()
    }

    /// Returns the declared memory behavior.
    #[must_use]
    pub fn memory_behavior(&self) -> MemoryBehavior {
        self.opcode().memory_behavior()
    }

    /// Returns the operands passed to successor `index` as block arguments.
    ///
    /// Only `br` and `cond_br` pass operands to their successors.
    #[must_use]
    pub fn successor_args(&self, index: usize) -> &[ValueId] {
        match self.kind {
            InstKind::Branch if index == 0 => &self.operands,
            InstKind::CondBranch { true_args } => {
                let split = 1 + true_args as usize;
                match index {
                    0 => &self.operands[1..split],
                    1 => &self.operands[split..],
                    _ => &[],
                }
            }
            _ => &[],
        }
    }

    pub(crate) fn kind_mut(&mut self) -> &mut InstKind {
        &mut self.kind
    }

    pub(crate) fn set_operand(&mut self, index: usize, value: ValueId) {
        self.operands[index] = value;
    }

    pub(crate) fn set_results(&mut self, results: Box<[ValueId]>) {
        self.results = results;
    }

    pub(crate) fn set_successor_block(&mut self, index: usize, block: BlockId) {
        self.successors[index].block = block;
    }

    pub(crate) fn set_parent(&mut self, parent: Option<BlockId>) {
        self.parent = parent;
    }
}
