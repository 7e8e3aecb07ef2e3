//! Functions: the arenas holding values, instructions and blocks, plus function attributes.
//!
//! A [`Function`] owns three arenas (values, instructions, blocks) and a layout list giving
//! the order of its blocks, the first one being the entry block. Handles are stable for the
//! lifetime of the function: erasing an instruction or block leaves a hole in its arena and
//! never renumbers other entities.
//!
//! Mutations that only touch the function itself live here: creating blocks and block
//! arguments, rebinding operands, replacing all uses of a value. Creating and erasing
//! instructions goes through [`Builder`](crate::ir::Builder), which also keeps the module's
//! function reference counts and statistics up to date.
//!
//! # Examples
//!
//! ```rust,ignore
//! let f = module.function_mut(id);
//! let old = f.block_args(bb)[0];
//! f.replace_all_uses_with(old, new);
//! assert!(f.use_empty(old));
//! ```

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;

use crate::ir::{
    block::{Block, BlockId, PredecessorEdge},
    builder::InsertPoint,
    decl::TypeContext,
    instruction::{InstId, InstKind, Instruction},
    subst::{GenericSignature, SubstitutionMap},
    types::{FunctionType, SilType},
    value::{Operand, OwnershipKind, ValueData, ValueDef, ValueId},
};

entity_id!(
    /// Handle of a function in its module.
    FunctionId, "fn"
);

bitflags! {
    /// Boolean attributes of a function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FunctionFlags: u32 {
        /// Always inlined, even without optimization
        const TRANSPARENT = 0x01;
        /// Compiler generated forwarding thunk
        const THUNK = 0x02;
        /// Lazy initializer of a global variable
        const GLOBAL_INIT = 0x04;
        /// Opted out of optimization
        const NO_OPTIMIZE = 0x08;
        /// Inlining requested by the user
        const ALWAYS_INLINE = 0x10;
    }
}

/// Symbol linkage of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linkage {
    /// Exported definition
    Public,
    /// Exported, but emitted into every client using it
    PublicNonAbi,
    /// Visible within the linked image only
    Hidden,
    /// Emitted on demand by every module using it, deduplicated by the linker
    Shared,
    /// Visible within the module only
    Private,
    /// Declaration of a public function of another module
    PublicExternal,
    /// Declaration of a hidden function of another module
    HiddenExternal,
    /// Declaration of a shared function of another module
    SharedExternal,
}

impl Linkage {
    /// Returns `true` if clients of the module can reference the symbol.
    #[must_use]
    pub const fn has_public_visibility(self) -> bool {
        matches!(self, Self::Public | Self::PublicNonAbi | Self::PublicExternal)
    }

    /// Returns `true` for declarations of functions defined elsewhere.
    #[must_use]
    pub const fn is_external(self) -> bool {
        matches!(
            self,
            Self::PublicExternal | Self::HiddenExternal | Self::SharedExternal
        )
    }

    /// Returns the linkage a specialization of a function with this linkage gets.
    #[must_use]
    pub const fn for_specialization(self) -> Linkage {
        match self {
            Self::Private => Self::Private,
            _ => Self::Shared,
        }
    }
}

/// Fragility of a function body, ordered from least to most exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IsSerialized {
    /// Body private to the module
    NotSerialized,
    /// Body may be serialized if referenced from serialized code
    Serializable,
    /// Body is part of the module interface and inlinable by clients
    Serialized,
}

/// Whether a requested specialization binds all generic parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecializationKind {
    /// Every parameter is concrete
    Full,
    /// Some parameters stay generic
    Partial,
}

/// A user requested specialization of a generic function.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecializeAttr {
    /// The requested bindings
    pub subs: SubstitutionMap,
    /// The specialization is exported as public symbol
    pub exported: bool,
    /// Full or partial specialization
    pub kind: SpecializationKind,
}

/// Blocks taken out of a function, with the types of every value they mention.
#[derive(Debug)]
pub(crate) struct DetachedBlocks {
    blocks: Vec<DetachedBlock>,
    types: HashMap<ValueId, SilType>,
}

#[derive(Debug)]
struct DetachedBlock {
    id: BlockId,
    args: Vec<(ValueId, OwnershipKind)>,
    insts: Vec<DetachedInst>,
}

#[derive(Debug)]
struct DetachedInst {
    inst: Instruction,
    results: Vec<(ValueId, OwnershipKind)>,
}

/// A function definition or declaration.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    ty: FunctionType,
    linkage: Linkage,
    serialized: IsSerialized,
    flags: FunctionFlags,
    specialize_attrs: Vec<SpecializeAttr>,
    values: Vec<ValueData>,
    insts: Vec<Option<Instruction>>,
    blocks: Vec<Option<Block>>,
    layout: Vec<BlockId>,
    undefs: HashMap<SilType, ValueId>,
}

impl Function {
    pub(crate) fn new(name: impl Into<String>, ty: FunctionType, linkage: Linkage) -> Self {
        Self {
            name: name.into(),
            ty,
            linkage,
            serialized: IsSerialized::NotSerialized,
            flags: FunctionFlags::empty(),
            specialize_attrs: Vec::new(),
            values: Vec::new(),
            insts: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
            undefs: HashMap::new(),
        }
    }

    /// Returns the unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the lowered function type.
    #[must_use]
    pub const fn lowered_type(&self) -> &FunctionType {
        &self.ty
    }

    /// Returns the generic signature of the function.
    #[must_use]
    pub fn generic_sig(&self) -> Option<&GenericSignature> {
        self.ty.generic_sig.as_ref()
    }

    /// Returns the linkage.
    #[must_use]
    pub const fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Changes the linkage.
    pub fn set_linkage(&mut self, linkage: Linkage) {
        self.linkage = linkage;
    }

    /// Returns the fragility.
    #[must_use]
    pub const fn serialized(&self) -> IsSerialized {
        self.serialized
    }

    /// Changes the fragility.
    pub fn set_serialized(&mut self, serialized: IsSerialized) {
        self.serialized = serialized;
    }

    /// Returns `true` if the body may be inlined into other modules.
    #[must_use]
    pub fn is_serialized(&self) -> bool {
        self.serialized == IsSerialized::Serialized
    }

    /// Returns the attribute flags.
    #[must_use]
    pub const fn flags(&self) -> FunctionFlags {
        self.flags
    }

    /// Sets attribute flags in addition to the current ones.
    pub fn insert_flags(&mut self, flags: FunctionFlags) {
        self.flags.insert(flags);
    }

    /// Returns `true` for lazy global initializers.
    #[must_use]
    pub fn is_global_init(&self) -> bool {
        self.flags.contains(FunctionFlags::GLOBAL_INIT)
    }

    /// Returns `false` if the function opted out of optimization.
    #[must_use]
    pub fn should_optimize(&self) -> bool {
        !self.flags.contains(FunctionFlags::NO_OPTIMIZE)
    }

    /// Returns the requested specializations.
    #[must_use]
    pub fn specialize_attrs(&self) -> &[SpecializeAttr] {
        &self.specialize_attrs
    }

    /// Records a requested specialization.
    pub fn add_specialize_attr(&mut self, attr: SpecializeAttr) {
        self.specialize_attrs.push(attr);
    }

    /// Returns `true` if the function may be referenced from serialized code.
    ///
    /// Serialized functions can always be referenced; otherwise the symbol must be visible
    /// to clients.
    #[must_use]
    pub fn has_valid_linkage_for_fragile_ref(&self) -> bool {
        self.is_serialized() || self.linkage.has_public_visibility()
    }

    /// Returns `true` if the function has a body.
    #[must_use]
    pub fn is_definition(&self) -> bool {
        !self.layout.is_empty()
    }

    // ---------------------------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------------------------

    /// Returns the blocks in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.layout.iter().copied()
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.layout.len()
    }

    /// Returns the entry block.
    #[must_use]
    pub fn entry_block(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    /// Returns a block.
    ///
    /// # Panics
    ///
    /// Panics if the block has been erased.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        self.blocks[id.index()]
            .as_ref()
            .expect("block has been erased")
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks[id.index()]
            .as_mut()
            .expect("block has been erased")
    }

    /// Returns `true` if `id` refers to a live block.
    #[must_use]
    pub fn contains_block(&self, id: BlockId) -> bool {
        self.blocks.get(id.index()).is_some_and(Option::is_some)
    }

    /// Appends a new empty block to the layout.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(Some(Block::new()));
        self.layout.push(id);
        id
    }

    /// Creates a new empty block placed right after `after` in the layout.
    pub fn create_block_after(&mut self, after: BlockId) -> BlockId {
        let id = self.create_block();
        self.move_block_after(id, after);
        id
    }

    /// Creates the entry block with one argument per SIL argument of the function type.
    ///
    /// Argument ownership is derived from the convention and the argument type.
    ///
    /// # Panics
    ///
    /// Panics if the function already has blocks.
    pub fn create_entry_block(&mut self, types: &TypeContext) -> BlockId {
        assert!(self.layout.is_empty(), "function already has an entry block");
        let entry = self.create_block();
        let arg_types = self.ty.argument_types();
        let conventions = self.ty.argument_conventions();
        for (ty, convention) in arg_types.into_iter().zip(conventions) {
            let ownership = OwnershipKind::for_argument(convention, types.is_trivial(ty.ty()));
            self.add_block_arg(entry, ty, ownership);
        }
        entry
    }

    /// Moves `block` right after `after` in the layout.
    pub fn move_block_after(&mut self, block: BlockId, after: BlockId) {
        if let Some(pos) = self.layout.iter().position(|b| *b == block) {
            self.layout.remove(pos);
        }
        let pos = self
            .layout
            .iter()
            .position(|b| *b == after)
            .map_or(self.layout.len(), |p| p + 1);
        self.layout.insert(pos, block);
    }

    /// Removes an empty, unreferenced block.
    ///
    /// # Panics
    ///
    /// Panics if the block still contains instructions, has predecessors, or has arguments
    /// with uses.
    pub fn erase_block(&mut self, block: BlockId) {
        let data = self.block(block);
        assert!(data.is_empty(), "erasing {block} which still has instructions");
        assert!(
            data.predecessor_edges().is_empty(),
            "erasing {block} which still has predecessors"
        );
        let args = data.args().to_vec();
        for arg in args {
            assert!(self.use_empty(arg), "erasing {block} whose argument {arg} is used");
            self.values[arg.index()].set_def(ValueDef::Erased);
        }
        self.layout.retain(|b| *b != block);
        self.blocks[block.index()] = None;
    }

    /// Takes `blocks` out of the function so they can be attached to another one.
    ///
    /// Uses of the moved values by instructions staying behind are rebound to `undef`.
    ///
    /// # Panics
    ///
    /// Panics if one of the blocks is the entry block, or if a control flow edge connects a
    /// moved block with one staying behind.
    pub(crate) fn detach_blocks(&mut self, blocks: &[BlockId]) -> DetachedBlocks {
        let moving: HashSet<BlockId> = blocks.iter().copied().collect();
        for &block in blocks {
            assert_ne!(self.entry_block(), Some(block), "moving entry block {block}");
            for edge in self.block(block).predecessor_edges() {
                assert!(
                    self.inst(edge.inst).parent().is_some_and(|p| moving.contains(&p)),
                    "moving {block} which is reached from a block staying behind"
                );
            }
            for succ in self.successor_blocks(block) {
                assert!(
                    moving.contains(&succ),
                    "moving {block} which branches to {succ} staying behind"
                );
            }
        }

        let mut types = HashMap::new();
        let mut defined = Vec::new();
        for &block in blocks {
            defined.extend_from_slice(self.block(block).args());
            for &inst in self.block(block).insts() {
                defined.extend_from_slice(self.inst(inst).results());
            }
        }
        for &value in &defined {
            types.insert(value, self.value_type(value).clone());
            let outside: Vec<Operand> = self
                .uses(value)
                .iter()
                .copied()
                .filter(|op| {
                    !self
                        .inst(op.inst)
                        .parent()
                        .is_some_and(|p| moving.contains(&p))
                })
                .collect();
            if !outside.is_empty() {
                let undef = self.undef(self.value_type(value).clone());
                for op in outside {
                    self.set_operand(op, undef);
                }
            }
        }

        let mut detached = Vec::with_capacity(blocks.len());
        for &block in blocks {
            let data = self.blocks[block.index()]
                .take()
                .expect("block has been erased");
            self.layout.retain(|b| *b != block);
            let args = data
                .args()
                .iter()
                .map(|&arg| {
                    self.values[arg.index()].set_def(ValueDef::Erased);
                    (arg, self.ownership(arg))
                })
                .collect();
            let mut insts = Vec::with_capacity(data.insts().len());
            for &id in data.insts() {
                let inst = self.insts[id.index()]
                    .take()
                    .expect("instruction has been erased");
                for (index, &value) in inst.operands().iter().enumerate() {
                    self.values[value.index()].remove_use(Operand::new(id, index));
                    types
                        .entry(value)
                        .or_insert_with(|| self.values[value.index()].ty().clone());
                }
                let results = inst
                    .results()
                    .iter()
                    .map(|&r| {
                        self.values[r.index()].set_def(ValueDef::Erased);
                        (r, self.ownership(r))
                    })
                    .collect();
                insts.push(DetachedInst { inst, results });
            }
            detached.push(DetachedBlock {
                id: block,
                args,
                insts,
            });
        }
        DetachedBlocks {
            blocks: detached,
            types,
        }
    }

    /// Re-homes detached blocks, placing them after `after` or at the end of the layout.
    ///
    /// Operands defined outside the detached blocks become `undef` of their type. Returns
    /// the new handles in the order the blocks were detached.
    pub(crate) fn attach_blocks(
        &mut self,
        detached: DetachedBlocks,
        after: Option<BlockId>,
    ) -> Vec<BlockId> {
        let DetachedBlocks { blocks, types } = detached;
        let mut block_map = HashMap::new();
        let mut new_blocks = Vec::with_capacity(blocks.len());
        let mut anchor = after;
        for old in &blocks {
            let id = self.create_block();
            if let Some(prev) = anchor {
                self.move_block_after(id, prev);
                anchor = Some(id);
            }
            block_map.insert(old.id, id);
            new_blocks.push(id);
        }

        let mut value_map: HashMap<ValueId, ValueId> = HashMap::new();
        let mut pending: HashSet<ValueId> = HashSet::new();
        for (old, &id) in blocks.iter().zip(&new_blocks) {
            for &(arg, ownership) in &old.args {
                let value = self.add_block_arg(id, types[&arg].clone(), ownership);
                value_map.insert(arg, value);
            }
            for moved in &old.insts {
                pending.extend(moved.results.iter().map(|(r, _)| *r));
            }
        }

        // Operands defined by a later instruction get their value once it exists.
        let mut forward = Vec::new();
        for (old, &id) in blocks.into_iter().zip(&new_blocks) {
            for DetachedInst { mut inst, results } in old.insts {
                let mut late = Vec::new();
                for index in 0..inst.num_operands() {
                    let value = inst.operand(index);
                    let mapped = match value_map.get(&value) {
                        Some(&mapped) => mapped,
                        None => {
                            if pending.contains(&value) {
                                late.push((index, value));
                            }
                            self.undef(types[&value].clone())
                        }
                    };
                    inst.set_operand(index, mapped);
                }
                for index in 0..inst.successors().len() {
                    let target = block_map[&inst.successors()[index].block];
                    inst.set_successor_block(index, target);
                }
                inst.set_parent(None);

                let result_types = results
                    .iter()
                    .map(|&(r, ownership)| (types[&r].clone(), ownership))
                    .collect();
                let new_id = self.insert_inst(inst, result_types, InsertPoint::End(id));
                for (&(old_result, _), &new_result) in
                    results.iter().zip(self.inst(new_id).results())
                {
                    value_map.insert(old_result, new_result);
                    pending.remove(&old_result);
                }
                forward.extend(late.into_iter().map(|(i, v)| (Operand::new(new_id, i), v)));
            }
        }
        for (op, value) in forward {
            self.set_operand(op, value_map[&value]);
        }
        new_blocks
    }

    /// Returns the arguments of a block.
    #[must_use]
    pub fn block_args(&self, block: BlockId) -> &[ValueId] {
        self.block(block).args()
    }

    /// Returns the function arguments, i.e. the entry block arguments.
    #[must_use]
    pub fn arguments(&self) -> &[ValueId] {
        self.entry_block().map_or(&[], |entry| self.block_args(entry))
    }

    /// Appends an argument to a block.
    pub fn add_block_arg(
        &mut self,
        block: BlockId,
        ty: SilType,
        ownership: OwnershipKind,
    ) -> ValueId {
        let value = ValueId::new(self.values.len());
        let index = self.block(block).args().len();
        self.values
            .push(ValueData::new(ty, ownership, ValueDef::BlockArg { block, index }));
        self.block_mut(block).push_arg(value);
        value
    }

    /// Replaces argument `index` of `block` by a fresh argument of another type.
    ///
    /// # Panics
    ///
    /// Panics if the old argument still has uses.
    pub fn replace_block_arg(
        &mut self,
        block: BlockId,
        index: usize,
        ty: SilType,
        ownership: OwnershipKind,
    ) -> ValueId {
        let old = self.block(block).args()[index];
        assert!(self.use_empty(old), "replacing block argument {old} with uses");
        self.values[old.index()].set_def(ValueDef::Erased);
        let value = ValueId::new(self.values.len());
        self.values
            .push(ValueData::new(ty, ownership, ValueDef::BlockArg { block, index }));
        self.block_mut(block).set_arg(index, value);
        value
    }

    /// Returns the instructions of a block in order.
    #[must_use]
    pub fn block_insts(&self, block: BlockId) -> &[InstId] {
        self.block(block).insts()
    }

    /// Returns the terminator of a block, if its last instruction is one.
    #[must_use]
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        self.block(block)
            .last_inst()
            .filter(|i| self.inst(*i).is_terminator())
    }

    /// Returns the successor blocks of a block in terminator order.
    #[must_use]
    pub fn successor_blocks(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block).map_or_else(Vec::new, |t| {
            self.inst(t).successors().iter().map(|e| e.block).collect()
        })
    }

    /// Returns the distinct predecessor blocks in edge order.
    #[must_use]
    pub fn predecessor_blocks(&self, block: BlockId) -> Vec<BlockId> {
        let mut preds = Vec::new();
        for edge in self.block(block).predecessor_edges() {
            if let Some(parent) = self.inst(edge.inst).parent() {
                if !preds.contains(&parent) {
                    preds.push(parent);
                }
            }
        }
        preds
    }

    /// Returns the only predecessor block, `None` if there are zero or several.
    #[must_use]
    pub fn single_predecessor_block(&self, block: BlockId) -> Option<BlockId> {
        let preds = self.predecessor_blocks(block);
        match preds.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// Collects the value each predecessor passes for a block argument.
    ///
    /// Returns `None` for function arguments and when some predecessor is not a `br` or
    /// `cond_br`, i.e. the argument is not a plain phi.
    #[must_use]
    pub fn incoming_values(&self, arg: ValueId) -> Option<Vec<ValueId>> {
        let ValueDef::BlockArg { block, index } = self.value(arg).def() else {
            return None;
        };
        if self.entry_block() == Some(block) {
            return None;
        }
        let mut incoming = Vec::new();
        for edge in self.block(block).predecessor_edges() {
            let term = self.inst(edge.inst);
            match term.kind() {
                InstKind::Branch | InstKind::CondBranch { .. } => {
                    incoming.push(*term.successor_args(edge.index).get(index)?);
                }
                _ => return None,
            }
        }
        Some(incoming)
    }

    // ---------------------------------------------------------------------------------
    // Instructions
    // ---------------------------------------------------------------------------------

    /// Returns an instruction.
    ///
    /// # Panics
    ///
    /// Panics if the instruction has been erased.
    #[must_use]
    pub fn inst(&self, id: InstId) -> &Instruction {
        self.insts[id.index()]
            .as_ref()
            .expect("instruction has been erased")
    }

    /// Returns `true` if `id` refers to a live instruction.
    #[must_use]
    pub fn contains_inst(&self, id: InstId) -> bool {
        self.insts.get(id.index()).is_some_and(Option::is_some)
    }

    fn inst_mut(&mut self, id: InstId) -> &mut Instruction {
        self.insts[id.index()]
            .as_mut()
            .expect("instruction has been erased")
    }

    /// Iterates all instructions in layout order together with their block.
    pub fn instructions(&self) -> impl Iterator<Item = (BlockId, InstId)> + '_ {
        self.layout.iter().flat_map(move |&b| {
            self.block(b).insts().iter().map(move |&i| (b, i))
        })
    }

    /// Returns the number of live instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.layout
            .iter()
            .map(|b| self.block(*b).insts().len())
            .sum()
    }

    /// Returns `true` if any result of `inst` is used.
    #[must_use]
    pub fn has_uses_of_any_result(&self, inst: InstId) -> bool {
        self.inst(inst)
            .results()
            .iter()
            .any(|r| !self.values[r.index()].use_empty())
    }

    /// Returns the instruction following `inst` in its block.
    #[must_use]
    pub fn next_inst(&self, inst: InstId) -> Option<InstId> {
        let block = self.inst(inst).parent()?;
        let insts = self.block(block).insts();
        let pos = insts.iter().position(|i| *i == inst)?;
        insts.get(pos + 1).copied()
    }

    /// Rewrites the substitutions of an apply-like instruction.
    pub fn set_substitutions(&mut self, inst: InstId, new_subs: SubstitutionMap) {
        if let InstKind::Apply { subs, .. }
        | InstKind::PartialApply { subs }
        | InstKind::TryApply { subs } = self.inst_mut(inst).kind_mut()
        {
            *subs = new_subs;
        }
    }

    /// Retargets successor `index` of terminator `inst`, keeping predecessor lists in sync.
    pub fn set_successor(&mut self, inst: InstId, index: usize, block: BlockId) {
        let old = self.inst(inst).successors()[index].block;
        let edge = PredecessorEdge { inst, index };
        self.block_mut(old).remove_pred(edge);
        self.inst_mut(inst).set_successor_block(index, block);
        self.block_mut(block).add_pred(edge);
    }

    /// Inserts a fully built instruction and creates its results.
    pub(crate) fn insert_inst(
        &mut self,
        mut inst: Instruction,
        result_types: Vec<(SilType, OwnershipKind)>,
        at: InsertPoint,
    ) -> InstId {
        let id = InstId::new(self.insts.len());
        let (block, position) = match at {
            InsertPoint::End(block) => (block, self.block(block).insts().len()),
            InsertPoint::Before(before) => {
                let block = self
                    .inst(before)
                    .parent()
                    .expect("insertion point has been erased");
                let pos = self
                    .block(block)
                    .position_of(before)
                    .expect("insertion point not in its parent block");
                (block, pos)
            }
        };

        let results: Box<[ValueId]> = result_types
            .into_iter()
            .enumerate()
            .map(|(index, (ty, ownership))| {
                let value = ValueId::new(self.values.len());
                self.values.push(ValueData::new(
                    ty,
                    ownership,
                    ValueDef::InstResult { inst: id, index },
                ));
                value
            })
            .collect();
        inst.set_results(results);
        inst.set_parent(Some(block));

        for (index, value) in inst.operands().iter().enumerate() {
            self.values[value.index()].add_use(Operand::new(id, index));
        }
        for (index, edge) in inst.successors().iter().enumerate() {
            self.block_mut(edge.block)
                .add_pred(PredecessorEdge { inst: id, index });
        }

        self.insts.push(Some(inst));
        self.block_mut(block).insert_inst(position, id);
        id
    }

    /// Unlinks and removes an instruction, returning its data.
    ///
    /// # Panics
    ///
    /// Panics if any result still has uses.
    pub(crate) fn remove_inst(&mut self, id: InstId) -> Instruction {
        assert!(
            !self.has_uses_of_any_result(id),
            "erasing {id} whose results are still used"
        );
        let inst = self.insts[id.index()]
            .take()
            .expect("instruction has already been erased");
        for (index, value) in inst.operands().iter().enumerate() {
            self.values[value.index()].remove_use(Operand::new(id, index));
        }
        for (index, edge) in inst.successors().iter().enumerate() {
            if let Some(Some(block)) = self.blocks.get_mut(edge.block.index()) {
                block.remove_pred(PredecessorEdge { inst: id, index });
            }
        }
        for result in inst.results() {
            self.values[result.index()].set_def(ValueDef::Erased);
        }
        if let Some(parent) = inst.parent() {
            self.block_mut(parent).remove_inst(id);
        }
        inst
    }

    // ---------------------------------------------------------------------------------
    // Values
    // ---------------------------------------------------------------------------------

    /// Returns a value's arena entry.
    #[must_use]
    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    /// Iterates every value in the arena, including values of erased definitions.
    pub fn values(&self) -> impl Iterator<Item = ValueId> + '_ {
        (0..self.values.len()).map(ValueId::new)
    }

    /// Returns a value's type.
    #[must_use]
    pub fn value_type(&self, id: ValueId) -> &SilType {
        self.values[id.index()].ty()
    }

    /// Returns a value's ownership kind.
    #[must_use]
    pub fn ownership(&self, id: ValueId) -> OwnershipKind {
        self.values[id.index()].ownership()
    }

    /// Returns the uses of a value in creation order.
    #[must_use]
    pub fn uses(&self, id: ValueId) -> &[Operand] {
        self.values[id.index()].uses()
    }

    /// Returns `true` if the value has no uses.
    #[must_use]
    pub fn use_empty(&self, id: ValueId) -> bool {
        self.values[id.index()].use_empty()
    }

    /// Returns the instruction defining a value, `None` for arguments and `undef`.
    #[must_use]
    pub fn defining_inst(&self, id: ValueId) -> Option<InstId> {
        match self.values[id.index()].def() {
            ValueDef::InstResult { inst, .. } => Some(inst),
            _ => None,
        }
    }

    /// Returns the kind of the instruction defining a value.
    #[must_use]
    pub fn defining_kind(&self, id: ValueId) -> Option<&InstKind> {
        self.defining_inst(id).map(|i| self.inst(i).kind())
    }

    /// Returns the value an operand refers to.
    #[must_use]
    pub fn operand_value(&self, op: Operand) -> ValueId {
        self.inst(op.inst).operand(op.index)
    }

    /// Rebinds an operand to another value, moving it between use-lists.
    pub fn set_operand(&mut self, op: Operand, value: ValueId) {
        let old = self.operand_value(op);
        if old == value {
            return;
        }
        self.values[old.index()].remove_use(op);
        self.values[value.index()].add_use(op);
        self.inst_mut(op.inst).set_operand(op.index, value);
    }

    /// Rebinds every use of `old` to `new`.
    ///
    /// Afterwards `old` has no uses and the moved uses appear at the end of `new`'s
    /// use-list in their original relative order.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        assert_ne!(old, new, "cannot replace a value with itself");
        debug_assert_eq!(
            self.value_type(old),
            self.value_type(new),
            "replacement must have the same type"
        );
        let uses = self.values[old.index()].take_uses();
        for op in uses {
            self.inst_mut(op.inst).set_operand(op.index, new);
            self.values[new.index()].add_use(op);
        }
    }

    /// Rebinds every use of `value` to the `undef` of its type.
    pub fn replace_all_uses_with_undef(&mut self, value: ValueId) {
        let ty = self.value_type(value).clone();
        let undef = self.undef(ty);
        self.replace_all_uses_with(value, undef);
    }

    /// Returns the `undef` value of a type, creating it on first request.
    pub fn undef(&mut self, ty: SilType) -> ValueId {
        if let Some(&value) = self.undefs.get(&ty) {
            return value;
        }
        let value = ValueId::new(self.values.len());
        self.values.push(ValueData::new(
            ty.clone(),
            OwnershipKind::Any,
            ValueDef::Undef,
        ));
        self.undefs.insert(ty, value);
        value
    }

    /// Drops the whole body, returning the instructions it contained.
    pub(crate) fn clear_body(&mut self) -> Vec<Instruction> {
        let removed = self.insts.drain(..).flatten().collect();
        self.values.clear();
        self.blocks.clear();
        self.layout.clear();
        self.undefs.clear();
        removed
    }

    /// Resets the function to a fresh declaration with a new signature.
    pub(crate) fn reset(&mut self, ty: FunctionType, linkage: Linkage) {
        self.clear_body();
        self.ty = ty;
        self.linkage = linkage;
        self.serialized = IsSerialized::NotSerialized;
        self.flags = FunctionFlags::empty();
        self.specialize_attrs.clear();
    }
}
