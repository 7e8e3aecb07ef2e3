//! Instruction and body cloning with value, block and type remapping.
//!
//! Cloning works in two steps. First the source is captured into a snapshot
//! ([`InstSnapshot`], [`BodySnapshot`]) holding owned copies of the instruction payloads,
//! operand lists and result types. Then the snapshot is replayed through a [`Builder`],
//! rewriting every operand, successor and embedded type through a [`Remapper`].
//!
//! Capturing first keeps the source borrowed only while the snapshot is taken, so the same
//! machinery clones within one function and between two functions of the same module.
//!
//! # Forward references
//!
//! Block layout does not have to follow dominance order, so an operand may refer to a value
//! whose definition has not been cloned yet. Such operands are bound to `undef`
//! temporarily and patched once the whole body has been cloned.

use std::collections::HashMap;

use crate::ir::{
    block::BlockId,
    builder::Builder,
    decl::{ConformanceRef, TypeContext},
    function::Function,
    instruction::{InstId, InstKind, SourceLoc, SuccessorEdge},
    subst::SubstitutionMap,
    types::SilType,
    value::{Operand, OwnershipKind, ValueId},
};

/// Maps source values and blocks to their clones and applies a substitution to types.
#[derive(Debug, Clone, Default)]
pub struct Remapper {
    values: HashMap<ValueId, ValueId>,
    blocks: HashMap<BlockId, BlockId>,
    subs: SubstitutionMap,
}

impl Remapper {
    /// Creates a remapper substituting types with `subs`.
    #[must_use]
    pub fn new(subs: SubstitutionMap) -> Self {
        Self {
            subs,
            ..Self::default()
        }
    }

    /// Returns the type substitution.
    #[must_use]
    pub const fn substitutions(&self) -> &SubstitutionMap {
        &self.subs
    }

    /// Records that `from` is replaced by `to`.
    pub fn map_value(&mut self, from: ValueId, to: ValueId) {
        self.values.insert(from, to);
    }

    /// Records that `from` is replaced by `to`.
    pub fn map_block(&mut self, from: BlockId, to: BlockId) {
        self.blocks.insert(from, to);
    }

    /// Returns the clone of a value, if it has been mapped.
    #[must_use]
    pub fn lookup_value(&self, value: ValueId) -> Option<ValueId> {
        self.values.get(&value).copied()
    }

    /// Returns the clone of a value, or the value itself if it is not mapped.
    #[must_use]
    pub fn value(&self, value: ValueId) -> ValueId {
        self.lookup_value(value).unwrap_or(value)
    }

    /// Returns the clone of a block, or the block itself if it is not mapped.
    #[must_use]
    pub fn block(&self, block: BlockId) -> BlockId {
        self.blocks.get(&block).copied().unwrap_or(block)
    }

    /// Substitutes a value type.
    #[must_use]
    pub fn sil_type(&self, ty: &SilType) -> SilType {
        ty.subst(&self.subs)
    }

    /// Substitutes the types embedded in an instruction payload.
    ///
    /// Substitution maps of calls are composed with the remapper's map. Abstract
    /// conformances of `witness_method` become concrete when the lookup type does.
    #[must_use]
    pub fn kind(&self, kind: &InstKind, types: &TypeContext) -> InstKind {
        if self.subs.is_empty() {
            return kind.clone();
        }
        match kind {
            InstKind::Apply { subs, nonthrowing } => InstKind::Apply {
                subs: self.subs.subst_map(subs),
                nonthrowing: *nonthrowing,
            },
            InstKind::PartialApply { subs } => InstKind::PartialApply {
                subs: self.subs.subst_map(subs),
            },
            InstKind::TryApply { subs } => InstKind::TryApply {
                subs: self.subs.subst_map(subs),
            },
            InstKind::WitnessMethod {
                lookup_type,
                conformance,
                member,
            } => {
                let lookup_type = self.subs.subst_type(lookup_type);
                let conformance = match conformance {
                    ConformanceRef::Abstract(protocol) => types
                        .lookup_conformance(&lookup_type, *protocol)
                        .unwrap_or_else(|| conformance.clone()),
                    ConformanceRef::Specialized { root, subs } => ConformanceRef::Specialized {
                        root: *root,
                        subs: self.subs.subst_map(subs),
                    },
                    ConformanceRef::Concrete(_) => conformance.clone(),
                };
                InstKind::WitnessMethod {
                    lookup_type,
                    conformance,
                    member: *member,
                }
            }
            InstKind::CheckedCastBranch { exact, target } => InstKind::CheckedCastBranch {
                exact: *exact,
                target: self.sil_type(target),
            },
            other => other.clone(),
        }
    }
}

/// Owned copy of one instruction.
#[derive(Debug, Clone)]
pub struct InstSnapshot {
    /// Source instruction
    pub id: InstId,
    /// Payload
    pub kind: InstKind,
    /// Source operands
    pub operands: Vec<ValueId>,
    /// Types of the source operands
    pub operand_types: Vec<SilType>,
    /// Source successor edges
    pub successors: Vec<SuccessorEdge>,
    /// Source results with their types and ownership
    pub results: Vec<(ValueId, SilType, OwnershipKind)>,
    /// Source location
    pub loc: SourceLoc,
}

impl InstSnapshot {
    /// Captures `inst` of `func`.
    #[must_use]
    pub fn capture(func: &Function, inst: InstId) -> Self {
        let data = func.inst(inst);
        Self {
            id: inst,
            kind: data.kind().clone(),
            operands: data.operands().to_vec(),
            operand_types: data
                .operands()
                .iter()
                .map(|v| func.value_type(*v).clone())
                .collect(),
            successors: data.successors().to_vec(),
            results: data
                .results()
                .iter()
                .map(|r| (*r, func.value_type(*r).clone(), func.ownership(*r)))
                .collect(),
            loc: data.loc(),
        }
    }
}

/// Owned copy of one block.
#[derive(Debug, Clone)]
pub struct BlockSnapshot {
    /// Source block
    pub id: BlockId,
    /// Source arguments with their types and ownership
    pub args: Vec<(ValueId, SilType, OwnershipKind)>,
    /// Instructions in order
    pub insts: Vec<InstSnapshot>,
}

/// Owned copy of a function body in layout order.
#[derive(Debug, Clone, Default)]
pub struct BodySnapshot {
    /// Blocks in layout order, entry first
    pub blocks: Vec<BlockSnapshot>,
}

impl BodySnapshot {
    /// Captures the whole body of `func`.
    #[must_use]
    pub fn capture(func: &Function) -> Self {
        let blocks = func
            .blocks()
            .map(|block| BlockSnapshot {
                id: block,
                args: func
                    .block_args(block)
                    .iter()
                    .map(|a| (*a, func.value_type(*a).clone(), func.ownership(*a)))
                    .collect(),
                insts: func
                    .block_insts(block)
                    .iter()
                    .map(|i| InstSnapshot::capture(func, *i))
                    .collect(),
            })
            .collect();
        Self { blocks }
    }

    /// Returns the entry block snapshot.
    #[must_use]
    pub fn entry(&self) -> Option<&BlockSnapshot> {
        self.blocks.first()
    }
}

impl Builder<'_> {
    fn cloned_ownership(&self, ty: &SilType, ownership: OwnershipKind) -> OwnershipKind {
        if ty.is_address() || self.types().is_trivial(ty.ty()) {
            OwnershipKind::Trivial
        } else if ownership == OwnershipKind::Trivial {
            OwnershipKind::Owned
        } else {
            ownership
        }
    }

    fn emit_remapped(
        &mut self,
        snapshot: &InstSnapshot,
        operands: Vec<ValueId>,
        remap: &mut Remapper,
    ) -> InstId {
        let kind = remap.kind(&snapshot.kind, self.types());
        let successors = snapshot
            .successors
            .iter()
            .map(|e| SuccessorEdge {
                block: remap.block(e.block),
                count: e.count,
            })
            .collect();
        let results = snapshot
            .results
            .iter()
            .map(|(_, ty, ownership)| {
                let ty = remap.sil_type(ty);
                let ownership = self.cloned_ownership(&ty, *ownership);
                (ty, ownership)
            })
            .collect();
        let prev = self.loc();
        self.set_loc(snapshot.loc);
        let inst = self.emit(kind, operands, successors, results);
        self.set_loc(prev);
        let new_results = self.function().inst(inst).results().to_vec();
        for ((old, _, _), new) in snapshot.results.iter().zip(new_results) {
            remap.map_value(*old, new);
        }
        inst
    }

    /// Emits a remapped copy of a captured instruction at the insertion point.
    ///
    /// Results of the copy are recorded in `remap`. Operands without a mapping are kept as
    /// they are, which is what cloning within one function needs.
    pub fn emit_snapshot(&mut self, snapshot: &InstSnapshot, remap: &mut Remapper) -> InstId {
        let operands = snapshot.operands.iter().map(|v| remap.value(*v)).collect();
        self.emit_remapped(snapshot, operands, remap)
    }

    /// Clones an instruction of the builder's own function at the insertion point.
    ///
    /// Operands are rebound through `remap`, falling back to the original values.
    pub fn clone_instruction(&mut self, inst: InstId, remap: &mut Remapper) -> InstId {
        let snapshot = InstSnapshot::capture(self.function(), inst);
        self.emit_snapshot(&snapshot, remap)
    }

    /// Clones a captured body into the builder's function.
    ///
    /// The source entry block is mapped to `entry`, whose arguments the caller has already
    /// mapped. Every other block gets a fresh block with remapped arguments, appended in
    /// source layout order. Operands whose source value has no clone yet are bound to
    /// `undef` and patched after all instructions exist; source `undef`s stay `undef`.
    ///
    /// # Returns
    ///
    /// The new blocks in source layout order, `entry` first.
    pub fn clone_body(
        &mut self,
        body: &BodySnapshot,
        entry: BlockId,
        remap: &mut Remapper,
    ) -> Vec<BlockId> {
        let mut new_blocks = Vec::with_capacity(body.blocks.len());
        for (i, block) in body.blocks.iter().enumerate() {
            let new = if i == 0 {
                entry
            } else {
                let new = self.function_mut().create_block();
                for (arg, ty, ownership) in &block.args {
                    let ty = remap.sil_type(ty);
                    let ownership = self.cloned_ownership(&ty, *ownership);
                    let value = self.function_mut().add_block_arg(new, ty, ownership);
                    remap.map_value(*arg, value);
                }
                new
            };
            remap.map_block(block.id, new);
            new_blocks.push(new);
        }

        let mut fixups: Vec<(Operand, ValueId)> = Vec::new();
        for (block, new) in body.blocks.iter().zip(&new_blocks) {
            self.position_at_end(*new);
            for inst in &block.insts {
                let mut pending = Vec::new();
                let operands = inst
                    .operands
                    .iter()
                    .zip(&inst.operand_types)
                    .enumerate()
                    .map(|(index, (value, ty))| {
                        remap.lookup_value(*value).unwrap_or_else(|| {
                            pending.push((index, *value));
                            let ty = remap.sil_type(ty);
                            self.function_mut().undef(ty)
                        })
                    })
                    .collect();
                let id = self.emit_remapped(inst, operands, remap);
                fixups.extend(
                    pending
                        .into_iter()
                        .map(|(index, value)| (Operand::new(id, index), value)),
                );
            }
        }

        for (op, source) in fixups {
            if let Some(value) = remap.lookup_value(source) {
                self.function_mut().set_operand(op, value);
            }
        }
        new_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{FunctionType, Linkage, Opcode, StoreQualifier, Type},
        test::fixtures::simple_module,
    };

    #[test]
    fn test_clone_instruction_within_function() {
        let (mut module, f) = simple_module();
        let entry = module.function(f).entry_block().unwrap();
        let mut b = module.builder(f);
        b.position_at_end(entry);
        let one = b.integer_literal(Type::int(64), 1);
        let two = b.integer_literal(Type::int(64), 2);
        let pair = b.tuple(vec![one, one]);
        let tuple_inst = b.function().defining_inst(pair).unwrap();

        let mut remap = Remapper::default();
        remap.map_value(one, two);
        let copy = b.clone_instruction(tuple_inst, &mut remap);
        let func = b.function();
        assert_eq!(func.inst(copy).operands(), &[two, two]);
        assert_eq!(func.inst(copy).opcode(), Opcode::Tuple);
        assert_eq!(remap.value(pair), func.inst(copy).results()[0]);
        assert_eq!(func.uses(two).len(), 2);
    }

    #[test]
    fn test_clone_body_patches_forward_references() {
        let (mut module, f) = simple_module();
        let entry = module.function(f).entry_block().unwrap();
        // Layout: entry, late, early. `early` defines a value `late` uses.
        let late = module.function_mut(f).create_block();
        let early = module.function_mut(f).create_block();
        {
            let mut b = module.builder(f);
            b.position_at_end(entry);
            b.branch(early, vec![]);
            b.position_at_end(early);
            let v = b.integer_literal(Type::int(64), 7);
            b.branch(late, vec![]);
            b.position_at_end(late);
            let slot = b.alloc_stack(Type::int(64));
            b.store(v, slot, StoreQualifier::Trivial);
            b.dealloc_stack(slot);
            let unit = b.tuple(vec![]);
            b.return_(unit);
        }
        let body = BodySnapshot::capture(module.function(f));

        let g = module
            .create_function("g", FunctionType::thin(vec![], vec![]), Linkage::Private)
            .unwrap();
        let g_entry = module.create_entry_block(g);
        let mut remap = Remapper::default();
        let blocks = module.builder(g).clone_body(&body, g_entry, &mut remap);

        let func = module.function(g);
        assert_eq!(blocks.len(), 3);
        assert_eq!(func.block_count(), 3);
        let store = func
            .instructions()
            .map(|(_, i)| i)
            .find(|i| func.inst(*i).opcode() == Opcode::Store)
            .unwrap();
        let stored = func.inst(store).operand(0);
        assert_eq!(
            func.defining_kind(stored),
            Some(&InstKind::IntegerLiteral { value: 7 })
        );
        crate::ir::verify_function(&module, g).unwrap();
    }
}
