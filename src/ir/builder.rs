//! The instruction factory.
//!
//! [`Builder`] is the only way to create instructions. Each factory method computes the
//! operand array, the successor edges and the result types of one instruction kind, sizes
//! the instruction's arrays exactly once, and inserts it at the current insertion point.
//!
//! A builder borrows one function mutably together with the module's declarations and its
//! bookkeeping (function reference counts and [`IrStats`]), so `function_ref` creation and
//! instruction erasure keep the reference counts that gate function deletion accurate.
//!
//! # Examples
//!
//! ```rust,ignore
//! let mut b = module.builder(func);
//! b.position_at_end(entry);
//! let obj = b.alloc_ref(Type::nominal(leaf));
//! let m = b.class_method(obj, member, method_ty);
//! let call = b.apply(m, SubstitutionMap::new(), vec![obj], false);
//! b.return_(b.function().inst(call).results()[0]);
//! ```

use crate::ir::{
    block::BlockId,
    decl::{ConformanceRef, MethodId, TypeContext},
    function::{Function, FunctionId},
    instruction::{
        InstId, InstKind, Instruction, LoadQualifier, SourceLoc, StoreQualifier, SuccessorEdge,
    },
    module::Bookkeeping,
    subst::SubstitutionMap,
    types::{FunctionType, ResultConvention, SilType, Type},
    value::{OwnershipKind, ValueId},
};

/// Where new instructions are inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPoint {
    /// Append to the end of the block
    End(BlockId),
    /// Insert right before an existing instruction
    Before(InstId),
}

impl From<BlockId> for SuccessorEdge {
    fn from(block: BlockId) -> Self {
        SuccessorEdge::new(block)
    }
}

/// Instruction factory bound to one function.
pub struct Builder<'a> {
    func: &'a mut Function,
    types: &'a TypeContext,
    book: &'a mut Bookkeeping,
    insert: Option<InsertPoint>,
    loc: SourceLoc,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(
        func: &'a mut Function,
        types: &'a TypeContext,
        book: &'a mut Bookkeeping,
    ) -> Self {
        Self {
            func,
            types,
            book,
            insert: None,
            loc: SourceLoc::default(),
        }
    }

    /// Returns the function being built.
    #[must_use]
    pub fn function(&self) -> &Function {
        self.func
    }

    /// Returns the function being built for direct edits.
    pub fn function_mut(&mut self) -> &mut Function {
        self.func
    }

    /// Returns the module's declarations.
    #[must_use]
    pub fn types(&self) -> &TypeContext {
        self.types
    }

    /// Sets the insertion point.
    pub fn set_insertion_point(&mut self, at: InsertPoint) {
        self.insert = Some(at);
    }

    /// Inserts subsequent instructions at the end of `block`.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.insert = Some(InsertPoint::End(block));
    }

    /// Inserts subsequent instructions right before `inst`.
    pub fn position_before(&mut self, inst: InstId) {
        self.insert = Some(InsertPoint::Before(inst));
    }

    /// Returns the current insertion point.
    #[must_use]
    pub fn insertion_point(&self) -> Option<InsertPoint> {
        self.insert
    }

    /// Sets the source location attached to subsequent instructions.
    pub fn set_loc(&mut self, loc: SourceLoc) {
        self.loc = loc;
    }

    /// Returns the source location attached to new instructions.
    #[must_use]
    pub const fn loc(&self) -> SourceLoc {
        self.loc
    }

    /// Returns the single result of a SingleValue instruction.
    ///
    /// # Panics
    ///
    /// Panics if `inst` has no single result.
    #[must_use]
    pub fn result(&self, inst: InstId) -> ValueId {
        self.func
            .inst(inst)
            .result()
            .expect("instruction has no single result")
    }

    pub(crate) fn emit(
        &mut self,
        kind: InstKind,
        operands: Vec<ValueId>,
        successors: Vec<SuccessorEdge>,
        results: Vec<(SilType, OwnershipKind)>,
    ) -> InstId {
        let at = self
            .insert
            .expect("builder has no insertion point");
        if let InstKind::FunctionRef { function } = kind {
            self.book.add_ref(function);
        }
        let inst = Instruction::new(
            kind,
            operands.into_boxed_slice(),
            successors.into_boxed_slice(),
            self.loc,
        );
        self.book.stats.instructions_created += 1;
        self.func.insert_inst(inst, results, at)
    }

    fn emit_value(
        &mut self,
        kind: InstKind,
        operands: Vec<ValueId>,
        ty: SilType,
        ownership: OwnershipKind,
    ) -> ValueId {
        let inst = self.emit(kind, operands, Vec::new(), vec![(ty, ownership)]);
        self.result(inst)
    }

    fn emit_none(&mut self, kind: InstKind, operands: Vec<ValueId>) -> InstId {
        self.emit(kind, operands, Vec::new(), Vec::new())
    }

    /// Ownership of a freshly produced value: trivial for trivial types and addresses.
    fn produced(&self, ty: &SilType, kind: OwnershipKind) -> OwnershipKind {
        if ty.is_address() || self.types.is_trivial(ty.ty()) {
            OwnershipKind::Trivial
        } else {
            kind
        }
    }

    /// Ownership of a value forwarding `operand`.
    fn forwarded(&self, ty: &SilType, operand: ValueId) -> OwnershipKind {
        self.produced(ty, self.func.ownership(operand))
    }

    fn merged(&self, ty: &SilType, operands: &[ValueId]) -> OwnershipKind {
        let merged = operands
            .iter()
            .map(|v| self.func.ownership(*v))
            .filter(|k| *k != OwnershipKind::Trivial)
            .try_fold(OwnershipKind::Any, OwnershipKind::merge);
        let kind = match merged {
            Some(OwnershipKind::Any) | None => OwnershipKind::Owned,
            Some(kind) => kind,
        };
        self.produced(ty, kind)
    }

    // ---------------------------------------------------------------------------------
    // Literals and allocation
    // ---------------------------------------------------------------------------------

    /// `integer_literal`
    pub fn integer_literal(&mut self, ty: Type, value: i128) -> ValueId {
        self.emit_value(
            InstKind::IntegerLiteral { value },
            Vec::new(),
            SilType::object(ty),
            OwnershipKind::Trivial,
        )
    }

    /// `function_ref`, taking `ty` as the lowered type of `function`.
    pub fn function_ref(&mut self, function: FunctionId, ty: FunctionType) -> ValueId {
        self.emit_value(
            InstKind::FunctionRef { function },
            Vec::new(),
            SilType::object(Type::function(ty)),
            OwnershipKind::Trivial,
        )
    }

    /// `metatype` of `instance`.
    pub fn metatype(&mut self, instance: Type) -> ValueId {
        self.emit_value(
            InstKind::Metatype,
            Vec::new(),
            SilType::object(Type::metatype(instance)),
            OwnershipKind::Trivial,
        )
    }

    /// `alloc_ref` of a class type.
    pub fn alloc_ref(&mut self, class_ty: Type) -> ValueId {
        self.emit_value(
            InstKind::AllocRef,
            Vec::new(),
            SilType::object(class_ty),
            OwnershipKind::Owned,
        )
    }

    /// `alloc_stack`, returning the slot address.
    pub fn alloc_stack(&mut self, ty: Type) -> ValueId {
        self.emit_value(
            InstKind::AllocStack,
            Vec::new(),
            SilType::address(ty),
            OwnershipKind::Trivial,
        )
    }

    /// `dealloc_stack`
    pub fn dealloc_stack(&mut self, addr: ValueId) -> InstId {
        self.emit_none(InstKind::DeallocStack, vec![addr])
    }

    // ---------------------------------------------------------------------------------
    // Memory
    // ---------------------------------------------------------------------------------

    /// `load` from an address.
    pub fn load(&mut self, addr: ValueId, qualifier: LoadQualifier) -> ValueId {
        let ty = self.func.value_type(addr).object_type();
        let ownership = match qualifier {
            LoadQualifier::Trivial => OwnershipKind::Trivial,
            _ => self.produced(&ty, OwnershipKind::Owned),
        };
        self.emit_value(InstKind::Load { qualifier }, vec![addr], ty, ownership)
    }

    /// `store` a value to an address.
    pub fn store(&mut self, value: ValueId, addr: ValueId, qualifier: StoreQualifier) -> InstId {
        self.emit_none(InstKind::Store { qualifier }, vec![value, addr])
    }

    /// `copy_addr` between two addresses.
    pub fn copy_addr(
        &mut self,
        src: ValueId,
        dest: ValueId,
        take: bool,
        initialize: bool,
    ) -> InstId {
        self.emit_none(InstKind::CopyAddr { take, initialize }, vec![src, dest])
    }

    // ---------------------------------------------------------------------------------
    // Aggregates
    // ---------------------------------------------------------------------------------

    /// `struct` of type `ty` from its fields.
    pub fn struct_(&mut self, ty: Type, fields: Vec<ValueId>) -> ValueId {
        let ty = SilType::object(ty);
        let ownership = self.merged(&ty, &fields);
        self.emit_value(InstKind::Struct, fields, ty, ownership)
    }

    /// `tuple` of the given elements.
    pub fn tuple(&mut self, elements: Vec<ValueId>) -> ValueId {
        let ty = SilType::object(Type::tuple(
            elements
                .iter()
                .map(|e| self.func.value_type(*e).ty().clone())
                .collect(),
        ));
        let ownership = self.merged(&ty, &elements);
        self.emit_value(InstKind::Tuple, elements, ty, ownership)
    }

    /// `enum` case of type `ty` with an optional payload.
    pub fn enum_(&mut self, ty: Type, case: u32, payload: Option<ValueId>) -> ValueId {
        let ty = SilType::object(ty);
        let operands: Vec<ValueId> = payload.into_iter().collect();
        let ownership = self.merged(&ty, &operands);
        self.emit_value(InstKind::Enum { case }, operands, ty, ownership)
    }

    /// `struct_extract` of one stored field.
    pub fn struct_extract(&mut self, value: ValueId, field: u32) -> ValueId {
        let fields = self.types.field_types(self.func.value_type(value).ty());
        let ty = SilType::object(fields[field as usize].clone());
        let ownership = self.forwarded(&ty, value);
        self.emit_value(InstKind::StructExtract { field }, vec![value], ty, ownership)
    }

    /// `tuple_extract` of one element.
    pub fn tuple_extract(&mut self, value: ValueId, index: u32) -> ValueId {
        let ty = match self.func.value_type(value).ty() {
            Type::Tuple(elements) => SilType::object(elements[index as usize].clone()),
            other => panic!("tuple_extract from non-tuple type {other:?}"),
        };
        let ownership = self.forwarded(&ty, value);
        self.emit_value(InstKind::TupleExtract { index }, vec![value], ty, ownership)
    }

    /// `destructure_struct`, one result per stored field.
    pub fn destructure_struct(&mut self, value: ValueId) -> InstId {
        let fields = self.types.field_types(self.func.value_type(value).ty());
        let results = fields
            .into_iter()
            .map(|f| {
                let ty = SilType::object(f);
                let ownership = self.forwarded(&ty, value);
                (ty, ownership)
            })
            .collect();
        self.emit(InstKind::DestructureStruct, vec![value], Vec::new(), results)
    }

    /// `destructure_tuple`, one result per element.
    pub fn destructure_tuple(&mut self, value: ValueId) -> InstId {
        let elements = self
            .func
            .value_type(value)
            .ty()
            .tuple_elements()
            .map(<[Type]>::to_vec)
            .unwrap_or_default();
        let results = elements
            .into_iter()
            .map(|e| {
                let ty = SilType::object(e);
                let ownership = self.forwarded(&ty, value);
                (ty, ownership)
            })
            .collect();
        self.emit(InstKind::DestructureTuple, vec![value], Vec::new(), results)
    }

    // ---------------------------------------------------------------------------------
    // Conversions
    // ---------------------------------------------------------------------------------

    /// `upcast` to a superclass type.
    pub fn upcast(&mut self, value: ValueId, ty: SilType) -> ValueId {
        let ownership = self.forwarded(&ty, value);
        self.emit_value(InstKind::Upcast, vec![value], ty, ownership)
    }

    /// `unchecked_ref_cast` to another reference type.
    pub fn unchecked_ref_cast(&mut self, value: ValueId, ty: SilType) -> ValueId {
        let ownership = self.forwarded(&ty, value);
        self.emit_value(InstKind::UncheckedRefCast, vec![value], ty, ownership)
    }

    /// `unchecked_addr_cast` to another address type.
    pub fn unchecked_addr_cast(&mut self, value: ValueId, ty: SilType) -> ValueId {
        self.emit_value(
            InstKind::UncheckedAddrCast,
            vec![value],
            ty,
            OwnershipKind::Trivial,
        )
    }

    /// `unchecked_bitwise_cast`
    pub fn unchecked_bitwise_cast(&mut self, value: ValueId, ty: SilType) -> ValueId {
        let ownership = self.produced(&ty, OwnershipKind::Unowned);
        self.emit_value(InstKind::UncheckedBitwiseCast, vec![value], ty, ownership)
    }

    /// `unconditional_checked_cast`
    pub fn unconditional_checked_cast(&mut self, value: ValueId, ty: SilType) -> ValueId {
        let ownership = self.forwarded(&ty, value);
        self.emit_value(InstKind::UnconditionalCheckedCast, vec![value], ty, ownership)
    }

    /// `convert_function` to an ABI compatible function type.
    pub fn convert_function(&mut self, value: ValueId, ty: SilType) -> ValueId {
        let ownership = self.forwarded(&ty, value);
        self.emit_value(InstKind::ConvertFunction, vec![value], ty, ownership)
    }

    /// `thin_to_thick_function`
    pub fn thin_to_thick_function(&mut self, value: ValueId) -> ValueId {
        let ty = match self.func.value_type(value).ty() {
            Type::Function(f) => SilType::object(Type::function(f.thick())),
            other => panic!("thin_to_thick_function of non-function type {other:?}"),
        };
        self.emit_value(
            InstKind::ThinToThickFunction,
            vec![value],
            ty,
            OwnershipKind::Trivial,
        )
    }

    // ---------------------------------------------------------------------------------
    // Reference counting and misc
    // ---------------------------------------------------------------------------------

    /// `strong_retain`
    pub fn strong_retain(&mut self, value: ValueId) -> InstId {
        self.emit_none(InstKind::StrongRetain, vec![value])
    }

    /// `strong_release`
    pub fn strong_release(&mut self, value: ValueId) -> InstId {
        self.emit_none(InstKind::StrongRelease, vec![value])
    }

    /// `cond_fail`
    pub fn cond_fail(&mut self, condition: ValueId) -> InstId {
        self.emit_none(InstKind::CondFail, vec![condition])
    }

    /// `builtin` call returning `ty`.
    pub fn builtin(&mut self, name: &str, ty: SilType, args: Vec<ValueId>) -> ValueId {
        let ownership = self.produced(&ty, OwnershipKind::Owned);
        self.emit_value(
            InstKind::Builtin { name: name.into() },
            args,
            ty,
            ownership,
        )
    }

    // ---------------------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------------------

    /// `class_method` lookup of `member` on `instance`, producing a method of type `ty`.
    pub fn class_method(&mut self, instance: ValueId, member: MethodId, ty: FunctionType) -> ValueId {
        self.emit_value(
            InstKind::ClassMethod { member },
            vec![instance],
            SilType::object(Type::function(ty)),
            OwnershipKind::Trivial,
        )
    }

    /// `super_method` lookup of `member` in the superclass of `instance`'s class.
    pub fn super_method(&mut self, instance: ValueId, member: MethodId, ty: FunctionType) -> ValueId {
        self.emit_value(
            InstKind::SuperMethod { member },
            vec![instance],
            SilType::object(Type::function(ty)),
            OwnershipKind::Trivial,
        )
    }

    /// `witness_method` lookup of requirement `member` for `lookup_type`.
    pub fn witness_method(
        &mut self,
        lookup_type: Type,
        conformance: ConformanceRef,
        member: MethodId,
        ty: FunctionType,
    ) -> ValueId {
        self.emit_value(
            InstKind::WitnessMethod {
                lookup_type,
                conformance,
                member,
            },
            Vec::new(),
            SilType::object(Type::function(ty)),
            OwnershipKind::Trivial,
        )
    }

    // ---------------------------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------------------------

    fn callee_type(&self, callee: ValueId) -> FunctionType {
        self.func
            .value_type(callee)
            .ty()
            .as_function()
            .cloned()
            .expect("callee must have function type")
    }

    fn call_result(&self, subst: &FunctionType) -> (SilType, OwnershipKind) {
        let ty = subst.result_type();
        let mut direct = subst.direct_results();
        let kind = match (direct.next(), direct.next()) {
            (Some(r), None) if r.convention == ResultConvention::Unowned => OwnershipKind::Unowned,
            _ => OwnershipKind::Owned,
        };
        let ownership = self.produced(&ty, kind);
        (ty, ownership)
    }

    /// `apply` of `callee` to `args`, which include indirect result addresses first.
    pub fn apply(
        &mut self,
        callee: ValueId,
        subs: SubstitutionMap,
        args: Vec<ValueId>,
        nonthrowing: bool,
    ) -> InstId {
        let subst = self.callee_type(callee).substituted(&subs);
        let result = self.call_result(&subst);
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend(args);
        self.emit(
            InstKind::Apply { subs, nonthrowing },
            operands,
            Vec::new(),
            vec![result],
        )
    }

    /// `partial_apply` binding the trailing parameters of `callee` to `args`.
    pub fn partial_apply(
        &mut self,
        callee: ValueId,
        subs: SubstitutionMap,
        args: Vec<ValueId>,
    ) -> ValueId {
        let mut subst = self.callee_type(callee).substituted(&subs);
        let keep = subst.params.len().saturating_sub(args.len());
        subst.params.truncate(keep);
        subst.generic_sig = None;
        let ty = SilType::object(Type::function(subst.thick()));
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend(args);
        self.emit_value(
            InstKind::PartialApply { subs },
            operands,
            ty,
            OwnershipKind::Owned,
        )
    }

    // ---------------------------------------------------------------------------------
    // Terminators
    // ---------------------------------------------------------------------------------

    /// `return`
    pub fn return_(&mut self, value: ValueId) -> InstId {
        self.emit_none(InstKind::Return, vec![value])
    }

    /// `throw`
    pub fn throw(&mut self, error: ValueId) -> InstId {
        self.emit_none(InstKind::Throw, vec![error])
    }

    /// `unwind`
    pub fn unwind(&mut self) -> InstId {
        self.emit_none(InstKind::Unwind, Vec::new())
    }

    /// `unreachable`
    pub fn unreachable(&mut self) -> InstId {
        self.emit_none(InstKind::Unreachable, Vec::new())
    }

    /// `br` to `dest` passing `args`.
    pub fn branch(&mut self, dest: impl Into<SuccessorEdge>, args: Vec<ValueId>) -> InstId {
        self.emit(InstKind::Branch, args, vec![dest.into()], Vec::new())
    }

    /// `cond_br` on `condition`.
    pub fn cond_branch(
        &mut self,
        condition: ValueId,
        on_true: impl Into<SuccessorEdge>,
        true_args: Vec<ValueId>,
        on_false: impl Into<SuccessorEdge>,
        false_args: Vec<ValueId>,
    ) -> InstId {
        #[allow(clippy::cast_possible_truncation)]
        let true_count = true_args.len() as u32;
        let mut operands = Vec::with_capacity(1 + true_args.len() + false_args.len());
        operands.push(condition);
        operands.extend(true_args);
        operands.extend(false_args);
        self.emit(
            InstKind::CondBranch {
                true_args: true_count,
            },
            operands,
            vec![on_true.into(), on_false.into()],
            Vec::new(),
        )
    }

    /// `try_apply` of a throwing callee.
    ///
    /// The normal successor receives the direct result and the error successor the error
    /// value as block arguments; the caller adds those arguments.
    pub fn try_apply(
        &mut self,
        callee: ValueId,
        subs: SubstitutionMap,
        args: Vec<ValueId>,
        normal: impl Into<SuccessorEdge>,
        error: impl Into<SuccessorEdge>,
    ) -> InstId {
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend(args);
        self.emit(
            InstKind::TryApply { subs },
            operands,
            vec![normal.into(), error.into()],
            Vec::new(),
        )
    }

    /// `switch_enum` on the case of `value`.
    pub fn switch_enum(
        &mut self,
        value: ValueId,
        cases: Vec<(u32, SuccessorEdge)>,
        default: Option<SuccessorEdge>,
    ) -> InstId {
        let has_default = default.is_some();
        let (labels, mut edges): (Vec<u32>, Vec<SuccessorEdge>) = cases.into_iter().unzip();
        edges.extend(default);
        self.emit(
            InstKind::SwitchEnum {
                cases: labels.into_boxed_slice(),
                has_default,
            },
            vec![value],
            edges,
            Vec::new(),
        )
    }

    /// `switch_value` on an integer.
    pub fn switch_value(
        &mut self,
        value: ValueId,
        cases: Vec<(i128, SuccessorEdge)>,
        default: Option<SuccessorEdge>,
    ) -> InstId {
        let has_default = default.is_some();
        let (labels, mut edges): (Vec<i128>, Vec<SuccessorEdge>) = cases.into_iter().unzip();
        edges.extend(default);
        self.emit(
            InstKind::SwitchValue {
                cases: labels.into_boxed_slice(),
                has_default,
            },
            vec![value],
            edges,
            Vec::new(),
        )
    }

    /// `checked_cast_br` of `value` to `target`.
    pub fn checked_cast_branch(
        &mut self,
        exact: bool,
        value: ValueId,
        target: SilType,
        success: impl Into<SuccessorEdge>,
        failure: impl Into<SuccessorEdge>,
    ) -> InstId {
        self.emit(
            InstKind::CheckedCastBranch { exact, target },
            vec![value],
            vec![success.into(), failure.into()],
            Vec::new(),
        )
    }

    // ---------------------------------------------------------------------------------
    // Erasure
    // ---------------------------------------------------------------------------------

    /// Removes an instruction from its block and the function.
    ///
    /// # Panics
    ///
    /// Panics if any of its results is still used.
    pub fn erase(&mut self, inst: InstId) {
        let removed = self.func.remove_inst(inst);
        if let InstKind::FunctionRef { function } = removed.kind() {
            self.book.release_ref(*function);
        }
        self.book.stats.instructions_erased += 1;
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ir::{Opcode, OwnershipKind, SilType, Type},
        test::fixtures::simple_module,
    };

    #[test]
    fn test_results_match_shape() {
        let (mut module, f) = simple_module();
        let entry = module.function(f).entry_block().unwrap();
        let mut b = module.builder(f);
        b.position_at_end(entry);
        let one = b.integer_literal(Type::int(64), 1);
        let two = b.integer_literal(Type::int(64), 2);
        let pair = b.tuple(vec![one, two]);
        let split = b.destructure_tuple(pair);
        let slot = b.alloc_stack(Type::int(64));
        let store = b.store(one, slot, crate::ir::StoreQualifier::Trivial);
        b.dealloc_stack(slot);
        let ret = b.return_(pair);

        let func = module.function(f);
        assert_eq!(func.inst(split).results().len(), 2);
        assert_eq!(func.inst(store).results().len(), 0);
        assert_eq!(func.inst(ret).results().len(), 0);
        assert_eq!(func.defining_kind(pair).map(|k| k.opcode()), Some(Opcode::Tuple));
        assert_eq!(func.ownership(pair), OwnershipKind::Trivial);
        assert_eq!(func.value_type(slot), &SilType::address(Type::int(64)));
        assert_eq!(func.uses(one).len(), 2);
    }

    #[test]
    fn test_function_ref_counts() {
        let (mut module, f) = simple_module();
        let callee = module
            .create_function(
                "callee",
                crate::ir::FunctionType::thin(vec![], vec![]),
                crate::ir::Linkage::Private,
            )
            .unwrap();
        let callee_ty = module.function(callee).lowered_type().clone();
        let entry = module.function(f).entry_block().unwrap();
        let r = {
            let mut b = module.builder(f);
            b.position_at_end(entry);
            b.function_ref(callee, callee_ty)
        };
        assert_eq!(module.ref_count(callee), 1);
        let inst = module.function(f).defining_inst(r).unwrap();
        module.builder(f).erase(inst);
        assert_eq!(module.ref_count(callee), 0);
        assert_eq!(module.stats().instructions_erased, 1);
    }

    #[test]
    #[should_panic(expected = "still used")]
    fn test_erase_with_uses_panics() {
        let (mut module, f) = simple_module();
        let entry = module.function(f).entry_block().unwrap();
        let mut b = module.builder(f);
        b.position_at_end(entry);
        let one = b.integer_literal(Type::int(64), 1);
        b.tuple(vec![one]);
        let lit = b.function().defining_inst(one).unwrap();
        b.erase(lit);
    }
}
