//! Devirtualization integration tests.
//!
//! A small class hierarchy and a protocol conformance are built through the public API and
//! the rewrites are checked at the level of the resulting direct calls.

use silcore::{
    analysis::ClassHierarchyAnalysis,
    config::{ModuleOptions, OptimizerConfig},
    ir::{
        apply_sites, verify_function, ApplyKind, ApplySite, BlockId, ConformanceRef, DeclId,
        Function, FunctionId, FunctionType, GenericParamKey, GenericSignature, InsertPoint,
        InstId, Linkage, MethodDecl, MethodId, Module, NominalDecl, Opcode, OwnershipKind,
        ParamConvention, ParamInfo, Representation, ResultConvention, ResultInfo, SilType,
        StoreQualifier, SubstitutionMap, Type, TypeContext, VTable, ValueId, WitnessTable,
    },
    opt::{can_devirtualize, try_devirtualize, DispatchKind, EventKind, PassPipeline},
    Result,
};

/// `(self) -> Int64` as a class method of `self_ty`.
fn method_type(self_ty: Type) -> FunctionType {
    FunctionType::new(
        vec![ParamInfo::new(self_ty, ParamConvention::DirectGuaranteed)],
        vec![ResultInfo::new(Type::int(64), ResultConvention::Owned)],
        Representation::Method,
    )
}

fn define_constant(module: &mut Module, f: FunctionId, value: i128) {
    let entry = module.create_entry_block(f);
    let mut b = module.builder_at(f, InsertPoint::End(entry));
    let lit = b.integer_literal(Type::int(64), value);
    b.return_(lit);
}

/// `class Shape { func area() }`, `final class Square: Shape` overriding it and
/// `class Circle: Shape` inheriting it.
struct Shapes {
    module: Module,
    shape: DeclId,
    square: DeclId,
    circle: DeclId,
    area: MethodId,
    shape_area: FunctionId,
    square_area: FunctionId,
}

impl Shapes {
    fn new() -> Result<Self> {
        let mut types = TypeContext::new();
        let shape = types.add_decl(NominalDecl::class("Shape"));
        let square = types
            .add_decl(NominalDecl::class("Square").with_superclass(Type::nominal(shape)).final_());
        let circle =
            types.add_decl(NominalDecl::class("Circle").with_superclass(Type::nominal(shape)));
        let area = types.add_method(MethodDecl::new("area", shape));
        let square_override = types.add_method(MethodDecl::new("area", square).overriding(area));

        let mut module = Module::new("shapes", types, ModuleOptions::default());
        let shape_area = module.create_function(
            "Shape.area",
            method_type(Type::nominal(shape)),
            Linkage::Hidden,
        )?;
        let square_area = module.create_function(
            "Square.area",
            method_type(Type::nominal(square)),
            Linkage::Hidden,
        )?;
        define_constant(&mut module, shape_area, 0);
        define_constant(&mut module, square_area, 4);
        module.add_vtable(VTable::new(shape).with_entry(area, shape_area))?;
        module.add_vtable(VTable::new(square).with_entry(square_override, square_area))?;
        module.add_vtable(VTable::new(circle).with_entry(area, shape_area))?;

        Ok(Self {
            module,
            shape,
            square,
            circle,
            area,
            shape_area,
            square_area,
        })
    }

    /// `name() -> Int64` calling `area` on a new instance of `class` seen as a `Shape`.
    fn caller(&mut self, name: &str, class: DeclId) -> Result<(FunctionId, InstId)> {
        let f = self.module.create_function(
            name,
            FunctionType::thin(vec![], vec![Type::int(64)]),
            Linkage::Public,
        )?;
        let entry = self.module.create_entry_block(f);
        let shape_ty = Type::nominal(self.shape);
        let mut b = self.module.builder_at(f, InsertPoint::End(entry));
        let obj = b.alloc_ref(Type::nominal(class));
        let receiver = b.upcast(obj, SilType::object(shape_ty.clone()));
        let method = b.class_method(receiver, self.area, method_type(shape_ty));
        let call = b.apply(method, SubstitutionMap::new(), vec![receiver], false);
        let result = b.result(call);
        b.return_(result);
        Ok((f, call))
    }
}

fn direct_callee(module: &Module, caller: FunctionId) -> Option<FunctionId> {
    let func = module.function(caller);
    apply_sites(func).first()?.referenced_function(func)
}

#[test]
fn test_class_method_on_allocated_receiver() -> Result<()> {
    let mut shapes = Shapes::new()?;
    let (f, call) = shapes.caller("square_area", shapes.square)?;
    let cha = ClassHierarchyAnalysis::new(&shapes.module);
    let site = ApplySite::new(shapes.module.function(f), call).expect("apply site");

    assert_eq!(
        can_devirtualize(&shapes.module, f, site, Some(&cha)),
        Some(shapes.square_area)
    );
    let done = try_devirtualize(&mut shapes.module, f, site, Some(&cha)).expect("devirtualized");
    assert_eq!(done.kind, DispatchKind::ClassMethod);
    assert_eq!(done.target, shapes.square_area);
    assert!(done.removed >= 2);

    let func = shapes.module.function(f);
    assert!(!func.contains_inst(call));
    assert!(!func
        .instructions()
        .any(|(_, i)| func.inst(i).opcode() == Opcode::ClassMethod));
    assert_eq!(direct_callee(&shapes.module, f), Some(shapes.square_area));
    verify_function(&shapes.module, f)?;
    Ok(())
}

#[test]
fn test_inherited_implementation() -> Result<()> {
    let mut shapes = Shapes::new()?;
    let (f, _) = shapes.caller("circle_area", shapes.circle)?;
    let report = PassPipeline::with_defaults(OptimizerConfig::default()).run(&mut shapes.module)?;

    assert!(report.converged);
    assert_eq!(report.events.count_kind(EventKind::ClassMethodDevirtualized), 1);
    // Circle's vtable inherits the Shape implementation.
    assert_eq!(direct_callee(&shapes.module, f), Some(shapes.shape_area));
    verify_function(&shapes.module, f)?;
    Ok(())
}

#[test]
fn test_disabled_class_devirtualization() -> Result<()> {
    let mut shapes = Shapes::new()?;
    let (f, _) = shapes.caller("square_area", shapes.square)?;
    let config = OptimizerConfig {
        enable_class_devirtualization: false,
        ..OptimizerConfig::default()
    };
    let report = PassPipeline::with_defaults(config).run(&mut shapes.module)?;
    assert!(!report.changed());
    assert_eq!(direct_callee(&shapes.module, f), None);
    Ok(())
}

#[test]
fn test_witness_method_with_concrete_conformance() -> Result<()> {
    let mut types = TypeContext::new();
    let protocol = types.add_decl(NominalDecl::protocol("Describable"));
    let point = types.add_decl(NominalDecl::structure("Point").trivial());
    let describe = types.add_method(MethodDecl::new("describe", protocol));
    let conformance = types.add_conformance(point, protocol);
    let witness_repr = Representation::WitnessMethod {
        protocol,
        class_witness: None,
        default_witness: false,
    };

    let mut module = Module::new("protocols", types, ModuleOptions::default());
    let witness = module.create_function(
        "Point.describe",
        FunctionType::new(
            vec![ParamInfo::new(
                Type::nominal(point),
                ParamConvention::IndirectInGuaranteed,
            )],
            vec![ResultInfo::new(Type::int(64), ResultConvention::Owned)],
            witness_repr,
        ),
        Linkage::Private,
    )?;
    define_constant(&mut module, witness, 3);
    module.add_witness_table(WitnessTable::new(conformance).with_entry(describe, witness))?;

    let point_ty = Type::nominal(point);
    let requirement_ty = FunctionType::new(
        vec![ParamInfo::new(
            Type::param(0, 0),
            ParamConvention::IndirectInGuaranteed,
        )],
        vec![ResultInfo::new(Type::int(64), ResultConvention::Owned)],
        witness_repr,
    )
    .with_generic_sig(GenericSignature::with_depths(&[1]));
    let caller = module.create_function(
        "show",
        FunctionType::thin(vec![point_ty.clone()], vec![Type::int(64)]),
        Linkage::Public,
    )?;
    let entry = module.create_entry_block(caller);
    let arg = module.function(caller).arguments()[0];
    let mut b = module.builder_at(caller, InsertPoint::End(entry));
    let slot = b.alloc_stack(point_ty.clone());
    b.store(arg, slot, StoreQualifier::Trivial);
    let method = b.witness_method(
        point_ty.clone(),
        ConformanceRef::Concrete(conformance),
        describe,
        requirement_ty,
    );
    let subs = SubstitutionMap::from_pairs([(GenericParamKey::new(0, 0), point_ty)]);
    let call = b.apply(method, subs, vec![slot], false);
    let result = b.result(call);
    b.dealloc_stack(slot);
    b.return_(result);

    let site = ApplySite::new(module.function(caller), call).expect("apply site");
    assert_eq!(can_devirtualize(&module, caller, site, None), Some(witness));
    let done = try_devirtualize(&mut module, caller, site, None).expect("devirtualized");
    assert_eq!(done.kind, DispatchKind::WitnessMethod);
    assert_eq!(direct_callee(&module, caller), Some(witness));
    verify_function(&module, caller)?;
    Ok(())
}

#[test]
fn test_witness_method_of_generic_conformer() -> Result<()> {
    // struct Wrapper<T>: Describable, called through Wrapper<Int64>.
    let mut types = TypeContext::new();
    let protocol = types.add_decl(NominalDecl::protocol("Describable"));
    let wrapper = types.add_decl(NominalDecl::structure("Wrapper").with_generic_params(1));
    let describe = types.add_method(MethodDecl::new("describe", protocol));
    let root = types.add_conformance(wrapper, protocol);
    let wrapper_int = Type::bound(wrapper, vec![Type::int(64)]);
    let conformance = types
        .lookup_conformance(&wrapper_int, protocol)
        .expect("Wrapper<Int64> conforms");
    assert!(matches!(conformance, ConformanceRef::Specialized { .. }));
    let witness_repr = Representation::WitnessMethod {
        protocol,
        class_witness: None,
        default_witness: false,
    };

    let mut module = Module::new("generic_protocols", types, ModuleOptions::default());
    let witness = module.create_function(
        "Wrapper.describe",
        FunctionType::new(
            vec![ParamInfo::new(
                Type::bound(wrapper, vec![Type::param(0, 0)]),
                ParamConvention::IndirectInGuaranteed,
            )],
            vec![ResultInfo::new(Type::int(64), ResultConvention::Owned)],
            witness_repr,
        )
        .with_generic_sig(GenericSignature::with_depths(&[1])),
        Linkage::Private,
    )?;
    define_constant(&mut module, witness, 8);
    module.add_witness_table(WitnessTable::new(root).with_entry(describe, witness))?;

    let requirement_ty = FunctionType::new(
        vec![ParamInfo::new(
            Type::param(0, 0),
            ParamConvention::IndirectInGuaranteed,
        )],
        vec![ResultInfo::new(Type::int(64), ResultConvention::Owned)],
        witness_repr,
    )
    .with_generic_sig(GenericSignature::with_depths(&[1]));
    let caller = module.create_function(
        "show_wrapped",
        FunctionType::thin(vec![wrapper_int.clone()], vec![Type::int(64)]),
        Linkage::Public,
    )?;
    let entry = module.create_entry_block(caller);
    let arg = module.function(caller).arguments()[0];
    let mut b = module.builder_at(caller, InsertPoint::End(entry));
    let slot = b.alloc_stack(wrapper_int.clone());
    b.store(arg, slot, StoreQualifier::Trivial);
    let method = b.witness_method(wrapper_int.clone(), conformance, describe, requirement_ty);
    let subs = SubstitutionMap::from_pairs([(GenericParamKey::new(0, 0), wrapper_int)]);
    let call = b.apply(method, subs, vec![slot], false);
    let result = b.result(call);
    b.dealloc_stack(slot);
    b.return_(result);

    let site = ApplySite::new(module.function(caller), call).expect("apply site");
    assert_eq!(can_devirtualize(&module, caller, site, None), Some(witness));
    let done = try_devirtualize(&mut module, caller, site, None).expect("devirtualized");
    assert_eq!(done.kind, DispatchKind::WitnessMethod);
    assert_eq!(direct_callee(&module, caller), Some(witness));

    // The witness is generic over Wrapper's parameter, bound by the conformance.
    let func = module.function(caller);
    let subs = done.site.substitutions(func);
    assert_eq!(subs.lookup(GenericParamKey::new(0, 0)), Some(&Type::int(64)));
    assert_eq!(done.site.arguments(func), &[slot]);
    verify_function(&module, caller)?;
    Ok(())
}

#[test]
fn test_inherited_method_of_generic_superclass() -> Result<()> {
    // class Cell<T> { func size() }, final class IntCell: Cell<Int64> inheriting size.
    let mut types = TypeContext::new();
    let cell = types.add_decl(NominalDecl::class("Cell").with_generic_params(1));
    let cell_int = Type::bound(cell, vec![Type::int(64)]);
    let int_cell = types.add_decl(
        NominalDecl::class("IntCell")
            .with_superclass(cell_int.clone())
            .final_(),
    );
    let size = types.add_method(MethodDecl::new("size", cell));

    let mut module = Module::new("generic_classes", types, ModuleOptions::default());
    let generic_size_ty = method_type(Type::bound(cell, vec![Type::param(0, 0)]))
        .with_generic_sig(GenericSignature::with_depths(&[1]));
    let cell_size = module.create_function("Cell.size", generic_size_ty.clone(), Linkage::Hidden)?;
    define_constant(&mut module, cell_size, 1);
    module.add_vtable(VTable::new(cell).with_entry(size, cell_size))?;
    module.add_vtable(VTable::new(int_cell).with_entry(size, cell_size))?;

    let caller = module.create_function(
        "int_cell_size",
        FunctionType::thin(vec![], vec![Type::int(64)]),
        Linkage::Public,
    )?;
    let entry = module.create_entry_block(caller);
    let mut b = module.builder_at(caller, InsertPoint::End(entry));
    let obj = b.alloc_ref(Type::nominal(int_cell));
    let receiver = b.upcast(obj, SilType::object(cell_int.clone()));
    let method = b.class_method(receiver, size, generic_size_ty);
    let subs = SubstitutionMap::from_pairs([(GenericParamKey::new(0, 0), Type::int(64))]);
    let call = b.apply(method, subs, vec![receiver], false);
    let result = b.result(call);
    b.return_(result);

    let site = ApplySite::new(module.function(caller), call).expect("apply site");
    let done = try_devirtualize(&mut module, caller, site, None).expect("devirtualized");
    assert_eq!(done.target, cell_size);

    // `T` is bound through IntCell's superclass, and `self` is upcast to Cell<Int64>.
    let func = module.function(caller);
    let subs = done.site.substitutions(func);
    assert_eq!(subs.lookup(GenericParamKey::new(0, 0)), Some(&Type::int(64)));
    let self_arg = done.site.arguments(func)[0];
    assert_eq!(func.value_type(self_arg), &SilType::object(cell_int));
    assert!(func
        .defining_kind(self_arg)
        .is_some_and(|k| k.opcode() == Opcode::Upcast));
    verify_function(&module, caller)?;
    Ok(())
}

/// `class Node { func copy() -> Node }` overridden covariantly by
/// `final class Leaf { func copy() -> Leaf }`, both throwing.
struct Nodes {
    module: Module,
    node: DeclId,
    leaf: DeclId,
    copy: MethodId,
    leaf_copy: FunctionId,
}

fn copy_type(self_ty: Type, result: Type) -> FunctionType {
    FunctionType::new(
        vec![ParamInfo::new(self_ty, ParamConvention::DirectGuaranteed)],
        vec![ResultInfo::new(result, ResultConvention::Owned)],
        Representation::Method,
    )
    .with_error(Type::native_object())
}

impl Nodes {
    fn new() -> Result<Self> {
        let mut types = TypeContext::new();
        let node = types.add_decl(NominalDecl::class("Node"));
        let leaf = types.add_decl(
            NominalDecl::class("Leaf")
                .with_superclass(Type::nominal(node))
                .final_(),
        );
        let copy = types.add_method(MethodDecl::new("copy", node));
        let leaf_override = types.add_method(MethodDecl::new("copy", leaf).overriding(copy));

        let mut module = Module::new("nodes", types, ModuleOptions::default());
        let node_ty = Type::nominal(node);
        let leaf_ty = Type::nominal(leaf);
        let node_copy = module.create_function(
            "Node.copy",
            copy_type(node_ty.clone(), node_ty),
            Linkage::Hidden,
        )?;
        let leaf_copy = module.create_function(
            "Leaf.copy",
            copy_type(leaf_ty.clone(), leaf_ty),
            Linkage::Hidden,
        )?;
        for f in [node_copy, leaf_copy] {
            let entry = module.create_entry_block(f);
            let this = module.function(f).arguments()[0];
            module.builder_at(f, InsertPoint::End(entry)).return_(this);
        }
        module.add_vtable(VTable::new(node).with_entry(copy, node_copy))?;
        module.add_vtable(VTable::new(leaf).with_entry(leaf_override, leaf_copy))?;
        Ok(Self {
            module,
            node,
            leaf,
            copy,
            leaf_copy,
        })
    }

    /// Creates `name` with an empty entry block and `normal(Node)` / `error(Error)` blocks
    /// that return and rethrow their argument.
    fn caller(&mut self, name: &str) -> Result<(FunctionId, BlockId, BlockId, BlockId)> {
        let node_ty = Type::nominal(self.node);
        let f = self.module.create_function(
            name,
            FunctionType::thin(vec![Type::int(1)], vec![node_ty.clone()])
                .with_error(Type::native_object()),
            Linkage::Public,
        )?;
        let entry = self.module.create_entry_block(f);
        let func = self.module.function_mut(f);
        let normal = func.create_block();
        let error = func.create_block();
        let value = func.add_block_arg(normal, SilType::object(node_ty), OwnershipKind::Owned);
        let err = func.add_block_arg(
            error,
            SilType::object(Type::native_object()),
            OwnershipKind::Owned,
        );
        let mut b = self.module.builder_at(f, InsertPoint::End(normal));
        b.return_(value);
        b.position_at_end(error);
        b.throw(err);
        Ok((f, entry, normal, error))
    }

    /// Emits `try_apply` of `copy` on a new `Leaf` at the end of `block`.
    fn emit_call(
        &mut self,
        f: FunctionId,
        block: BlockId,
        normal: BlockId,
        error: BlockId,
    ) -> InstId {
        let node_ty = Type::nominal(self.node);
        let mut b = self.module.builder_at(f, InsertPoint::End(block));
        let obj = b.alloc_ref(Type::nominal(self.leaf));
        let up = b.upcast(obj, SilType::object(node_ty.clone()));
        let method = b.class_method(up, self.copy, copy_type(node_ty.clone(), node_ty));
        b.try_apply(method, SubstitutionMap::new(), vec![up], normal, error)
    }
}

fn first_inst_opcode(func: &Function, block: BlockId) -> Option<Opcode> {
    func.block_insts(block).first().map(|i| func.inst(*i).opcode())
}

fn successor(func: &Function, call: ApplySite, index: usize) -> BlockId {
    func.inst(call.inst()).successors()[index].block
}

fn arg_type(func: &Function, block: BlockId) -> SilType {
    let arg: ValueId = func.block_args(block)[0];
    func.value_type(arg).clone()
}

#[test]
fn test_try_apply_covariant_result_cast_in_place() -> Result<()> {
    let mut nodes = Nodes::new()?;
    let (f, entry, normal, error) = nodes.caller("copy_leaf")?;
    let call = nodes.emit_call(f, entry, normal, error);
    let before = nodes.module.function(f).block_count();

    let site = ApplySite::new(nodes.module.function(f), call).expect("apply site");
    let done = try_devirtualize(&mut nodes.module, f, site, None).expect("devirtualized");
    assert_eq!(done.target, nodes.leaf_copy);
    assert_eq!(done.site.kind(), ApplyKind::TryApply);

    // Both successors have the call as only predecessor: reused, no new block.
    let func = nodes.module.function(f);
    assert_eq!(func.block_count(), before);
    assert_eq!(successor(func, done.site, 0), normal);
    assert_eq!(successor(func, done.site, 1), error);
    // The normal block now receives a Leaf and upcasts it for the old users.
    assert_eq!(arg_type(func, normal), SilType::object(Type::nominal(nodes.leaf)));
    assert_eq!(first_inst_opcode(func, normal), Some(Opcode::Upcast));
    let upcast = func.block_insts(normal)[0];
    let ret = func.terminator(normal).expect("normal block returns");
    assert_eq!(func.inst(ret).operand(0), func.inst(upcast).results()[0]);
    assert_eq!(func.inst(upcast).operand(0), func.block_args(normal)[0]);
    verify_function(&nodes.module, f)?;
    Ok(())
}

#[test]
fn test_try_apply_shared_successors_get_trampolines() -> Result<()> {
    let mut nodes = Nodes::new()?;
    let (f, entry, normal, error) = nodes.caller("copy_or_fallback")?;
    let func = nodes.module.function_mut(f);
    let call_block = func.create_block();
    let side = func.create_block();
    let cond = func.arguments()[0];
    let pending = func.undef(SilType::object(Type::native_object()));
    let mut b = nodes.module.builder_at(f, InsertPoint::End(entry));
    b.cond_branch(cond, call_block, vec![], side, vec![]);
    b.position_at_end(side);
    let fallback = b.alloc_ref(Type::nominal(nodes.node));
    b.cond_branch(cond, normal, vec![fallback], error, vec![pending]);
    let call = nodes.emit_call(f, call_block, normal, error);
    let before = nodes.module.function(f).block_count();

    let site = ApplySite::new(nodes.module.function(f), call).expect("apply site");
    let done = try_devirtualize(&mut nodes.module, f, site, None).expect("devirtualized");
    assert_eq!(done.target, nodes.leaf_copy);

    // Normal and error blocks have another predecessor, so the call gets fresh ones.
    let func = nodes.module.function(f);
    assert_eq!(func.block_count(), before + 2);
    let new_normal = successor(func, done.site, 0);
    let new_error = successor(func, done.site, 1);
    assert!(new_normal != normal && new_error != error);
    assert_eq!(func.successor_blocks(new_normal), vec![normal]);
    assert_eq!(func.successor_blocks(new_error), vec![error]);
    assert_eq!(func.predecessor_blocks(normal).len(), 2);

    // The result trampoline takes a Leaf and upcasts it before branching on.
    assert_eq!(arg_type(func, new_normal), SilType::object(Type::nominal(nodes.leaf)));
    assert_eq!(first_inst_opcode(func, new_normal), Some(Opcode::Upcast));
    assert_eq!(arg_type(func, new_error), SilType::object(Type::native_object()));
    assert_eq!(first_inst_opcode(func, new_error), Some(Opcode::Branch));
    assert_eq!(arg_type(func, normal), SilType::object(Type::nominal(nodes.node)));
    verify_function(&nodes.module, f)?;
    Ok(())
}
