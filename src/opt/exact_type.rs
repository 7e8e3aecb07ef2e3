//! Proving the exact dynamic class of a value and the finality of classes and methods.
//!
//! A dynamic dispatch can be replaced by a direct call once the implementation it selects
//! is known. That is the case when the class of the receiver is known exactly, when the
//! class cannot have subclasses in this module's view, or when no visible subclass
//! overrides the method.

use std::collections::HashSet;

use crate::{
    analysis::ClassHierarchyAnalysis,
    ir::{
        AccessLevel, DeclId, Function, InstKind, MethodId, Module, SilType, Type, ValueDef,
        ValueId,
    },
    opt::local::{callees_are_statically_knowable, strip_casts},
};

/// Returns `true` if no subclass of `decl` can exist at runtime.
///
/// Final classes qualify directly. Other classes must be defined in the module and may not
/// be visible to code that could subclass them: open classes never qualify, public and
/// internal classes only under whole-module compilation. The hierarchy analysis must
/// then confirm that the class has no subclasses.
#[must_use]
pub fn is_known_final_class(
    module: &Module,
    decl: DeclId,
    cha: Option<&ClassHierarchyAnalysis>,
) -> bool {
    let class = module.types().decl(decl);
    if class.is_final() {
        return true;
    }
    if !class.is_defined_in_module() {
        return false;
    }
    match class.access() {
        AccessLevel::Open => return false,
        AccessLevel::Public | AccessLevel::Internal if !module.is_whole_module() => return false,
        _ => {}
    }
    cha.is_some_and(|cha| !cha.has_known_direct_subclasses(decl))
}

/// Returns the subclasses of `decl` that an instance of `class_ty` may have at runtime.
///
/// For a bound generic `class_ty`, subclasses that inherit from a different instantiation
/// are dropped. Generic subclasses are kept, since some instantiation of them may match.
#[must_use]
pub fn subclasses_of_type(
    module: &Module,
    cha: &ClassHierarchyAnalysis,
    decl: DeclId,
    class_ty: &Type,
) -> Vec<DeclId> {
    let types = module.types();
    let class_ty = class_ty.strip_metatype();
    let mut subs = cha.all_subclasses(decl);
    if !class_ty.generic_args().is_empty() {
        subs.retain(|sub| {
            types.decl(*sub).generic_param_count() > 0 || types.could_be_subclass_of(*sub, class_ty)
        });
    }
    subs
}

/// Returns `true` if `member` resolves to the same implementation for every runtime class
/// an instance of `class_ty` may have.
#[must_use]
pub fn is_effectively_final_method(
    module: &Module,
    member: MethodId,
    class_ty: &Type,
    cha: Option<&ClassHierarchyAnalysis>,
) -> bool {
    let types = module.types();
    let decl = types.class_decl(class_ty);
    if decl.is_some_and(|d| types.decl(d).is_final()) {
        return true;
    }
    if !callees_are_statically_knowable(module, member) {
        return false;
    }
    if !types.method(member).is_overridden() {
        return true;
    }
    let (Some(decl), Some(cha)) = (decl, cha) else {
        return false;
    };
    let Some(target) = module.look_up_function_in_vtable(decl, member) else {
        return false;
    };
    subclasses_of_type(module, cha, decl, class_ty)
        .into_iter()
        .all(|sub| module.look_up_function_in_vtable(sub, member) == Some(target))
}

/// Finds a value with the same reference identity as `value` whose dynamic class is
/// exactly its static type.
///
/// Looks through identity preserving casts and through block arguments fed by a single
/// predecessor. The search succeeds at an allocation, a metatype, a function argument of
/// a known final class, or the success argument of an exact checked cast.
#[must_use]
pub fn instance_with_exact_dynamic_type(
    module: &Module,
    func: &Function,
    value: ValueId,
    cha: Option<&ClassHierarchyAnalysis>,
) -> Option<ValueId> {
    let mut visited = HashSet::new();
    let mut current = value;
    loop {
        current = strip_casts(func, current);
        if !visited.insert(current) {
            return None;
        }
        match func.value(current).def() {
            ValueDef::InstResult { .. } => {
                return match func.defining_kind(current) {
                    Some(InstKind::AllocRef | InstKind::Metatype) => Some(current),
                    _ => None,
                };
            }
            ValueDef::BlockArg { block, index } => {
                let Some(pred) = func.single_predecessor_block(block) else {
                    let is_function_arg = func.entry_block() == Some(block);
                    let final_class = module
                        .types()
                        .class_decl(func.value_type(current).ty())
                        .is_some_and(|d| is_known_final_class(module, d, cha));
                    return (is_function_arg && final_class).then_some(current);
                };
                let term = func.terminator(pred)?;
                let term = func.inst(term);
                match term.kind() {
                    InstKind::Branch | InstKind::CondBranch { .. } => {
                        let edge = term.successors().iter().position(|e| e.block == block)?;
                        current = *term.successor_args(edge).get(index)?;
                    }
                    InstKind::CheckedCastBranch { exact: true, .. }
                        if term.successors()[0].block == block =>
                    {
                        return Some(current);
                    }
                    _ => return None,
                }
            }
            ValueDef::Undef | ValueDef::Erased => return None,
        }
    }
}

/// Computes the one type every value `value` may hold at runtime has.
///
/// All definitions reaching `value` through casts and phis must agree on the type.
/// Allocations, metatypes, literals and aggregates contribute their own type; function
/// arguments only if they are of a known final class or a trivial non-class type.
///
/// # Returns
///
/// `None` if some reaching definition has an unknown or different dynamic type.
#[must_use]
pub fn exact_dynamic_type(
    module: &Module,
    func: &Function,
    value: ValueId,
    cha: Option<&ClassHierarchyAnalysis>,
) -> Option<SilType> {
    let types = module.types();
    let mut result: Option<SilType> = None;
    let mut unify = |ty: &SilType| match &result {
        Some(known) if known != ty => false,
        _ => {
            result = Some(ty.clone());
            true
        }
    };

    let mut worklist = vec![value];
    let mut processed = HashSet::new();
    while let Some(current) = worklist.pop() {
        if !processed.insert(current) {
            continue;
        }
        let current = strip_casts(func, current);
        let ty = func.value_type(current);
        match func.value(current).def() {
            ValueDef::InstResult { .. } => match func.defining_kind(current) {
                Some(
                    InstKind::AllocRef
                    | InstKind::Metatype
                    | InstKind::IntegerLiteral { .. }
                    | InstKind::FunctionRef { .. }
                    | InstKind::Struct
                    | InstKind::Tuple
                    | InstKind::Enum { .. },
                ) => {
                    if !unify(ty) {
                        return None;
                    }
                }
                _ => return None,
            },
            ValueDef::BlockArg { block, .. } if func.entry_block() == Some(block) => {
                if matches!(ty.ty(), Type::Metatype(_)) {
                    return None;
                }
                let known = match types.class_decl(ty.ty()) {
                    Some(decl) => is_known_final_class(module, decl, cha),
                    None => types.is_trivial(ty.ty()),
                };
                if !known || !unify(ty) {
                    return None;
                }
            }
            ValueDef::BlockArg { block, .. } => {
                let exact_cast = func.single_predecessor_block(block).is_some_and(|pred| {
                    func.terminator(pred).is_some_and(|term| {
                        let term = func.inst(term);
                        matches!(term.kind(), InstKind::CheckedCastBranch { exact: true, .. })
                            && term.successors()[0].block == block
                    })
                });
                if exact_cast {
                    if !unify(ty) {
                        return None;
                    }
                    continue;
                }
                worklist.extend(func.incoming_values(current)?);
            }
            ValueDef::Undef | ValueDef::Erased => return None,
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ModuleOptions,
        ir::{
            FunctionId, FunctionType, InsertPoint, Linkage, MethodDecl, NominalDecl,
            OwnershipKind, TypeContext, VTable,
        },
        test::fixtures::ClassFixture,
    };

    fn receiver(module: &Module, f: FunctionId, call: crate::ir::InstId) -> ValueId {
        let func = module.function(f);
        let method = func.inst(call).operand(0);
        func.inst(func.defining_inst(method).unwrap()).operand(0)
    }

    #[test]
    fn test_known_final_class() {
        let fx = ClassFixture::new(ModuleOptions::default(), true);
        let cha = ClassHierarchyAnalysis::new(&fx.module);
        assert!(is_known_final_class(&fx.module, fx.leaf, None));
        // Internal and not whole-module: other files may subclass.
        assert!(!is_known_final_class(&fx.module, fx.base, Some(&cha)));

        let fx = ClassFixture::new(ModuleOptions::whole_module(), false);
        let cha = ClassHierarchyAnalysis::new(&fx.module);
        assert!(!is_known_final_class(&fx.module, fx.base, Some(&cha)));
        assert!(is_known_final_class(&fx.module, fx.leaf, Some(&cha)));
        assert!(!is_known_final_class(&fx.module, fx.leaf, None));
    }

    #[test]
    fn test_open_and_external_classes_are_not_final() {
        let mut types = TypeContext::new();
        let open = types.add_decl(NominalDecl::class("Open").with_access(AccessLevel::Open));
        let external = types.add_decl(NominalDecl::class("Ext").external());
        let private = types.add_decl(NominalDecl::class("Priv").with_access(AccessLevel::Private));
        let module = Module::new("m", types, ModuleOptions::whole_module());
        let cha = ClassHierarchyAnalysis::new(&module);
        assert!(!is_known_final_class(&module, open, Some(&cha)));
        assert!(!is_known_final_class(&module, external, Some(&cha)));
        assert!(is_known_final_class(&module, private, Some(&cha)));
    }

    #[test]
    fn test_effectively_final_method() {
        let fx = ClassFixture::new(ModuleOptions::whole_module(), true);
        let cha = ClassHierarchyAnalysis::new(&fx.module);
        let base = Type::nominal(fx.base);
        let leaf = Type::nominal(fx.leaf);
        // Overridden by Leaf with a different implementation.
        assert!(!is_effectively_final_method(&fx.module, fx.member, &base, Some(&cha)));
        assert!(is_effectively_final_method(&fx.module, fx.member, &leaf, Some(&cha)));
        assert!(!is_effectively_final_method(&fx.module, fx.member, &base, None));
    }

    #[test]
    fn test_effectively_final_when_overrides_share_implementation() {
        let mut types = TypeContext::new();
        let base = types.add_decl(NominalDecl::class("Base"));
        let sub = types.add_decl(NominalDecl::class("Sub").with_superclass(Type::nominal(base)));
        let member = types.add_method(MethodDecl::new("m", base));
        let over = types.add_method(MethodDecl::new("m", sub).overriding(member));
        let mut module = Module::new("m", types, ModuleOptions::whole_module());
        let imp = module
            .create_function("Base.m", FunctionType::thin(vec![], vec![]), Linkage::Hidden)
            .unwrap();
        module.add_vtable(VTable::new(base).with_entry(member, imp)).unwrap();
        module.add_vtable(VTable::new(sub).with_entry(over, imp)).unwrap();
        let cha = ClassHierarchyAnalysis::new(&module);
        assert!(is_effectively_final_method(&module, member, &Type::nominal(base), Some(&cha)));
    }

    #[test]
    fn test_generic_subclass_filter() {
        let mut types = TypeContext::new();
        let base = types.add_decl(NominalDecl::class("G").with_generic_params(1));
        let of_int = types.add_decl(
            NominalDecl::class("OfInt").with_superclass(Type::bound(base, vec![Type::int(64)])),
        );
        let of_float = types.add_decl(
            NominalDecl::class("OfFloat").with_superclass(Type::bound(base, vec![Type::float(64)])),
        );
        let generic = types.add_decl(
            NominalDecl::class("Any")
                .with_generic_params(1)
                .with_superclass(Type::bound(base, vec![Type::param(0, 0)])),
        );
        let mut module = Module::new("m", types, ModuleOptions::whole_module());
        for class in [base, of_int, of_float, generic] {
            module.add_vtable(VTable::new(class)).unwrap();
        }
        let cha = ClassHierarchyAnalysis::new(&module);
        let g_int = Type::bound(base, vec![Type::int(64)]);
        assert_eq!(subclasses_of_type(&module, &cha, base, &g_int), vec![of_int, generic]);
        assert_eq!(
            subclasses_of_type(&module, &cha, base, &Type::metatype(g_int)),
            vec![of_int, generic]
        );
    }

    #[test]
    fn test_instance_of_allocation() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), false);
        let (f, call) = fx.caller_on_alloc("caller", fx.leaf);
        let recv = receiver(&fx.module, f, call);
        let func = fx.module.function(f);
        let instance = instance_with_exact_dynamic_type(&fx.module, func, recv, None).unwrap();
        assert_eq!(func.value_type(instance), &SilType::object(Type::nominal(fx.leaf)));
        assert_eq!(
            exact_dynamic_type(&fx.module, func, recv, None),
            Some(SilType::object(Type::nominal(fx.leaf)))
        );
    }

    #[test]
    fn test_instance_of_argument_needs_final_class() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), false);
        let (f, call) = fx.caller_on_argument("caller");
        let recv = receiver(&fx.module, f, call);
        let func = fx.module.function(f);
        assert_eq!(instance_with_exact_dynamic_type(&fx.module, func, recv, None), None);
        assert_eq!(exact_dynamic_type(&fx.module, func, recv, None), None);
    }

    /// `name: (Int1) -> ()` joining a `Leaf` allocation and an allocation of `other`
    /// in a block argument of type `Base`.
    fn phi_function(fx: &mut ClassFixture, name: &str, other: DeclId) -> (FunctionId, ValueId) {
        let base = SilType::object(Type::nominal(fx.base));
        let f = fx
            .module
            .create_function(name, FunctionType::thin(vec![Type::int(1)], vec![]), Linkage::Public)
            .unwrap();
        let entry = fx.module.create_entry_block(f);
        let cond = fx.module.function(f).arguments()[0];
        let func = fx.module.function_mut(f);
        let (left, right, join) = (func.create_block(), func.create_block(), func.create_block());
        let phi = func.add_block_arg(join, base.clone(), OwnershipKind::Owned);

        let mut b = fx.module.builder_at(f, InsertPoint::End(entry));
        b.cond_branch(cond, left, vec![], right, vec![]);
        for (block, class) in [(left, fx.leaf), (right, other)] {
            b.position_at_end(block);
            let obj = b.alloc_ref(Type::nominal(class));
            let obj = if class == fx.base { obj } else { b.upcast(obj, base.clone()) };
            b.branch(join, vec![obj]);
        }
        b.position_at_end(join);
        b.unreachable();
        (f, phi)
    }

    #[test]
    fn test_exact_type_through_phi() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), false);
        let leaf = SilType::object(Type::nominal(fx.leaf));
        let leaf_decl = fx.leaf;
        let (f, phi) = phi_function(&mut fx, "same", leaf_decl);
        let func = fx.module.function(f);
        assert_eq!(exact_dynamic_type(&fx.module, func, phi, None), Some(leaf));
        // Two predecessors: no single identity to follow.
        assert_eq!(instance_with_exact_dynamic_type(&fx.module, func, phi, None), None);

        let base_decl = fx.base;
        let (f, phi) = phi_function(&mut fx, "mixed", base_decl);
        assert_eq!(exact_dynamic_type(&fx.module, fx.module.function(f), phi, None), None);
    }

    #[test]
    fn test_instance_through_single_predecessor() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), false);
        let base = SilType::object(Type::nominal(fx.base));
        let f = fx
            .module
            .create_function("chain", FunctionType::thin(vec![], vec![]), Linkage::Public)
            .unwrap();
        let entry = fx.module.create_entry_block(f);
        let next = fx.module.function_mut(f).create_block();
        let arg = fx
            .module
            .function_mut(f)
            .add_block_arg(next, base.clone(), OwnershipKind::Owned);
        let mut b = fx.module.builder_at(f, InsertPoint::End(entry));
        let obj = b.alloc_ref(Type::nominal(fx.leaf));
        let up = b.upcast(obj, base);
        b.branch(next, vec![up]);
        b.position_at_end(next);
        b.unreachable();

        let func = fx.module.function(f);
        assert_eq!(instance_with_exact_dynamic_type(&fx.module, func, arg, None), Some(obj));
    }

    #[test]
    fn test_exact_checked_cast_success_argument() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), false);
        let leaf = SilType::object(Type::nominal(fx.leaf));
        let f = fx
            .module
            .create_function(
                "cast",
                FunctionType::thin(vec![Type::nominal(fx.base)], vec![]),
                Linkage::Public,
            )
            .unwrap();
        let entry = fx.module.create_entry_block(f);
        let arg = fx.module.function(f).arguments()[0];
        let func = fx.module.function_mut(f);
        let (success, failure) = (func.create_block(), func.create_block());
        let cast = func.add_block_arg(success, leaf.clone(), OwnershipKind::Guaranteed);

        let mut b = fx.module.builder_at(f, InsertPoint::End(entry));
        b.checked_cast_branch(true, arg, leaf.clone(), success, failure);
        b.position_at_end(success);
        b.unreachable();
        b.position_at_end(failure);
        b.unreachable();

        let func = fx.module.function(f);
        assert_eq!(instance_with_exact_dynamic_type(&fx.module, func, cast, None), Some(cast));
        assert_eq!(exact_dynamic_type(&fx.module, func, cast, None), Some(leaf));
        assert_eq!(instance_with_exact_dynamic_type(&fx.module, func, arg, None), None);
    }
}
