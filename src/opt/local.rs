//! Local transformation utilities shared by the optimizer passes.
//!
//! These helpers operate on one function at a time:
//!
//! - looking through casts that keep reference identity
//! - bridging ABI compatible but differently typed values with casts
//! - detecting and deleting instructions that became dead
//! - replacing an apply by a new call
//! - deciding whether all implementations of a class method are visible to the module

use crate::ir::{
    AccessLevel, ApplyKind, ApplySite, BuiltinType, Builder, Function, InstId, InstKind,
    Instruction, MemoryBehavior, MethodId, Module, SilType, Type, TypeContext, ValueId,
};

/// Follows `upcast` instructions back to the value they convert.
#[must_use]
pub fn strip_upcasts(func: &Function, mut value: ValueId) -> ValueId {
    while let Some(InstKind::Upcast) = func.defining_kind(value) {
        value = defining_operand(func, value);
    }
    value
}

/// Follows casts that keep reference identity, `upcast` and `unchecked_ref_cast`.
#[must_use]
pub fn strip_casts(func: &Function, mut value: ValueId) -> ValueId {
    while func
        .defining_kind(value)
        .is_some_and(|k| k.opcode().is_identity_preserving_cast())
    {
        value = defining_operand(func, value);
    }
    value
}

fn defining_operand(func: &Function, value: ValueId) -> ValueId {
    match func.defining_inst(value) {
        Some(inst) => func.inst(inst).operand(0),
        None => value,
    }
}

fn is_heap_object(types: &TypeContext, ty: &Type) -> bool {
    match ty {
        Type::Builtin(BuiltinType::NativeObject) => true,
        Type::Metatype(_) => false,
        _ => types.class_decl(ty).is_some(),
    }
}

/// Converts `value` of type `src` to the ABI compatible type `dest`.
///
/// The conversion is chosen by the kind of the two types:
///
/// - identical types need no conversion
/// - addresses are reinterpreted with `unchecked_addr_cast`
/// - a class converts to a superclass with `upcast`, to any other reference type with
///   `unchecked_ref_cast`
/// - metatypes upcast to a superclass metatype and are reinterpreted otherwise
/// - tuples are converted element by element
/// - function values use `convert_function`
///
/// Everything else is reinterpreted bitwise. New instructions are emitted at the
/// builder's insertion point.
pub fn cast_value_to_abi_compatible_type(
    b: &mut Builder<'_>,
    value: ValueId,
    src: &SilType,
    dest: &SilType,
) -> ValueId {
    if src == dest {
        return value;
    }
    if src.is_address() && dest.is_address() {
        return b.unchecked_addr_cast(value, dest.clone());
    }

    let types = b.types();
    let (src_ty, dest_ty) = (src.ty(), dest.ty());
    if types.is_superclass_of(dest_ty, src_ty) {
        return b.upcast(value, dest.clone());
    }
    if is_heap_object(types, src_ty) && is_heap_object(types, dest_ty) {
        return b.unchecked_ref_cast(value, dest.clone());
    }

    match (src_ty, dest_ty) {
        (Type::Metatype(src_instance), Type::Metatype(dest_instance)) => {
            if types.is_superclass_of(dest_instance, src_instance) {
                b.upcast(value, dest.clone())
            } else {
                b.unchecked_bitwise_cast(value, dest.clone())
            }
        }
        (Type::Tuple(src_elems), Type::Tuple(dest_elems))
            if src_elems.len() == dest_elems.len() =>
        {
            let pairs: Vec<(Type, Type)> = src_elems
                .iter()
                .cloned()
                .zip(dest_elems.iter().cloned())
                .collect();
            let mut elements = Vec::with_capacity(pairs.len());
            for (index, (from, to)) in pairs.into_iter().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let element = b.tuple_extract(value, index as u32);
                elements.push(cast_value_to_abi_compatible_type(
                    b,
                    element,
                    &SilType::object(from),
                    &SilType::object(to),
                ));
            }
            b.tuple(elements)
        }
        (Type::Function(_), Type::Function(_)) => b.convert_function(value, dest.clone()),
        _ => b.unchecked_bitwise_cast(value, dest.clone()),
    }
}

/// Returns `true` if removing `inst` cannot change the program.
///
/// An instruction is trivially dead when none of its results is used, it is not a
/// terminator, and it does not write memory or have other side effects. A `cond_fail`
/// on the constant `0` never fires and is dead as well.
#[must_use]
pub fn is_instruction_trivially_dead(func: &Function, inst: InstId) -> bool {
    if func.has_uses_of_any_result(inst) {
        return false;
    }
    let data = func.inst(inst);
    if data.is_terminator() {
        return false;
    }
    if let InstKind::CondFail = data.kind() {
        return matches!(
            func.defining_kind(data.operand(0)),
            Some(InstKind::IntegerLiteral { value: 0 })
        );
    }
    matches!(
        data.memory_behavior(),
        MemoryBehavior::None | MemoryBehavior::MayRead
    )
}

/// Deletes `roots` and every instruction that becomes trivially dead as a consequence.
///
/// Roots are deleted only if they are trivially dead themselves, unless `force` is set.
/// Forced roots may use each other's results, but no instruction outside the deleted set
/// may use them. `on_delete` sees each instruction right before it is erased.
///
/// # Returns
///
/// The number of erased instructions.
///
/// # Panics
///
/// Panics if a deleted instruction's results are still used by a surviving instruction.
pub fn recursively_delete_trivially_dead_instructions(
    b: &mut Builder<'_>,
    roots: &[InstId],
    force: bool,
    mut on_delete: impl FnMut(&Instruction),
) -> usize {
    let mut dead: Vec<InstId> = Vec::with_capacity(roots.len());
    for root in roots {
        if !dead.contains(root) && (force || is_instruction_trivially_dead(b.function(), *root)) {
            dead.push(*root);
        }
    }

    let mut removed = 0;
    while !dead.is_empty() {
        let mut defs: Vec<InstId> = Vec::new();
        for inst in &dead {
            for operand in b.function().inst(*inst).operands() {
                if let Some(def) = b.function().defining_inst(*operand) {
                    if !defs.contains(&def) && !dead.contains(&def) {
                        defs.push(def);
                    }
                }
            }
        }

        // Members of the set may use each other; erase users before their definitions.
        while !dead.is_empty() {
            let before = dead.len();
            let mut index = 0;
            while index < dead.len() {
                let inst = dead[index];
                if b.function().has_uses_of_any_result(inst) {
                    index += 1;
                    continue;
                }
                on_delete(b.function().inst(inst));
                b.erase(inst);
                removed += 1;
                dead.swap_remove(index);
            }
            assert!(
                dead.len() < before,
                "deleting instructions whose results are still used: {dead:?}"
            );
        }

        dead = defs
            .into_iter()
            .filter(|def| {
                b.function().contains_inst(*def) && is_instruction_trivially_dead(b.function(), *def)
            })
            .collect();
    }
    removed
}

/// Replaces the apply `old` by a call that has already been emitted.
///
/// For `apply` and `partial_apply` every use of the old result is rebound to `new`, which
/// must have the same type. A `try_apply` has no result and shares its successors with
/// the new call. The old apply is then deleted together with the callee computation and
/// the argument casts that nothing else uses.
///
/// # Returns
///
/// The number of erased instructions.
pub fn replace_dead_apply(
    b: &mut Builder<'_>,
    old: ApplySite,
    new: Option<ValueId>,
    on_delete: impl FnMut(&Instruction),
) -> usize {
    if old.kind() != ApplyKind::TryApply {
        if let (Some(new), Some(result)) = (new, b.function().inst(old.inst()).result()) {
            if new != result {
                b.function_mut().replace_all_uses_with(result, new);
            }
        }
    }
    recursively_delete_trivially_dead_instructions(b, &[old.inst()], true, on_delete)
}

/// Returns `true` if every implementation of `member` is known to the module.
///
/// This holds when the defining class belongs to the module, the method is not `dynamic`,
/// and its effective access keeps overrides inside the visible code: private members
/// always, internal and public members only under whole-module compilation, open members
/// never.
#[must_use]
pub fn callees_are_statically_knowable(module: &Module, member: MethodId) -> bool {
    let types = module.types();
    let method = types.method(member);
    let parent = types.decl(method.parent());
    if !parent.is_defined_in_module() || method.is_dynamic() {
        return false;
    }
    match method.access().min(parent.access()) {
        AccessLevel::Open => false,
        AccessLevel::Public | AccessLevel::Internal => module.is_whole_module(),
        AccessLevel::FilePrivate | AccessLevel::Private => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ModuleOptions,
        ir::{InsertPoint, Opcode, StoreQualifier},
        test::fixtures::{simple_module, ClassFixture},
    };

    #[test]
    fn test_strip_casts() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), true);
        let (f, _) = fx.caller_on_alloc("caller", fx.leaf);
        let func = fx.module.function(f);
        let method = func
            .instructions()
            .find(|(_, i)| func.inst(*i).opcode() == Opcode::ClassMethod)
            .map(|(_, i)| i)
            .unwrap();
        let receiver = func.inst(method).operand(0);
        let stripped = strip_upcasts(func, receiver);
        assert_eq!(func.defining_kind(stripped).map(InstKind::opcode), Some(Opcode::AllocRef));
        assert_eq!(strip_casts(func, receiver), stripped);
        assert_eq!(strip_casts(func, stripped), stripped);
    }

    #[test]
    fn test_cast_to_superclass_and_identity() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), true);
        let (f, call) = fx.caller_on_alloc("caller", fx.leaf);
        let base = SilType::object(Type::nominal(fx.base));
        let leaf = SilType::object(Type::nominal(fx.leaf));
        let mut b = fx.module.builder_at(f, InsertPoint::Before(call));
        let obj = b.alloc_ref(Type::nominal(fx.leaf));
        assert_eq!(cast_value_to_abi_compatible_type(&mut b, obj, &leaf, &leaf), obj);
        let up = cast_value_to_abi_compatible_type(&mut b, obj, &leaf, &base);
        assert_eq!(b.function().defining_kind(up).map(InstKind::opcode), Some(Opcode::Upcast));
        let down = cast_value_to_abi_compatible_type(&mut b, up, &base, &leaf);
        assert_eq!(
            b.function().defining_kind(down).map(InstKind::opcode),
            Some(Opcode::UncheckedRefCast)
        );
        assert_eq!(b.function().value_type(down), &leaf);
    }

    #[test]
    fn test_cast_tuples_element_wise() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), true);
        let (f, call) = fx.caller_on_alloc("caller", fx.leaf);
        let mut b = fx.module.builder_at(f, InsertPoint::Before(call));
        let obj = b.alloc_ref(Type::nominal(fx.leaf));
        let one = b.integer_literal(Type::int(64), 1);
        let pair = b.tuple(vec![obj, one]);
        let src = b.function().value_type(pair).clone();
        let dest = SilType::object(Type::tuple(vec![Type::nominal(fx.base), Type::int(64)]));
        let cast = cast_value_to_abi_compatible_type(&mut b, pair, &src, &dest);
        assert_eq!(b.function().value_type(cast), &dest);
        assert_eq!(b.function().defining_kind(cast).map(InstKind::opcode), Some(Opcode::Tuple));
    }

    #[test]
    fn test_cast_addresses() {
        let (mut module, f) = simple_module();
        let entry = module.function(f).entry_block().unwrap();
        let mut b = module.builder_at(f, InsertPoint::End(entry));
        let slot = b.alloc_stack(Type::int(64));
        let src = b.function().value_type(slot).clone();
        let dest = SilType::address(Type::int(32));
        let cast = cast_value_to_abi_compatible_type(&mut b, slot, &src, &dest);
        assert_eq!(
            b.function().defining_kind(cast).map(InstKind::opcode),
            Some(Opcode::UncheckedAddrCast)
        );
        let fallback =
            cast_value_to_abi_compatible_type(&mut b, slot, &src, &SilType::object(Type::int(64)));
        assert_eq!(
            b.function().defining_kind(fallback).map(InstKind::opcode),
            Some(Opcode::UncheckedBitwiseCast)
        );
    }

    #[test]
    fn test_trivially_dead() {
        let (mut module, f) = simple_module();
        let entry = module.function(f).entry_block().unwrap();
        let mut b = module.builder_at(f, InsertPoint::End(entry));
        let zero = b.integer_literal(Type::int(1), 0);
        let one = b.integer_literal(Type::int(1), 1);
        let never = b.cond_fail(zero);
        let maybe = b.cond_fail(one);
        let slot = b.alloc_stack(Type::int(1));
        let store = b.store(one, slot, StoreQualifier::Trivial);
        let unused = b.integer_literal(Type::int(64), 9);
        let unit = b.tuple(vec![]);
        let ret = b.return_(unit);

        let func = module.function(f);
        assert!(is_instruction_trivially_dead(func, never));
        assert!(!is_instruction_trivially_dead(func, maybe));
        assert!(!is_instruction_trivially_dead(func, store));
        assert!(!is_instruction_trivially_dead(func, ret));
        assert!(!is_instruction_trivially_dead(func, func.defining_inst(one).unwrap()));
        assert!(is_instruction_trivially_dead(func, func.defining_inst(unused).unwrap()));
    }

    #[test]
    fn test_recursive_deletion_follows_operands() {
        let (mut module, f) = simple_module();
        let entry = module.function(f).entry_block().unwrap();
        let mut b = module.builder_at(f, InsertPoint::End(entry));
        let one = b.integer_literal(Type::int(64), 1);
        let two = b.integer_literal(Type::int(64), 2);
        let pair = b.tuple(vec![one, two]);
        let first = b.tuple_extract(pair, 0);
        let kept = b.integer_literal(Type::int(64), 3);
        b.tuple(vec![kept]);
        let unit = b.tuple(vec![]);
        b.return_(unit);

        let root = b.function().defining_inst(first).unwrap();
        let mut seen = Vec::new();
        let removed = recursively_delete_trivially_dead_instructions(&mut b, &[root], false, |i| {
            seen.push(i.opcode());
        });
        assert_eq!(removed, 4);
        assert_eq!(seen[0], Opcode::TupleExtract);
        assert_eq!(seen[1], Opcode::Tuple);
        assert!(!b.function().contains_inst(root));
        assert!(b.function().defining_inst(kept).is_some());
    }

    #[test]
    fn test_recursive_deletion_keeps_live_roots() {
        let (mut module, f) = simple_module();
        let entry = module.function(f).entry_block().unwrap();
        let mut b = module.builder_at(f, InsertPoint::End(entry));
        let unit = b.tuple(vec![]);
        b.return_(unit);
        let root = b.function().defining_inst(unit).unwrap();
        assert_eq!(
            recursively_delete_trivially_dead_instructions(&mut b, &[root], false, |_| {}),
            0
        );
        assert!(b.function().contains_inst(root));
    }

    #[test]
    fn test_replace_dead_apply_removes_dispatch() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), true);
        let (f, call) = fx.caller_on_alloc("caller", fx.leaf);
        let leaf_ty = fx.module.function(fx.leaf_impl).lowered_type().clone();
        let site = ApplySite::new(fx.module.function(f), call).unwrap();
        let receiver = fx.module.function(f).inst(call).operand(1);

        let mut b = fx.module.builder_at(f, InsertPoint::Before(call));
        let callee = b.function_ref(fx.leaf_impl, leaf_ty);
        let obj = strip_upcasts(b.function(), receiver);
        let direct = b.apply(callee, crate::ir::SubstitutionMap::new(), vec![obj], false);
        let new = b.result(direct);
        let removed = replace_dead_apply(&mut b, site, Some(new), |_| {});
        // apply, class_method, upcast
        assert_eq!(removed, 3);
        let func = b.function();
        assert!(!func.contains_inst(call));
        assert!(func
            .instructions()
            .all(|(_, i)| !func.inst(i).opcode().is_dispatch()));
        assert_eq!(func.uses(new).len(), 1);
    }

    #[test]
    fn test_callees_statically_knowable() {
        let fx = ClassFixture::new(ModuleOptions::default(), false);
        assert!(!callees_are_statically_knowable(&fx.module, fx.member));

        let fx = ClassFixture::new(ModuleOptions::whole_module(), false);
        assert!(callees_are_statically_knowable(&fx.module, fx.member));

        let mut types = TypeContext::new();
        let open = types.add_decl(crate::ir::NominalDecl::class("Open").with_access(AccessLevel::Open));
        let private = types.add_method(
            crate::ir::MethodDecl::new("p", open).with_access(AccessLevel::Private),
        );
        let public = types.add_method(crate::ir::MethodDecl::new("q", open));
        let dynamic = types.add_method(
            crate::ir::MethodDecl::new("r", open)
                .with_access(AccessLevel::Private)
                .dynamic(),
        );
        let module = Module::new("m", types, ModuleOptions::whole_module());
        assert!(callees_are_statically_knowable(&module, private));
        assert!(callees_are_statically_knowable(&module, public));
        assert!(!callees_are_statically_knowable(&module, dynamic));
    }
}
