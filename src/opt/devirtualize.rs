//! Replacing dynamic dispatch by direct calls.
//!
//! A call whose callee is computed by `class_method`, `super_method` or `witness_method`
//! dispatches at runtime. When the implementation the dispatch selects is known
//! statically, the call is rewritten into a `function_ref` of that implementation and a
//! direct apply:
//!
//! - `class_method`: the method is effectively final for the receiver's static class, or
//!   the receiver's exact dynamic class is known
//! - `super_method`: the implementation is always the one in the superclass's vtable
//! - `witness_method`: the conformance is concrete and its witness table is in the module
//!
//! Arguments and results are bridged with ABI compatible casts where the implementation's
//! signature differs from the dispatched one, e.g. a `self` of the overriding class.
//!
//! # Examples
//!
//! ```rust,ignore
//! use silcore::{analysis::ClassHierarchyAnalysis, ir::ApplySite, opt::try_devirtualize};
//!
//! let cha = ClassHierarchyAnalysis::new(&module);
//! let site = ApplySite::new(module.function(caller), call).unwrap();
//! if let Some(done) = try_devirtualize(&mut module, caller, site, Some(&cha)) {
//!     println!("now calling @{}", module.function(done.target).name());
//! }
//! ```

use strum::IntoStaticStr;

use crate::{
    analysis::ClassHierarchyAnalysis,
    config::ModuleStage,
    ir::{
        ApplyKind, ApplySite, BlockId, ConformanceRef, FullApplySite, Function, FunctionId,
        FunctionType, GenericParamKey, GenericSignature, InsertPoint, InstKind, MethodId,
        Module, Operand, OwnershipKind, SilType, SubstitutionMap, Type, TypeContext, ValueId,
    },
    opt::{
        exact_type::{
            exact_dynamic_type, instance_with_exact_dynamic_type, is_effectively_final_method,
        },
        local::{cast_value_to_abi_compatible_type, replace_dead_apply, strip_upcasts},
    },
};

/// The dispatch instruction a devirtualized call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DispatchKind {
    /// `class_method`
    ClassMethod,
    /// `super_method`
    SuperMethod,
    /// `witness_method`
    WitnessMethod,
}

/// Outcome of a successful devirtualization.
#[derive(Debug, Clone, Copy)]
pub struct Devirtualized {
    /// The new direct call
    pub site: ApplySite,
    /// The implementation now called
    pub target: FunctionId,
    /// The replaced dispatch
    pub kind: DispatchKind,
    /// Number of instructions erased: the old call and the computation only it used
    pub removed: usize,
}

/// A class dispatch known to resolve to `target`.
struct ClassPlan {
    /// The value passed as `self` to the implementation
    instance: ValueId,
    /// The class the vtable lookup happens in
    lookup: Type,
    target: FunctionId,
    kind: DispatchKind,
}

fn dispatch_kind(func: &Function, site: ApplySite) -> Option<&InstKind> {
    let kind = func.defining_kind(site.callee(func));
    assert!(
        kind.is_some_and(|k| k.opcode().is_dispatch()),
        "{} callee is not a dynamic dispatch",
        site.inst()
    );
    kind
}

/// Returns the implementation a dispatching call can be redirected to.
///
/// Performs every check [`try_devirtualize`] performs without changing the module.
///
/// # Panics
///
/// Panics if the callee of `site` is not a `class_method`, `super_method` or
/// `witness_method`.
#[must_use]
pub fn can_devirtualize(
    module: &Module,
    caller: FunctionId,
    site: ApplySite,
    cha: Option<&ClassHierarchyAnalysis>,
) -> Option<FunctionId> {
    let func = module.function(caller);
    if matches!(dispatch_kind(func, site)?, InstKind::WitnessMethod { .. }) {
        // Witnesses are resolved at any stage and regardless of the caller's optimize flag.
        witness_target(module, func, site).map(|(target, _)| target)
    } else {
        class_plan(module, func, site, cha).map(|plan| plan.target)
    }
}

/// Replaces a dispatching call by a direct call to the statically known implementation.
///
/// On success the old call is erased together with the dispatch instruction and the
/// casts that only fed it, so no use of the dispatch remains.
///
/// # Returns
///
/// `None`, without changing the module, if the implementation is not known.
///
/// # Panics
///
/// Panics if the callee of `site` is not a dynamic dispatch.
pub fn try_devirtualize(
    module: &mut Module,
    caller: FunctionId,
    site: ApplySite,
    cha: Option<&ClassHierarchyAnalysis>,
) -> Option<Devirtualized> {
    let func = module.function(caller);
    let done = if matches!(dispatch_kind(func, site)?, InstKind::WitnessMethod { .. }) {
        let (target, conformance) = witness_target(module, func, site)?;
        devirtualize_witness_method(module, caller, site, target, &conformance)?
    } else {
        let plan = class_plan(module, func, site, cha)?;
        devirtualize_class_method(module, caller, site.as_full()?, &plan)?
    };
    log::debug!(
        "devirtualized {} call in @{} to @{}",
        <&'static str>::from(done.kind),
        module.function(caller).name(),
        module.function(done.target).name()
    );
    Some(done)
}

// -------------------------------------------------------------------------------------
// Class methods
// -------------------------------------------------------------------------------------

fn class_plan(
    module: &Module,
    func: &Function,
    site: ApplySite,
    cha: Option<&ClassHierarchyAnalysis>,
) -> Option<ClassPlan> {
    if site.as_full().is_none() {
        log::trace!("{}: class dispatch through partial_apply", site.inst());
        return None;
    }
    let method = func.defining_inst(site.callee(func))?;
    let method = func.inst(method);
    let operand = method.operand(0);

    match *method.kind() {
        InstKind::ClassMethod { member } => {
            let instance = strip_upcasts(func, operand);
            let class_ty = func.value_type(instance).ty().clone();
            if is_effectively_final_method(module, member, &class_ty, cha) {
                return check_class_target(module, func, site, member, instance, class_ty);
            }
            if let Some(exact) = instance_with_exact_dynamic_type(module, func, operand, cha) {
                let exact_ty = func.value_type(exact).ty().clone();
                return check_class_target(module, func, site, member, exact, exact_ty);
            }
            let exact_ty = exact_dynamic_type(module, func, operand, cha)?;
            if &exact_ty == func.value_type(operand) {
                let exact_ty = exact_ty.ty().clone();
                return check_class_target(module, func, site, member, operand, exact_ty);
            }
            log::trace!("{}: dynamic class of the receiver is unknown", site.inst());
            None
        }
        InstKind::SuperMethod { member } => {
            let class_ty = func.value_type(operand).ty().strip_metatype();
            let Some(lookup) = module.types().superclass_type(class_ty) else {
                log::trace!("{}: super_method on a root class", site.inst());
                return None;
            };
            let instance = *site.arguments(func).last()?;
            let mut plan = check_class_target(module, func, site, member, instance, lookup)?;
            plan.kind = DispatchKind::SuperMethod;
            Some(plan)
        }
        _ => None,
    }
}

/// Looks `member` up in the vtable of `lookup` and checks the implementation may be
/// referenced from `func`.
fn check_class_target(
    module: &Module,
    func: &Function,
    site: ApplySite,
    member: MethodId,
    instance: ValueId,
    lookup: Type,
) -> Option<ClassPlan> {
    let types = module.types();
    let Some(target) = types
        .class_decl(&lookup)
        .and_then(|class| module.look_up_function_in_vtable(class, member))
    else {
        log::trace!("{}: no vtable entry for {}", site.inst(), types.method(member).name());
        return None;
    };
    let target_fn = module.function(target);
    if module.stage() != ModuleStage::Raw && !target_fn.should_optimize() {
        log::trace!("{}: @{} must not be optimized", site.inst(), target_fn.name());
        return None;
    }
    if func.is_serialized() && !target_fn.has_valid_linkage_for_fragile_ref() {
        log::trace!(
            "{}: @{} cannot be referenced from serialized @{}",
            site.inst(),
            target_fn.name(),
            func.name()
        );
        return None;
    }
    let target_ty = target_fn.lowered_type();
    if target_ty.self_param().is_none()
        || target_ty.argument_types().len() != site.arguments(func).len()
    {
        log::trace!("{}: @{} is not a compatible method", site.inst(), target_fn.name());
        return None;
    }
    Some(ClassPlan {
        instance,
        lookup,
        target,
        kind: DispatchKind::ClassMethod,
    })
}

/// Computes the substitutions for calling the class method implementation `target_ty`
/// on an instance of `derived`.
///
/// The implementation is generic over the generic parameters of its class, bound by the
/// receiver's superclass chain, followed by the method's own parameters, taken from the
/// original call's substitutions.
#[must_use]
pub fn class_callee_substitutions(
    types: &TypeContext,
    target_ty: &FunctionType,
    derived: &Type,
    orig_callee_ty: &FunctionType,
    call_subs: &SubstitutionMap,
) -> SubstitutionMap {
    let Some(sig) = target_ty.generic_sig.as_ref().filter(|s| !s.is_empty()) else {
        return SubstitutionMap::new();
    };
    let Some(base_class) = target_ty.self_param().and_then(|p| types.class_decl(&p.ty)) else {
        return call_subs.clone();
    };
    let base_depth = types.generic_depth(base_class);
    let base_subs = if base_depth > 0 {
        types
            .context_substitutions(derived, base_class)
            .unwrap_or_default()
    } else {
        SubstitutionMap::new()
    };
    let orig_depth = orig_callee_ty
        .self_param()
        .and_then(|p| types.class_decl(&p.ty))
        .map_or(0, |class| types.generic_depth(class));
    SubstitutionMap::combine_at_depth(&base_subs, call_subs, base_depth, orig_depth, sig)
}

fn fresh_ownership(types: &TypeContext, ty: &SilType) -> OwnershipKind {
    if ty.is_address() || types.is_trivial(ty.ty()) {
        OwnershipKind::Trivial
    } else {
        OwnershipKind::Owned
    }
}

fn devirtualize_class_method(
    module: &mut Module,
    caller: FunctionId,
    site: FullApplySite,
    plan: &ClassPlan,
) -> Option<Devirtualized> {
    let func = module.function(caller);
    let target_ty = module.function(plan.target).lowered_type().clone();
    let subs = class_callee_substitutions(
        module.types(),
        &target_ty,
        func.value_type(plan.instance).ty(),
        &site.site().orig_callee_type(func),
        site.substitutions(func),
    );
    let subst_ty = if target_ty.is_polymorphic() {
        target_ty.substituted(&subs)
    } else {
        target_ty.clone()
    };
    let param_types = subst_ty.argument_types();
    let result_ty = subst_ty.result_type();
    let args: Vec<(ValueId, SilType)> = site
        .arguments(func)
        .iter()
        .map(|a| (*a, func.value_type(*a).clone()))
        .collect();
    let instance_ty = func.value_type(plan.instance).clone();
    let nonthrowing = site.is_nonthrowing(func);
    log::trace!(
        "{}: dispatch resolved in {} to @{}",
        site.inst(),
        plan.lookup
            .nominal_decl()
            .map_or("?", |decl| module.types().decl(decl).name()),
        module.function(plan.target).name()
    );

    // Decide the successor layout of a try_apply before anything is emitted.
    let try_layout = match (site.normal_block(func), site.error_block(func)) {
        (Some(normal), Some(error)) => {
            let normal_arg = *func.block_args(normal).first()?;
            let error_arg = *func.block_args(error).first()?;
            Some(TryLayout {
                call_block: func.inst(site.inst()).parent()?,
                normal,
                error,
                normal_arg_ty: func.value_type(normal_arg).clone(),
                error_arg_ty: func.value_type(error_arg).clone(),
                reuse_normal: func.single_predecessor_block(normal).is_some(),
                reuse_error: func.single_predecessor_block(error).is_some(),
            })
        }
        _ => None,
    };
    let orig_result_ty = match &try_layout {
        Some(layout) => layout.normal_arg_ty.clone(),
        None => site.subst_callee_type(func).result_type(),
    };

    let mut b = module.builder_at(caller, InsertPoint::Before(site.inst()));
    let callee = b.function_ref(plan.target, target_ty);
    let (self_ty, other_types) = param_types.split_last()?;
    let (_, other_args) = args.split_last()?;
    let mut new_args = Vec::with_capacity(args.len());
    for ((arg, ty), param_ty) in other_args.iter().zip(other_types) {
        new_args.push(cast_value_to_abi_compatible_type(&mut b, *arg, ty, param_ty));
    }
    new_args.push(cast_value_to_abi_compatible_type(
        &mut b,
        plan.instance,
        &instance_ty,
        self_ty,
    ));

    let Some(layout) = try_layout else {
        let call = b.apply(callee, subs, new_args, nonthrowing);
        let result = b.result(call);
        let result = cast_value_to_abi_compatible_type(&mut b, result, &result_ty, &orig_result_ty);
        let new_site = ApplySite::new(b.function(), call)?;
        let removed = replace_dead_apply(&mut b, site.site(), Some(result), |_| {});
        return Some(Devirtualized {
            site: new_site,
            target: plan.target,
            kind: plan.kind,
            removed,
        });
    };

    let result_block = if layout.reuse_normal {
        layout.normal
    } else {
        let block = b.function_mut().create_block_after(layout.call_block);
        let ownership = fresh_ownership(b.types(), &result_ty);
        b.function_mut()
            .add_block_arg(block, result_ty.clone(), ownership);
        block
    };
    let error_block = if layout.reuse_error {
        layout.error
    } else {
        let block = b.function_mut().create_block_after(result_block);
        let ownership = fresh_ownership(b.types(), &layout.error_arg_ty);
        b.function_mut()
            .add_block_arg(block, layout.error_arg_ty.clone(), ownership);
        block
    };
    let call = b.try_apply(callee, subs, new_args, result_block, error_block);
    let new_site = ApplySite::new(b.function(), call)?;
    if !layout.reuse_error {
        b.position_at_end(error_block);
        let error = b.function().block_args(error_block)[0];
        b.branch(layout.error, vec![error]);
    }

    let cast_result = result_ty != layout.normal_arg_ty;
    let mut rebound: Vec<Operand> = Vec::new();
    let result = if !layout.reuse_normal {
        b.position_at_end(result_block);
        b.function().block_args(result_block)[0]
    } else if cast_result {
        let first = *b.function().block_insts(layout.normal).first()?;
        b.position_before(first);
        let old = b.function().block_args(layout.normal)[0];
        rebound = b.function().uses(old).to_vec();
        b.function_mut().replace_all_uses_with_undef(old);
        let ownership = fresh_ownership(b.types(), &result_ty);
        b.function_mut()
            .replace_block_arg(layout.normal, 0, result_ty.clone(), ownership)
    } else {
        b.function().block_args(layout.normal)[0]
    };
    let result = cast_value_to_abi_compatible_type(&mut b, result, &result_ty, &orig_result_ty);
    if !layout.reuse_normal {
        b.branch(layout.normal, vec![result]);
    } else {
        for op in rebound {
            b.function_mut().set_operand(op, result);
        }
    }

    let removed = replace_dead_apply(&mut b, site.site(), None, |_| {});
    Some(Devirtualized {
        site: new_site,
        target: plan.target,
        kind: plan.kind,
        removed,
    })
}

/// Successor blocks of a `try_apply` being replaced.
struct TryLayout {
    call_block: BlockId,
    normal: BlockId,
    error: BlockId,
    normal_arg_ty: SilType,
    error_arg_ty: SilType,
    /// The new call can branch to the normal block directly.
    reuse_normal: bool,
    /// The new call can branch to the error block directly.
    reuse_error: bool,
}

// -------------------------------------------------------------------------------------
// Witness methods
// -------------------------------------------------------------------------------------

fn witness_target(
    module: &Module,
    func: &Function,
    site: ApplySite,
) -> Option<(FunctionId, ConformanceRef)> {
    let Some(InstKind::WitnessMethod {
        conformance,
        member,
        ..
    }) = func.defining_kind(site.callee(func))
    else {
        return None;
    };
    let Some(target) = module.look_up_function_in_witness_table(conformance, *member) else {
        log::trace!(
            "{}: no witness for {}",
            site.inst(),
            module.types().method(*member).name()
        );
        return None;
    };
    let target_fn = module.function(target);
    if func.is_serialized() && !target_fn.has_valid_linkage_for_fragile_ref() {
        log::trace!(
            "{}: witness @{} cannot be referenced from serialized @{}",
            site.inst(),
            target_fn.name(),
            func.name()
        );
        return None;
    }
    let bound = target_fn.lowered_type().argument_types().len();
    if bound < site.arguments(func).len()
        || (site.as_full().is_some() && bound != site.arguments(func).len())
    {
        log::trace!("{}: witness @{} has another arity", site.inst(), target_fn.name());
        return None;
    }
    Some((target, conformance.clone()))
}

/// Computes the substitutions for calling the witness `target_ty` in place of a
/// requirement called with `requirement_subs`.
///
/// A witness is generic over the generic parameters of the conforming type, bound by the
/// conformance, followed by the requirement's own parameters. Witnesses of class
/// conformances are additionally generic over `Self` at depth 0. Default witnesses take
/// the requirement's substitutions unchanged.
#[must_use]
pub fn witness_substitutions(
    types: &TypeContext,
    requirement_subs: &SubstitutionMap,
    target_ty: &FunctionType,
    conformance: &ConformanceRef,
) -> SubstitutionMap {
    let Some(thunk_sig) = target_ty.generic_sig.as_ref() else {
        return SubstitutionMap::new();
    };
    let Some(root) = conformance.root() else {
        return requirement_subs.clone();
    };
    let root = types.conformance(root);
    if target_ty.default_witness_protocol() == Some(root.protocol()) {
        return requirement_subs.clone();
    }

    let mut base = conformance.substitutions();
    let mut base_depth = root.generic_sig().map_or(0, GenericSignature::depth_count);
    if target_ty.witness_method_class().is_some() {
        let self_subs = SubstitutionMap::from_pairs(
            requirement_subs
                .self_type()
                .cloned()
                .map(|ty| (GenericParamKey::new(0, 0), ty)),
        );
        base = if base.is_empty() {
            self_subs
        } else {
            SubstitutionMap::combine_at_depth(&self_subs, &base, 1, 0, thunk_sig)
        };
        base_depth += 1;
    }
    SubstitutionMap::combine_at_depth(&base, requirement_subs, base_depth, 1, thunk_sig)
}

fn devirtualize_witness_method(
    module: &mut Module,
    caller: FunctionId,
    site: ApplySite,
    target: FunctionId,
    conformance: &ConformanceRef,
) -> Option<Devirtualized> {
    let func = module.function(caller);
    let target_ty = module.function(target).lowered_type().clone();
    let subs = witness_substitutions(
        module.types(),
        site.substitutions(func),
        &target_ty,
        conformance,
    );
    let subst_ty = target_ty.substituted(&subs);
    let param_types = subst_ty.argument_types();
    let args: Vec<(ValueId, SilType)> = site
        .arguments(func)
        .iter()
        .map(|a| (*a, func.value_type(*a).clone()))
        .collect();
    // A partial_apply binds the trailing parameters.
    let first = param_types.len() - args.len();
    let full = site.as_full();
    let nonthrowing = full.is_some_and(|f| f.is_nonthrowing(func));
    let successors = full.and_then(|f| Some((f.normal_block(func)?, f.error_block(func)?)));
    let orig_result_ty = func
        .inst(site.inst())
        .result()
        .map(|r| func.value_type(r).clone());

    let mut b = module.builder_at(caller, InsertPoint::Before(site.inst()));
    let callee = b.function_ref(target, target_ty);
    let mut new_args = Vec::with_capacity(args.len());
    for ((arg, ty), param_ty) in args.iter().zip(&param_types[first..]) {
        new_args.push(cast_value_to_abi_compatible_type(&mut b, *arg, ty, param_ty));
    }

    let (call, result) = match site.kind() {
        ApplyKind::Apply => {
            let call = b.apply(callee, subs, new_args, nonthrowing);
            (call, Some(b.result(call)))
        }
        ApplyKind::TryApply => {
            let (normal, error) = successors?;
            (b.try_apply(callee, subs, new_args, normal, error), None)
        }
        ApplyKind::PartialApply => {
            let closure = b.partial_apply(callee, subs, new_args);
            (b.function().defining_inst(closure)?, Some(closure))
        }
    };
    let new_site = ApplySite::new(b.function(), call)?;
    let result = match (result, orig_result_ty) {
        (Some(value), Some(orig_ty)) => {
            let new_ty = b.function().value_type(value).clone();
            Some(cast_value_to_abi_compatible_type(&mut b, value, &new_ty, &orig_ty))
        }
        _ => None,
    };
    let removed = replace_dead_apply(&mut b, site, result, |_| {});
    Some(Devirtualized {
        site: new_site,
        target,
        kind: DispatchKind::WitnessMethod,
        removed,
    })
}
