//! Cloning generic functions for concrete substitutions.
//!
//! A specialization is a copy of a generic function with every type substituted. On top of
//! the substitution, parameters and results the generic function takes or returns by
//! address can be re-abstracted to be passed by value, which the concrete types allow when
//! they are loadable. [`ReabstractionInfo`] records which ones are converted and the
//! resulting signature; [`GenericCloner`] produces the copy; and
//! [`rewrite_apply_to_specialization`] redirects a call site to it.
//!
//! Inside the clone, a converted parameter lives in a stack slot initialized from the new
//! by-value argument, so the cloned body keeps addressing it as before. A converted result
//! is written into a slot and loaded at every `return`.

use crate::{
    ir::{
        ApplySite, BodySnapshot, Builder, FullApplySite, FunctionFlags, FunctionId, FunctionType,
        InsertPoint, InstId, IsSerialized, LoadQualifier, Module, Opcode, OwnershipKind,
        ParamConvention, Remapper, ResultConvention, SilType, StoreQualifier, SubstitutionMap,
        Type, TypeContext, TypeName, ValueId,
    },
    opt::local::{recursively_delete_trivially_dead_instructions, replace_dead_apply},
    Error, Result,
};

/// The signature change between a generic function and one of its specializations.
#[derive(Debug, Clone, PartialEq)]
pub struct ReabstractionInfo {
    subs: SubstitutionMap,
    substituted: FunctionType,
    specialized: FunctionType,
    /// One flag per parameter of the substituted type
    converted_params: Vec<bool>,
    /// One flag per result of the substituted type
    converted_results: Vec<bool>,
}

impl ReabstractionInfo {
    /// Describes the specialization of `orig_ty` for `subs` passing by value every indirect
    /// parameter and result whose substituted type is concrete and loadable.
    ///
    /// `inout` parameters are never converted.
    #[must_use]
    pub fn new(types: &TypeContext, orig_ty: &FunctionType, subs: SubstitutionMap) -> Self {
        let substituted = orig_ty.substituted(&subs);
        let loadable = |ty: &Type| !ty.has_generic_params() && types.is_loadable(ty);
        let converted_params = substituted
            .params
            .iter()
            .map(|p| is_convertible_param(p.convention) && loadable(&p.ty))
            .collect();
        let converted_results = substituted
            .results
            .iter()
            .map(|r| r.is_indirect() && loadable(&r.ty))
            .collect();
        Self::build(subs, substituted, converted_params, converted_results)
    }

    /// Describes the specialization of `orig_ty` for `subs` keeping every convention.
    #[must_use]
    pub fn identity(orig_ty: &FunctionType, subs: SubstitutionMap) -> Self {
        let substituted = orig_ty.substituted(&subs);
        let converted_params = vec![false; substituted.params.len()];
        let converted_results = vec![false; substituted.results.len()];
        Self::build(subs, substituted, converted_params, converted_results)
    }

    /// Describes the specialization of `orig_ty` for `subs` with explicit flags, one per
    /// parameter and one per result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReabstraction`] if a flag list does not match the signature,
    /// or a flag selects a direct result, a direct parameter or an `inout` parameter.
    pub fn with_flags(
        orig_ty: &FunctionType,
        subs: SubstitutionMap,
        params: Vec<bool>,
        results: Vec<bool>,
    ) -> Result<Self> {
        let substituted = orig_ty.substituted(&subs);
        if params.len() != substituted.params.len() {
            return Err(Error::InvalidReabstraction(format!(
                "{} parameter flags for {} parameters",
                params.len(),
                substituted.params.len()
            )));
        }
        if results.len() != substituted.results.len() {
            return Err(Error::InvalidReabstraction(format!(
                "{} result flags for {} results",
                results.len(),
                substituted.results.len()
            )));
        }
        for (index, (param, flag)) in substituted.params.iter().zip(&params).enumerate() {
            if *flag && !is_convertible_param(param.convention) {
                return Err(Error::InvalidReabstraction(format!(
                    "parameter {index} ({:?}) cannot be passed by value",
                    param.convention
                )));
            }
        }
        for (index, (result, flag)) in substituted.results.iter().zip(&results).enumerate() {
            if *flag && !result.is_indirect() {
                return Err(Error::InvalidReabstraction(format!(
                    "result {index} is already direct"
                )));
            }
        }
        Ok(Self::build(subs, substituted, params, results))
    }

    fn build(
        subs: SubstitutionMap,
        substituted: FunctionType,
        converted_params: Vec<bool>,
        converted_results: Vec<bool>,
    ) -> Self {
        let mut specialized = substituted.clone();
        for (param, converted) in specialized.params.iter_mut().zip(&converted_params) {
            if *converted {
                if let Some(direct) = param.convention.direct_equivalent() {
                    param.convention = direct;
                }
            }
        }
        for (result, converted) in specialized.results.iter_mut().zip(&converted_results) {
            if *converted {
                result.convention = ResultConvention::Owned;
            }
        }
        Self {
            subs,
            substituted,
            specialized,
            converted_params,
            converted_results,
        }
    }

    /// Returns the substitutions the specialization is made for.
    #[must_use]
    pub const fn substitutions(&self) -> &SubstitutionMap {
        &self.subs
    }

    /// Returns the substituted type of the generic function.
    #[must_use]
    pub const fn substituted_type(&self) -> &FunctionType {
        &self.substituted
    }

    /// Returns the signature of the specialization.
    #[must_use]
    pub const fn specialized_type(&self) -> &FunctionType {
        &self.specialized
    }

    /// Returns `true` if parameter `index` is passed by value in the specialization.
    #[must_use]
    pub fn is_param_converted(&self, index: usize) -> bool {
        self.converted_params.get(index).copied().unwrap_or(false)
    }

    /// Returns `true` if result `index` is returned by value in the specialization.
    #[must_use]
    pub fn is_result_converted(&self, index: usize) -> bool {
        self.converted_results.get(index).copied().unwrap_or(false)
    }

    /// Returns `true` if some indirect result is returned by value.
    #[must_use]
    pub fn converts_results(&self) -> bool {
        self.converted_results.contains(&true)
    }

    /// Returns `true` if any convention changes.
    #[must_use]
    pub fn has_conversions(&self) -> bool {
        self.converts_results() || self.converted_params.contains(&true)
    }
}

fn is_convertible_param(convention: ParamConvention) -> bool {
    convention.is_indirect()
        && convention
            .direct_equivalent()
            .is_some_and(|direct| !direct.is_indirect())
}

/// Returns the name of the specialization of `orig` described by `info`.
///
/// The name lists the replacement types, and for re-abstracted specializations one letter
/// per parameter and then per result: `d` for by value, `i` for unchanged.
///
/// ```text
/// identity<Int64>_dd
/// ```
#[must_use]
pub fn mangle_specialization(types: &TypeContext, orig: &str, info: &ReabstractionInfo) -> String {
    let args: Vec<String> = info
        .subs
        .replacement_types()
        .map(|ty| TypeName::new(types, ty).to_string())
        .collect();
    let mut name = format!("{orig}<{}>", args.join(", "));
    if info.has_conversions() {
        name.push('_');
        for converted in info.converted_params.iter().chain(&info.converted_results) {
            name.push(if *converted { 'd' } else { 'i' });
        }
    }
    name
}

/// Produces specialized copies of generic functions.
///
/// # Examples
///
/// ```rust,ignore
/// use silcore::opt::{GenericCloner, ReabstractionInfo};
///
/// let info = ReabstractionInfo::new(module.types(), module.function(id).lowered_type(), subs);
/// let clone = GenericCloner::clone_function(
///     &mut module,
///     id,
///     &info,
///     "identity<Int64>_dd",
///     IsSerialized::NotSerialized,
/// )?;
/// ```
pub struct GenericCloner;

impl GenericCloner {
    /// Creates the function `name` as a copy of `orig` specialized by `info`.
    ///
    /// The clone gets the specialized signature, the specialization linkage of `orig` and
    /// the fragility `serialized`. Blocks keep their topology and terminator kinds; only the
    /// entry block and the function exits gain the stack slots of converted parameters and
    /// results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReabstraction`] if `info` was computed for another signature,
    /// and [`Error::DuplicateFunction`] if `name` is taken.
    ///
    /// # Panics
    ///
    /// Panics if `orig` is a global initializer or has no body, or if `serialized` is more
    /// fragile than `orig`.
    pub fn clone_function(
        module: &mut Module,
        orig: FunctionId,
        info: &ReabstractionInfo,
        name: &str,
        serialized: IsSerialized,
    ) -> Result<FunctionId> {
        let source = module.function(orig);
        assert!(
            !source.is_global_init(),
            "cannot specialize global initializer @{}",
            source.name()
        );
        assert!(
            serialized <= source.serialized(),
            "clone of @{} cannot be more fragile than its source",
            source.name()
        );
        assert!(source.is_definition(), "@{} has no body", source.name());
        if source.lowered_type().substituted(&info.subs) != info.substituted {
            return Err(Error::InvalidReabstraction(format!(
                "signature does not match @{}",
                source.name()
            )));
        }

        let body = BodySnapshot::capture(source);
        let orig_args = source.arguments().to_vec();
        let linkage = source.linkage().for_specialization();
        let flags = source.flags() & (FunctionFlags::TRANSPARENT | FunctionFlags::ALWAYS_INLINE);
        let orig_name = source.name().to_string();

        let clone = module.create_function(name, info.specialized.clone(), linkage)?;
        let entry = module.create_entry_block(clone);
        let func = module.function_mut(clone);
        func.set_serialized(serialized);
        func.insert_flags(flags);

        let mut remap = Remapper::new(info.subs.clone());
        let mut b = module.builder_at(clone, InsertPoint::End(entry));
        let mut new_args = b.function().arguments().to_vec().into_iter();
        let mut orig_args = orig_args.into_iter();
        let mut slots = Vec::new();
        let mut result_slots = Vec::new();

        // Indirect results come first in argument order.
        for (result, converted) in info.substituted.results.iter().zip(&info.converted_results) {
            if !result.is_indirect() {
                continue;
            }
            let Some(orig_arg) = orig_args.next() else {
                break;
            };
            if *converted {
                let slot = b.alloc_stack(result.ty.clone());
                slots.push(slot);
                result_slots.push(slot);
                remap.map_value(orig_arg, slot);
            } else if let Some(arg) = new_args.next() {
                remap.map_value(orig_arg, arg);
            }
        }
        for (param, converted) in info.substituted.params.iter().zip(&info.converted_params) {
            let (Some(orig_arg), Some(arg)) = (orig_args.next(), new_args.next()) else {
                break;
            };
            if *converted {
                let slot = b.alloc_stack(param.ty.clone());
                let qualifier = if b.types().is_trivial(&param.ty) {
                    StoreQualifier::Trivial
                } else {
                    StoreQualifier::Init
                };
                b.store(arg, slot, qualifier);
                slots.push(slot);
                remap.map_value(orig_arg, slot);
            } else {
                remap.map_value(orig_arg, arg);
            }
        }

        let blocks = b.clone_body(&body, entry, &mut remap);
        if !slots.is_empty() {
            let exits: Vec<InstId> = blocks
                .iter()
                .filter_map(|block| b.function().terminator(*block))
                .filter(|t| {
                    matches!(
                        b.function().inst(*t).opcode(),
                        Opcode::Return | Opcode::Throw | Opcode::Unwind
                    )
                })
                .collect();
            for exit in exits {
                rewrite_exit(&mut b, exit, info, &result_slots, &slots);
            }
        }
        log::debug!("specialized @{orig_name} as @{name}");
        Ok(clone)
    }
}

/// Releases the stack slots before a function exit, and turns a `return` of the generic
/// function into a return of the direct results.
fn rewrite_exit(
    b: &mut Builder<'_>,
    exit: InstId,
    info: &ReabstractionInfo,
    result_slots: &[ValueId],
    slots: &[ValueId],
) {
    b.position_before(exit);
    let is_return = b.function().inst(exit).opcode() == Opcode::Return;
    let mut loaded = Vec::with_capacity(result_slots.len());
    if is_return {
        for slot in result_slots {
            let qualifier = load_qualifier(b.types(), b.function().value_type(*slot), true);
            loaded.push(b.load(*slot, qualifier));
        }
    }
    for slot in slots.iter().rev() {
        b.dealloc_stack(*slot);
    }
    if !is_return || result_slots.is_empty() {
        return;
    }

    let old_value = b.function().inst(exit).operand(0);
    let direct_count = info.substituted.direct_results().count();
    let mut direct = split_results(b, old_value, direct_count).into_iter();
    let mut loaded = loaded.into_iter();
    let components = info
        .substituted
        .results
        .iter()
        .zip(&info.converted_results)
        .filter_map(|(result, converted)| {
            if *converted {
                loaded.next()
            } else if result.is_indirect() {
                None
            } else {
                direct.next()
            }
        })
        .collect();
    let value = pack_results(b, components);
    b.return_(value);
    b.erase(exit);
    if let Some(def) = b.function().defining_inst(old_value) {
        recursively_delete_trivially_dead_instructions(b, &[def], false, |_| {});
    }
}

fn load_qualifier(types: &TypeContext, addr_ty: &SilType, take: bool) -> LoadQualifier {
    if types.is_trivial(addr_ty.ty()) {
        LoadQualifier::Trivial
    } else if take {
        LoadQualifier::Take
    } else {
        LoadQualifier::Copy
    }
}

fn store_qualifier(types: &TypeContext, ty: &SilType) -> StoreQualifier {
    if types.is_trivial(ty.ty()) {
        StoreQualifier::Trivial
    } else {
        StoreQualifier::Init
    }
}

/// Splits the value of a call into its `count` direct results.
fn split_results(b: &mut Builder<'_>, value: ValueId, count: usize) -> Vec<ValueId> {
    match count {
        0 => Vec::new(),
        1 => vec![value],
        _ => (0..count)
            .map(|i| b.tuple_extract(value, i as u32))
            .collect(),
    }
}

/// Forms the value of a call from its direct results.
fn pack_results(b: &mut Builder<'_>, mut values: Vec<ValueId>) -> ValueId {
    if values.len() == 1 {
        values.remove(0)
    } else {
        b.tuple(values)
    }
}

/// Redirects a call of a generic function to its specialization `clone` described by
/// `info`.
///
/// Arguments passed by address to converted parameters are loaded before the call, and
/// converted results are stored into the addresses the caller provided. A `try_apply`
/// returning converted results gets a new normal block performing the stores.
///
/// # Returns
///
/// The new call, or `None` if the call does not match the shape `info` describes.
pub fn rewrite_apply_to_specialization(
    module: &mut Module,
    caller: FunctionId,
    site: FullApplySite,
    clone: FunctionId,
    info: &ReabstractionInfo,
) -> Option<ApplySite> {
    let func = module.function(caller);
    let args = site.arguments(func).to_vec();
    if args.len() != info.substituted.argument_types().len() {
        return None;
    }
    let clone_ty = module.function(clone).lowered_type().clone();
    let subs = if clone_ty.is_polymorphic() {
        site.substitutions(func).clone()
    } else {
        SubstitutionMap::new()
    };
    let nonthrowing = site.is_nonthrowing(func);
    let successors = site
        .normal_block(func)
        .zip(site.error_block(func))
        .zip(func.inst(site.inst()).parent());
    let new_result_ty = info.specialized.result_type();

    let mut b = module.builder_at(caller, InsertPoint::Before(site.inst()));
    let callee = b.function_ref(clone, clone_ty);
    let mut args = args.into_iter();
    let mut new_args = Vec::new();
    let mut result_addrs = Vec::new();
    for (result, converted) in info.substituted.results.iter().zip(&info.converted_results) {
        if !result.is_indirect() {
            continue;
        }
        let addr = args.next()?;
        if *converted {
            result_addrs.push(addr);
        } else {
            new_args.push(addr);
        }
    }
    for (param, converted) in info.substituted.params.iter().zip(&info.converted_params) {
        let arg = args.next()?;
        if *converted {
            let take = param.convention == ParamConvention::IndirectIn;
            let qualifier = load_qualifier(b.types(), b.function().value_type(arg), take);
            new_args.push(b.load(arg, qualifier));
        } else {
            new_args.push(arg);
        }
    }

    match successors {
        None => {
            let call = b.apply(callee, subs, new_args, nonthrowing);
            let new_site = ApplySite::new(b.function(), call)?;
            let result = b.result(call);
            let result = store_converted_results(&mut b, result, info, &result_addrs);
            replace_dead_apply(&mut b, site.site(), Some(result), |_| {});
            Some(new_site)
        }
        Some(((normal, error), call_block)) => {
            let target = if result_addrs.is_empty() {
                normal
            } else {
                let block = b.function_mut().create_block_after(call_block);
                let ownership = if b.types().is_trivial(new_result_ty.ty()) {
                    OwnershipKind::Trivial
                } else {
                    OwnershipKind::Owned
                };
                b.function_mut()
                    .add_block_arg(block, new_result_ty.clone(), ownership);
                block
            };
            let call = b.try_apply(callee, subs, new_args, target, error);
            let new_site = ApplySite::new(b.function(), call)?;
            if target != normal {
                b.position_at_end(target);
                let result = b.function().block_args(target)[0];
                let result = store_converted_results(&mut b, result, info, &result_addrs);
                b.branch(normal, vec![result]);
            }
            replace_dead_apply(&mut b, site.site(), None, |_| {});
            Some(new_site)
        }
    }
}

/// Stores the converted results out of the value of a specialized call and returns the
/// value the generic call produced.
fn store_converted_results(
    b: &mut Builder<'_>,
    value: ValueId,
    info: &ReabstractionInfo,
    result_addrs: &[ValueId],
) -> ValueId {
    if result_addrs.is_empty() {
        return value;
    }
    let count = info.specialized.direct_results().count();
    let mut components = split_results(b, value, count).into_iter();
    let mut addrs = result_addrs.iter();
    let mut orig = Vec::new();
    for (result, converted) in info.substituted.results.iter().zip(&info.converted_results) {
        if *converted {
            let (Some(component), Some(addr)) = (components.next(), addrs.next()) else {
                break;
            };
            let ty = b.function().value_type(component).clone();
            let qualifier = store_qualifier(b.types(), &ty);
            b.store(component, *addr, qualifier);
        } else if !result.is_indirect() {
            if let Some(component) = components.next() {
                orig.push(component);
            }
        }
    }
    pack_results(b, orig)
}
