//! Module pass specializing calls of generic functions.

use std::collections::HashMap;

use crate::{
    analysis::BottomUpFunctionOrder,
    config::OptimizerConfig,
    ir::{
        full_apply_sites, FullApplySite, FunctionId, IsSerialized, Linkage, Module,
        SpecializationKind, SubstitutionMap,
    },
    opt::{
        events::{EventKind, EventLog},
        pass::{ModulePass, PassContext},
        specialize::{
            mangle_specialization, rewrite_apply_to_specialization, GenericCloner,
            ReabstractionInfo,
        },
    },
    Result,
};

/// A call worth specializing.
struct Candidate {
    site: FullApplySite,
    callee: FunctionId,
    subs: SubstitutionMap,
}

/// Clones generic functions for the concrete substitutions they are called with and
/// redirects the calls to the clones.
///
/// Clones are shared by every caller using the same substitutions. Requested
/// specializations of functions carrying `@_specialize` attributes are created up front.
#[derive(Debug, Default)]
pub struct GenericSpecializer {
    /// Clones created by this pass, keyed by mangled name
    clones: HashMap<String, FunctionId>,
}

impl GenericSpecializer {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of clones created so far.
    #[must_use]
    pub fn clone_count(&self) -> usize {
        self.clones.len()
    }

    /// Returns the clone called `name`, creating it from `orig` if needed.
    ///
    /// The returned flag is `true` if the clone is new.
    fn get_or_create(
        &mut self,
        module: &mut Module,
        orig: FunctionId,
        info: &ReabstractionInfo,
        name: &str,
        caller_serialized: Option<IsSerialized>,
    ) -> Result<(FunctionId, bool)> {
        if let Some(&clone) = self.clones.get(name) {
            if module.is_live(clone) {
                return Ok((clone, false));
            }
        }
        if let Some(existing) = module.lookup_function(name) {
            self.clones.insert(name.to_owned(), existing);
            return Ok((existing, false));
        }
        let source = module.function(orig).serialized();
        let serialized = caller_serialized.map_or(source, |caller| caller.min(source));
        let clone = GenericCloner::clone_function(module, orig, info, name, serialized)?;
        self.clones.insert(name.to_owned(), clone);
        Ok((clone, true))
    }

    /// Creates the specializations requested by attributes.
    fn specialize_requested(&mut self, module: &mut Module, events: &EventLog) -> Result<bool> {
        let mut changed = false;
        let requests: Vec<_> = module
            .functions()
            .flat_map(|f| {
                module
                    .function(f)
                    .specialize_attrs()
                    .iter()
                    .map(move |attr| (f, attr.clone()))
            })
            .collect();

        for (orig, attr) in requests {
            let func = module.function(orig);
            if attr.kind == SpecializationKind::Partial || !attr.subs.is_concrete() {
                log::trace!("skipping partial or generic request on @{}", func.name());
                continue;
            }
            if !func.is_definition() || func.is_global_init() {
                continue;
            }
            let info = ReabstractionInfo::new(module.types(), func.lowered_type(), attr.subs);
            let name = mangle_specialization(module.types(), func.name(), &info);
            let (clone, created) = self.get_or_create(module, orig, &info, &name, None)?;
            if attr.exported {
                module.function_mut(clone).set_linkage(Linkage::Public);
            }
            if created {
                log::debug!("created requested specialization @{name}");
                events
                    .record(EventKind::FunctionSpecialized)
                    .function(clone)
                    .pass(self.name())
                    .message(format!("requested specialization @{name}"));
                changed = true;
            }
        }
        Ok(changed)
    }

    fn candidates(module: &Module, caller: FunctionId) -> Vec<Candidate> {
        let func = module.function(caller);
        full_apply_sites(func)
            .into_iter()
            .filter_map(|site| {
                let callee = site.site().referenced_function(func)?;
                let subs = site.substitutions(func);
                if subs.is_empty() || !subs.is_concrete() {
                    return None;
                }
                let target = module.function(callee);
                if !target.is_definition() || target.generic_sig().is_none() {
                    return None;
                }
                if target.is_global_init() || !target.should_optimize() {
                    log::trace!("not specializing @{}: opted out", target.name());
                    return None;
                }
                if func.is_serialized() && !target.is_serialized() {
                    log::trace!(
                        "not specializing @{} in serialized @{}",
                        target.name(),
                        func.name()
                    );
                    return None;
                }
                Some(Candidate {
                    site,
                    callee,
                    subs: subs.clone(),
                })
            })
            .collect()
    }
}

impl ModulePass for GenericSpecializer {
    fn name(&self) -> &'static str {
        "generic-specializer"
    }

    fn description(&self) -> &'static str {
        "Clones generic functions for the concrete types they are called with"
    }

    fn is_enabled(&self, config: &OptimizerConfig) -> bool {
        config.enable_specialization
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<bool> {
        let events = EventLog::new();
        let mut changed = self.specialize_requested(module, &events)?;
        let limit = ctx.config.max_specializations_per_function;

        for caller in BottomUpFunctionOrder::new(module).functions() {
            let func = module.function(caller);
            if !func.is_definition() || !func.should_optimize() {
                continue;
            }
            let caller_serialized = func.serialized();
            let mut created_here = 0;

            for candidate in Self::candidates(module, caller) {
                let callee = module.function(candidate.callee);
                let info = ReabstractionInfo::new(
                    module.types(),
                    callee.lowered_type(),
                    candidate.subs,
                );
                let name = mangle_specialization(module.types(), callee.name(), &info);
                if !self.clones.contains_key(&name)
                    && module.lookup_function(&name).is_none()
                    && created_here >= limit
                {
                    log::debug!(
                        "specialization limit reached in @{}",
                        module.function(caller).name()
                    );
                    break;
                }
                let (clone, created) = self.get_or_create(
                    module,
                    candidate.callee,
                    &info,
                    &name,
                    Some(caller_serialized),
                )?;
                if created {
                    created_here += 1;
                    events
                        .record(EventKind::FunctionSpecialized)
                        .function(clone)
                        .pass(self.name())
                        .message(format!("created @{name}"));
                }
                let Some(new_site) =
                    rewrite_apply_to_specialization(module, caller, candidate.site, clone, &info)
                else {
                    log::trace!("call shape does not match @{name}");
                    continue;
                };
                log::debug!(
                    "specialized call in @{} -> @{name}",
                    module.function(caller).name()
                );
                events
                    .record(EventKind::CallSpecialized)
                    .at(caller, new_site.inst())
                    .pass(self.name())
                    .message(format!("call now targets @{name}"));
                changed = true;
            }
        }

        ctx.events.merge(&events);
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{
            apply_sites, verify_function, FunctionFlags, Opcode, SpecializeAttr,
        },
        test::fixtures::{define_identity, identity_caller, int_subs, simple_module},
    };

    fn run(pass: &mut GenericSpecializer, module: &mut Module) -> (bool, EventLog) {
        let mut ctx = PassContext::new(OptimizerConfig::default());
        let changed = pass.run(module, &mut ctx).unwrap();
        (changed, ctx.events)
    }

    fn callee_of(module: &Module, caller: FunctionId) -> Option<FunctionId> {
        let func = module.function(caller);
        apply_sites(func)[0].referenced_function(func)
    }

    #[test]
    fn test_specializes_and_shares_clones() {
        let (mut module, _) = simple_module();
        let id = define_identity(&mut module);
        let (a, _) = identity_caller(&mut module, "a", id);
        let (b, _) = identity_caller(&mut module, "b", id);

        let mut pass = GenericSpecializer::new();
        let (changed, events) = run(&mut pass, &mut module);
        assert!(changed);
        assert_eq!(pass.clone_count(), 1);
        assert_eq!(events.count_kind(EventKind::FunctionSpecialized), 1);
        assert_eq!(events.count_kind(EventKind::CallSpecialized), 2);

        let clone = callee_of(&module, a).unwrap();
        assert_ne!(clone, id);
        assert_eq!(callee_of(&module, b), Some(clone));
        assert_eq!(module.ref_count(id), 0);
        assert_eq!(module.function(clone).linkage(), Linkage::Shared);
        assert!(!module.function(clone).lowered_type().is_polymorphic());
        for f in [a, b, clone] {
            verify_function(&module, f).unwrap();
        }

        let (changed, _) = run(&mut pass, &mut module);
        assert!(!changed);
    }

    #[test]
    fn test_skips_opted_out_callee() {
        let (mut module, _) = simple_module();
        let id = define_identity(&mut module);
        module.function_mut(id).insert_flags(FunctionFlags::NO_OPTIMIZE);
        let (a, _) = identity_caller(&mut module, "a", id);
        let (changed, _) = run(&mut GenericSpecializer::new(), &mut module);
        assert!(!changed);
        assert_eq!(callee_of(&module, a), Some(id));
    }

    #[test]
    fn test_serialized_caller_needs_serialized_callee() {
        let (mut module, _) = simple_module();
        let id = define_identity(&mut module);
        let (a, _) = identity_caller(&mut module, "a", id);
        module.function_mut(a).set_serialized(IsSerialized::Serialized);
        assert!(!run(&mut GenericSpecializer::new(), &mut module).0);

        module.function_mut(id).set_serialized(IsSerialized::Serialized);
        assert!(run(&mut GenericSpecializer::new(), &mut module).0);
        let clone = callee_of(&module, a).unwrap();
        assert_eq!(module.function(clone).serialized(), IsSerialized::Serialized);
    }

    #[test]
    fn test_requested_specialization() {
        let (mut module, _) = simple_module();
        let id = define_identity(&mut module);
        module.function_mut(id).add_specialize_attr(SpecializeAttr {
            subs: int_subs(),
            exported: true,
            kind: SpecializationKind::Full,
        });
        let mut pass = GenericSpecializer::new();
        let (changed, events) = run(&mut pass, &mut module);
        assert!(changed);
        assert_eq!(events.count_kind(EventKind::FunctionSpecialized), 1);
        assert!(!events.has(EventKind::CallSpecialized));

        let clone = module
            .functions()
            .find(|f| module.function(*f).name().starts_with("identity<"))
            .unwrap();
        let func = module.function(clone);
        assert_eq!(func.linkage(), Linkage::Public);
        let last = func.instructions().last().map(|(_, i)| func.inst(i).opcode());
        assert_eq!(last, Some(Opcode::Return));
    }
}
