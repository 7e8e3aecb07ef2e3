//! Module pass replacing dynamic dispatch by direct calls.

use crate::{
    analysis::{BottomUpFunctionOrder, ClassHierarchyAnalysis},
    config::OptimizerConfig,
    ir::{apply_sites, ApplySite, Function, Module, Opcode},
    opt::{
        devirtualize::{try_devirtualize, DispatchKind},
        events::{EventKind, EventLog},
        pass::{ModulePass, PassContext},
    },
    Result,
};

/// Devirtualizes `class_method`, `super_method` and `witness_method` calls.
///
/// Functions are visited callees first. The class hierarchy is computed once per run;
/// devirtualization never changes it.
#[derive(Debug, Default)]
pub struct Devirtualizer;

impl Devirtualizer {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn is_candidate(func: &Function, site: ApplySite, config: &OptimizerConfig) -> bool {
    let Some(kind) = func.defining_kind(site.callee(func)) else {
        return false;
    };
    match kind.opcode() {
        Opcode::ClassMethod | Opcode::SuperMethod => config.enable_class_devirtualization,
        Opcode::WitnessMethod => config.enable_witness_devirtualization,
        _ => false,
    }
}

const fn event_kind(kind: DispatchKind) -> EventKind {
    match kind {
        DispatchKind::ClassMethod => EventKind::ClassMethodDevirtualized,
        DispatchKind::SuperMethod => EventKind::SuperMethodDevirtualized,
        DispatchKind::WitnessMethod => EventKind::WitnessMethodDevirtualized,
    }
}

impl ModulePass for Devirtualizer {
    fn name(&self) -> &'static str {
        "devirtualizer"
    }

    fn description(&self) -> &'static str {
        "Replaces class and witness method dispatch by direct calls"
    }

    fn is_enabled(&self, config: &OptimizerConfig) -> bool {
        config.any_devirtualization()
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<bool> {
        let cha = ClassHierarchyAnalysis::new(module);
        let order = BottomUpFunctionOrder::new(module);
        let events = EventLog::new();
        let mut changed = false;

        for caller in order.functions() {
            let func = module.function(caller);
            if !func.is_definition() || !func.should_optimize() {
                continue;
            }
            let sites: Vec<ApplySite> = apply_sites(func)
                .into_iter()
                .filter(|site| is_candidate(func, *site, &ctx.config))
                .collect();

            for site in sites {
                // An earlier rewrite may have erased the call.
                if !module.function(caller).contains_inst(site.inst()) {
                    continue;
                }
                let Some(done) = try_devirtualize(module, caller, site, Some(&cha)) else {
                    continue;
                };
                let kind: &'static str = done.kind.into();
                events
                    .record(event_kind(done.kind))
                    .at(caller, done.site.inst())
                    .pass(self.name())
                    .message(format!(
                        "{kind} in @{} now calls @{}",
                        module.function(caller).name(),
                        module.function(done.target).name()
                    ));
                events
                    .record(EventKind::InstructionRemoved)
                    .function(caller)
                    .count(done.removed)
                    .pass(self.name());
                changed = true;
            }
        }

        if changed {
            log::info!(
                "devirtualized {} call(s)",
                events.devirtualized_count()
            );
        }
        ctx.events.merge(&events);
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ModuleOptions,
        ir::verify_module,
        test::fixtures::{ClassFixture, ProtocolFixture},
    };

    fn run(module: &mut Module, config: OptimizerConfig) -> (bool, EventLog) {
        let mut ctx = PassContext::new(config);
        let changed = Devirtualizer::new().run(module, &mut ctx).unwrap();
        (changed, ctx.events)
    }

    #[test]
    fn test_devirtualizes_known_receivers() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), false);
        let (on_leaf, _) = fx.caller_on_alloc("on_leaf", fx.leaf);
        let (on_arg, _) = fx.caller_on_argument("on_arg");

        let (changed, events) = run(&mut fx.module, OptimizerConfig::default());
        assert!(changed);
        assert_eq!(events.count_kind(EventKind::ClassMethodDevirtualized), 1);
        assert!(events.has(EventKind::InstructionRemoved));
        verify_module(&fx.module).unwrap();

        let func = fx.module.function(on_leaf);
        let site = apply_sites(func)[0];
        assert_eq!(site.referenced_function(func), Some(fx.leaf_impl));

        // Leaf overrides get, so an arbitrary Base stays dynamic.
        let func = fx.module.function(on_arg);
        let site = apply_sites(func)[0];
        assert_eq!(site.referenced_function(func), None);
    }

    #[test]
    fn test_second_run_is_a_fixpoint() {
        let mut fx = ClassFixture::new(ModuleOptions::default(), false);
        fx.caller_on_alloc("on_leaf", fx.leaf);
        assert!(run(&mut fx.module, OptimizerConfig::default()).0);
        let (changed, events) = run(&mut fx.module, OptimizerConfig::default());
        assert!(!changed);
        assert!(events.is_empty());
    }

    #[test]
    fn test_respects_config() {
        let mut fx = ProtocolFixture::new();
        fx.caller("caller");
        let config = OptimizerConfig {
            enable_witness_devirtualization: false,
            ..OptimizerConfig::default()
        };
        assert!(!run(&mut fx.module, config).0);

        let (changed, events) = run(&mut fx.module, OptimizerConfig::default());
        assert!(changed);
        assert_eq!(events.count_kind(EventKind::WitnessMethodDevirtualized), 1);
        assert!(!Devirtualizer::new().is_enabled(&OptimizerConfig::disabled()));
    }
}
