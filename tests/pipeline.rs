//! Pass pipeline integration tests.

mod common;

use common::{identity_module, identity_type, subs_for};
use silcore::{
    config::OptimizerConfig,
    ir::{
        apply_sites, verify_module, FunctionId, FunctionType, InsertPoint, Linkage, LoadQualifier,
        MethodDecl, Module, NominalDecl, ParamConvention, ParamInfo, Representation,
        ResultConvention, ResultInfo, StoreQualifier, SubstitutionMap, Type, VTable,
    },
    opt::{EventKind, ModulePass, PassContext, PassPipeline},
    Result,
};

/// `final class Counter { func next() -> Int64 }` whose implementation forwards a literal
/// through `identity<Int64>`, and `main` calling `next` through `class_method`.
fn counter_module() -> Result<(Module, FunctionId, FunctionId, FunctionId)> {
    let (mut module, identity) = identity_module()?;
    let counter = module
        .types_mut()
        .add_decl(NominalDecl::class("Counter").final_());
    let next = module.types_mut().add_method(MethodDecl::new("next", counter));
    let counter_ty = Type::nominal(counter);
    let method_ty = FunctionType::new(
        vec![ParamInfo::new(counter_ty.clone(), ParamConvention::DirectGuaranteed)],
        vec![ResultInfo::new(Type::int(64), ResultConvention::Owned)],
        Representation::Method,
    );

    let imp = module.create_function("Counter.next", method_ty.clone(), Linkage::Hidden)?;
    let entry = module.create_entry_block(imp);
    let mut b = module.builder_at(imp, InsertPoint::End(entry));
    let out = b.alloc_stack(Type::int(64));
    let input = b.alloc_stack(Type::int(64));
    let value = b.integer_literal(Type::int(64), 1);
    b.store(value, input, StoreQualifier::Trivial);
    let callee = b.function_ref(identity, identity_type());
    b.apply(callee, subs_for(Type::int(64)), vec![out, input], false);
    let result = b.load(out, LoadQualifier::Trivial);
    b.dealloc_stack(input);
    b.dealloc_stack(out);
    b.return_(result);
    module.add_vtable(VTable::new(counter).with_entry(next, imp))?;

    let main = module.create_function(
        "main",
        FunctionType::thin(vec![counter_ty.clone()], vec![Type::int(64)]),
        Linkage::Public,
    )?;
    let entry = module.create_entry_block(main);
    let receiver = module.function(main).arguments()[0];
    let mut b = module.builder_at(main, InsertPoint::End(entry));
    let method = b.class_method(receiver, next, method_ty);
    let call = b.apply(method, SubstitutionMap::new(), vec![receiver], false);
    let result = b.result(call);
    b.return_(result);

    Ok((module, identity, imp, main))
}

fn callee_of(module: &Module, caller: FunctionId) -> Option<FunctionId> {
    let func = module.function(caller);
    apply_sites(func).first()?.referenced_function(func)
}

#[test]
fn test_default_pipeline() -> Result<()> {
    let (mut module, identity, imp, main) = counter_module()?;
    let mut pipeline = PassPipeline::with_defaults(OptimizerConfig::default());
    let report = pipeline.run(&mut module)?;

    assert!(report.converged);
    assert!(report.iterations >= 2);
    assert_eq!(report.events.count_kind(EventKind::ClassMethodDevirtualized), 1);
    assert_eq!(report.events.count_kind(EventKind::FunctionSpecialized), 1);
    assert_eq!(report.events.count_kind(EventKind::CallSpecialized), 1);
    assert_eq!(report.events.devirtualized_count(), 1);
    assert!(report.events.filter_function(main).count() >= 1);
    assert!(!report.events.summary().is_empty());

    // Counter is final, so the argument's dynamic type is known.
    assert_eq!(callee_of(&module, main), Some(imp));
    let clone = callee_of(&module, imp).expect("direct call");
    assert_ne!(clone, identity);
    assert_eq!(module.ref_count(identity), 0);
    verify_module(&module)?;

    // Nothing is left to do.
    let again = pipeline.run(&mut module)?;
    assert!(!again.changed());
    assert_eq!(again.iterations, 1);
    Ok(())
}

/// Records how often it ran.
struct Probe {
    runs: usize,
}

impl ModulePass for Probe {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn description(&self) -> &'static str {
        "records pipeline rounds"
    }

    fn run(&mut self, _module: &mut Module, ctx: &mut PassContext) -> Result<bool> {
        self.runs += 1;
        ctx.events.info(format!("round {}", ctx.iteration()));
        Ok(false)
    }
}

#[test]
fn test_custom_pass_after_defaults() -> Result<()> {
    let (mut module, _, _, _) = counter_module()?;
    let mut pipeline = PassPipeline::with_defaults(OptimizerConfig::default());
    pipeline.add(Box::new(Probe { runs: 0 }));
    assert_eq!(
        pipeline.pass_names(),
        vec!["devirtualizer", "generic-specializer", "probe"]
    );

    let report = pipeline.run(&mut module)?;
    assert_eq!(
        report.events.count_kind(EventKind::Info),
        report.iterations
    );
    assert_eq!(
        report.events.count_kind(EventKind::PassStarted),
        3 * report.iterations
    );
    Ok(())
}
