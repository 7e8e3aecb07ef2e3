//! Generic specialization integration tests.

mod common;

use common::{identity_caller, identity_module, subs_for};
use silcore::{
    config::OptimizerConfig,
    ir::{
        apply_sites, verify_function, FunctionId, IsSerialized, Linkage, Module, Opcode,
        ParamConvention, ResultConvention, SpecializationKind, SpecializeAttr, Type,
    },
    opt::{
        mangle_specialization, EventKind, GenericCloner, GenericSpecializer, PassPipeline,
        ReabstractionInfo,
    },
    Error, Result,
};

fn callee_of(module: &Module, caller: FunctionId) -> Option<FunctionId> {
    let func = module.function(caller);
    apply_sites(func).first()?.referenced_function(func)
}

fn specializer_only() -> PassPipeline {
    let mut pipeline = PassPipeline::new(OptimizerConfig::default());
    pipeline.add(Box::new(GenericSpecializer::new()));
    pipeline
}

#[test]
fn test_one_clone_per_substitution() -> Result<()> {
    let (mut module, identity) = identity_module()?;
    let (a, _) = identity_caller(&mut module, "a", identity, 64)?;
    let (b, _) = identity_caller(&mut module, "b", identity, 64)?;
    let (c, _) = identity_caller(&mut module, "c", identity, 32)?;

    let report = specializer_only().run(&mut module)?;
    assert!(report.converged);
    assert_eq!(report.events.count_kind(EventKind::FunctionSpecialized), 2);
    assert_eq!(report.events.count_kind(EventKind::CallSpecialized), 3);

    let for_64 = callee_of(&module, a).expect("direct call");
    let for_32 = callee_of(&module, c).expect("direct call");
    assert_eq!(callee_of(&module, b), Some(for_64));
    assert_ne!(for_64, for_32);
    assert_eq!(module.ref_count(identity), 0);

    let clone = module.function(for_64);
    assert!(clone.name().starts_with("identity<"));
    assert_eq!(clone.linkage(), Linkage::Shared);
    let ty = clone.lowered_type();
    assert!(!ty.is_polymorphic());
    assert_eq!(ty.params[0].convention, ParamConvention::DirectOwned);
    assert_eq!(ty.results[0].convention, ResultConvention::Owned);

    for f in [a, b, c, for_64, for_32] {
        verify_function(&module, f)?;
    }
    Ok(())
}

#[test]
fn test_clone_with_explicit_conversions() -> Result<()> {
    let (mut module, identity) = identity_module()?;
    let orig_ty = module.function(identity).lowered_type().clone();
    let info = ReabstractionInfo::with_flags(&orig_ty, subs_for(Type::int(8)), vec![true], vec![false])?;
    let name = mangle_specialization(module.types(), "identity", &info);
    let clone =
        GenericCloner::clone_function(&mut module, identity, &info, &name, IsSerialized::NotSerialized)?;

    let func = module.function(clone);
    let ty = func.lowered_type();
    assert_eq!(ty.params[0].convention, ParamConvention::DirectOwned);
    assert_eq!(ty.results[0].convention, ResultConvention::Indirect);
    // The converted parameter is stored into a stack slot the body copies from.
    let opcodes: Vec<Opcode> = func
        .instructions()
        .map(|(_, i)| func.inst(i).opcode())
        .collect();
    assert_eq!(opcodes.first(), Some(&Opcode::AllocStack));
    assert!(opcodes.contains(&Opcode::Store));
    assert!(opcodes.contains(&Opcode::CopyAddr));
    assert!(opcodes.contains(&Opcode::DeallocStack));
    verify_function(&module, clone)?;

    assert!(matches!(
        GenericCloner::clone_function(&mut module, identity, &info, &name, IsSerialized::NotSerialized),
        Err(Error::DuplicateFunction(_))
    ));
    Ok(())
}

#[test]
fn test_requested_specialization_is_exported() -> Result<()> {
    let (mut module, identity) = identity_module()?;
    module.function_mut(identity).add_specialize_attr(SpecializeAttr {
        subs: subs_for(Type::int(16)),
        exported: true,
        kind: SpecializationKind::Full,
    });
    module.function_mut(identity).add_specialize_attr(SpecializeAttr {
        subs: subs_for(Type::int(32)),
        exported: false,
        kind: SpecializationKind::Partial,
    });

    let report = specializer_only().run(&mut module)?;
    assert_eq!(report.events.count_kind(EventKind::FunctionSpecialized), 1);
    let clones: Vec<FunctionId> = module
        .functions()
        .filter(|f| *f != identity)
        .collect();
    assert_eq!(clones.len(), 1);
    assert_eq!(module.function(clones[0]).linkage(), Linkage::Public);
    verify_function(&module, clones[0])?;
    Ok(())
}

#[test]
fn test_disabled_specialization() -> Result<()> {
    let (mut module, identity) = identity_module()?;
    let (a, _) = identity_caller(&mut module, "a", identity, 64)?;
    let report = PassPipeline::with_defaults(OptimizerConfig::disabled()).run(&mut module)?;
    assert!(!report.changed());
    assert_eq!(report.iterations, 1);
    assert_eq!(callee_of(&module, a), Some(identity));
    Ok(())
}
