//! Module builders shared by the optimizer integration tests.

#![allow(dead_code)]

use silcore::{
    config::ModuleOptions,
    ir::{
        FunctionId, FunctionType, GenericParamKey, GenericSignature, InsertPoint, InstId,
        LoadQualifier, Linkage, Module, ParamConvention, ParamInfo, Representation,
        ResultConvention, ResultInfo, StoreQualifier, SubstitutionMap, Type, TypeContext,
    },
    Result,
};

/// `<T>(@in T) -> @out T`
pub fn identity_type() -> FunctionType {
    FunctionType::new(
        vec![ParamInfo::new(Type::param(0, 0), ParamConvention::IndirectIn)],
        vec![ResultInfo::new(Type::param(0, 0), ResultConvention::Indirect)],
        Representation::Thin,
    )
    .with_generic_sig(GenericSignature::with_depths(&[1]))
}

/// `T := ty`
pub fn subs_for(ty: Type) -> SubstitutionMap {
    SubstitutionMap::from_pairs([(GenericParamKey::new(0, 0), ty)])
}

/// A module containing the generic `identity` function.
pub fn identity_module() -> Result<(Module, FunctionId)> {
    let mut module = Module::new("generics", TypeContext::new(), ModuleOptions::default());
    let id = module.create_function("identity", identity_type(), Linkage::Public)?;
    let entry = module.create_entry_block(id);
    let args = module.function(id).arguments().to_vec();
    let mut b = module.builder_at(id, InsertPoint::End(entry));
    b.copy_addr(args[1], args[0], true, true);
    let unit = b.tuple(vec![]);
    b.return_(unit);
    Ok((module, id))
}

/// `name() -> Int<bits>` passing a literal through `identity` in stack slots.
pub fn identity_caller(
    module: &mut Module,
    name: &str,
    identity: FunctionId,
    bits: u16,
) -> Result<(FunctionId, InstId)> {
    let ty = Type::int(bits);
    let caller = module.create_function(
        name,
        FunctionType::thin(vec![], vec![ty.clone()]),
        Linkage::Public,
    )?;
    let entry = module.create_entry_block(caller);
    let mut b = module.builder_at(caller, InsertPoint::End(entry));
    let out = b.alloc_stack(ty.clone());
    let input = b.alloc_stack(ty.clone());
    let value = b.integer_literal(ty.clone(), 5);
    b.store(value, input, StoreQualifier::Trivial);
    let callee = b.function_ref(identity, identity_type());
    let call = b.apply(callee, subs_for(ty), vec![out, input], false);
    let result = b.load(out, LoadQualifier::Trivial);
    b.dealloc_stack(input);
    b.dealloc_stack(out);
    b.return_(result);
    Ok((caller, call))
}
