//! Lowered types and function signatures.
//!
//! [`Type`] is the formal type of a value: builtins, nominal types with generic arguments,
//! tuples, metatypes, existentials, generic parameters and function types. [`SilType`]
//! pairs a formal type with its category, object or address, which is what IR values carry.
//!
//! [`FunctionType`] describes a callee the way the IR sees it: parameters and results with
//! their conventions, an optional error result, an optional generic signature and a
//! representation. The *SIL argument list* of a function type is what its entry block
//! receives: one address per indirect result, followed by one value per parameter
//! (addresses for indirect conventions). Direct results are returned together as a single
//! value, a tuple when there is more than one.

use crate::ir::{
    decl::DeclId,
    subst::{GenericParamKey, GenericSignature, SubstitutionMap},
};

/// Builtin scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    /// Integer with the given bit width
    Int(u16),
    /// Floating point number with the given bit width
    Float(u16),
    /// Untyped pointer
    RawPointer,
    /// Reference counted opaque object
    NativeObject,
}

/// A formal type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// A builtin scalar
    Builtin(BuiltinType),
    /// A class, struct or enum, possibly with generic arguments
    Nominal {
        /// The nominal declaration
        decl: DeclId,
        /// Generic arguments at depth 0 of the declaration
        args: Box<[Type]>,
    },
    /// A tuple of element types
    Tuple(Box<[Type]>),
    /// The metatype of an instance type
    Metatype(Box<Type>),
    /// A protocol existential
    Existential(DeclId),
    /// A generic type parameter
    GenericParam(GenericParamKey),
    /// A function value
    Function(Box<FunctionType>),
}

impl Type {
    /// Builtin integer of `bits` width.
    #[must_use]
    pub const fn int(bits: u16) -> Self {
        Type::Builtin(BuiltinType::Int(bits))
    }

    /// Builtin float of `bits` width.
    #[must_use]
    pub const fn float(bits: u16) -> Self {
        Type::Builtin(BuiltinType::Float(bits))
    }

    /// Builtin reference counted object.
    #[must_use]
    pub const fn native_object() -> Self {
        Type::Builtin(BuiltinType::NativeObject)
    }

    /// Non-generic nominal type.
    #[must_use]
    pub fn nominal(decl: DeclId) -> Self {
        Type::Nominal {
            decl,
            args: Box::new([]),
        }
    }

    /// Bound generic nominal type.
    #[must_use]
    pub fn bound(decl: DeclId, args: Vec<Type>) -> Self {
        Type::Nominal {
            decl,
            args: args.into_boxed_slice(),
        }
    }

    /// Tuple type.
    #[must_use]
    pub fn tuple(elements: Vec<Type>) -> Self {
        Type::Tuple(elements.into_boxed_slice())
    }

    /// The empty tuple, used as the result of functions returning nothing.
    #[must_use]
    pub fn empty_tuple() -> Self {
        Type::Tuple(Box::new([]))
    }

    /// Metatype of `instance`.
    #[must_use]
    pub fn metatype(instance: Type) -> Self {
        Type::Metatype(Box::new(instance))
    }

    /// Generic parameter `τ_depth_index`.
    #[must_use]
    pub const fn param(depth: u32, index: u32) -> Self {
        Type::GenericParam(GenericParamKey::new(depth, index))
    }

    /// Function value type.
    #[must_use]
    pub fn function(ty: FunctionType) -> Self {
        Type::Function(Box::new(ty))
    }

    /// Returns `true` for `()`.
    #[must_use]
    pub fn is_empty_tuple(&self) -> bool {
        matches!(self, Type::Tuple(elements) if elements.is_empty())
    }

    /// Returns the nominal declaration of this type, if any.
    #[must_use]
    pub fn nominal_decl(&self) -> Option<DeclId> {
        match self {
            Type::Nominal { decl, .. } => Some(*decl),
            _ => None,
        }
    }

    /// Returns the generic arguments of a nominal type, empty otherwise.
    #[must_use]
    pub fn generic_args(&self) -> &[Type] {
        match self {
            Type::Nominal { args, .. } => args,
            _ => &[],
        }
    }

    /// Returns the tuple elements, or `None` for non-tuples.
    #[must_use]
    pub fn tuple_elements(&self) -> Option<&[Type]> {
        match self {
            Type::Tuple(elements) => Some(elements),
            _ => None,
        }
    }

    /// Returns the function type of a function value.
    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(ty) => Some(ty),
            _ => None,
        }
    }

    /// Strips one metatype level, returning the instance type.
    #[must_use]
    pub fn strip_metatype(&self) -> &Type {
        match self {
            Type::Metatype(instance) => instance,
            other => other,
        }
    }

    /// Returns `true` if any generic parameter occurs in this type.
    #[must_use]
    pub fn has_generic_params(&self) -> bool {
        match self {
            Type::GenericParam(_) => true,
            Type::Builtin(_) | Type::Existential(_) => false,
            Type::Nominal { args, .. } => args.iter().any(Type::has_generic_params),
            Type::Tuple(elements) => elements.iter().any(Type::has_generic_params),
            Type::Metatype(instance) => instance.has_generic_params(),
            Type::Function(ty) => ty.has_generic_params(),
        }
    }

    /// Rebuilds the type, replacing each generic parameter for which `f` returns a type.
    pub fn map_params(&self, f: &mut dyn FnMut(GenericParamKey) -> Option<Type>) -> Type {
        match self {
            Type::GenericParam(key) => f(*key).unwrap_or_else(|| self.clone()),
            Type::Builtin(_) | Type::Existential(_) => self.clone(),
            Type::Nominal { decl, args } => Type::Nominal {
                decl: *decl,
                args: args.iter().map(|a| a.map_params(f)).collect(),
            },
            Type::Tuple(elements) => Type::Tuple(elements.iter().map(|e| e.map_params(f)).collect()),
            Type::Metatype(instance) => Type::Metatype(Box::new(instance.map_params(f))),
            Type::Function(ty) => Type::Function(Box::new(ty.map_params(f))),
        }
    }

    /// Wraps the type as an object.
    #[must_use]
    pub fn object(self) -> SilType {
        SilType::object(self)
    }

    /// Wraps the type as an address.
    #[must_use]
    pub fn address(self) -> SilType {
        SilType::address(self)
    }
}

/// A formal type together with its value category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SilType {
    ty: Type,
    address: bool,
}

impl SilType {
    /// An object of type `ty`.
    #[must_use]
    pub const fn object(ty: Type) -> Self {
        Self { ty, address: false }
    }

    /// The address of a memory location holding a `ty`.
    #[must_use]
    pub const fn address(ty: Type) -> Self {
        Self { ty, address: true }
    }

    /// Returns the formal type.
    #[must_use]
    pub const fn ty(&self) -> &Type {
        &self.ty
    }

    /// Returns `true` for addresses.
    #[must_use]
    pub const fn is_address(&self) -> bool {
        self.address
    }

    /// Returns `true` for objects.
    #[must_use]
    pub const fn is_object(&self) -> bool {
        !self.address
    }

    /// The object type with the same formal type.
    #[must_use]
    pub fn object_type(&self) -> SilType {
        SilType::object(self.ty.clone())
    }

    /// The address type with the same formal type.
    #[must_use]
    pub fn address_type(&self) -> SilType {
        SilType::address(self.ty.clone())
    }

    /// Applies `subs` to the formal type, keeping the category.
    #[must_use]
    pub fn subst(&self, subs: &SubstitutionMap) -> SilType {
        SilType {
            ty: subs.subst_type(&self.ty),
            address: self.address,
        }
    }
}

/// How a parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamConvention {
    /// By address, callee consumes the value
    IndirectIn,
    /// By address, caller keeps ownership
    IndirectInGuaranteed,
    /// By address, read and written in place
    IndirectInout,
    /// By value, callee consumes the value
    DirectOwned,
    /// By value, no ownership transfer
    DirectUnowned,
    /// By value, caller keeps the value alive for the call
    DirectGuaranteed,
}

impl ParamConvention {
    /// Returns `true` if the parameter is passed by address.
    #[must_use]
    pub const fn is_indirect(self) -> bool {
        matches!(
            self,
            Self::IndirectIn | Self::IndirectInGuaranteed | Self::IndirectInout
        )
    }

    /// Returns the direct convention an indirect parameter turns into when re-abstracted,
    /// or `None` if it cannot be passed by value.
    #[must_use]
    pub const fn direct_equivalent(self) -> Option<ParamConvention> {
        match self {
            Self::IndirectIn => Some(Self::DirectOwned),
            Self::IndirectInGuaranteed => Some(Self::DirectGuaranteed),
            Self::IndirectInout => None,
            direct => Some(direct),
        }
    }
}

/// How a result is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultConvention {
    /// Written to caller provided memory
    Indirect,
    /// Returned by value, caller takes ownership
    Owned,
    /// Returned by value, no ownership transfer
    Unowned,
}

/// Convention of an entry block argument, derived from a parameter or indirect result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentConvention {
    /// Address of an indirect result
    IndirectOut,
    /// A parameter
    Param(ParamConvention),
}

/// The calling representation of a function type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// Free function without context
    Thin,
    /// Function value with a context, the result of a `partial_apply`
    Thick,
    /// Class method, `self` is the last parameter
    Method,
    /// Protocol witness
    WitnessMethod {
        /// The protocol the witness belongs to
        protocol: DeclId,
        /// For class conformances, the class whose `Self` the thunk is generic over
        class_witness: Option<DeclId>,
        /// `true` for implementations taken from a protocol's default witness table
        default_witness: bool,
    },
}

/// A parameter of a function type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamInfo {
    /// Formal type
    pub ty: Type,
    /// Passing convention
    pub convention: ParamConvention,
}

impl ParamInfo {
    /// Creates a parameter.
    #[must_use]
    pub const fn new(ty: Type, convention: ParamConvention) -> Self {
        Self { ty, convention }
    }

    /// Returns the type of the argument value carrying this parameter.
    #[must_use]
    pub fn sil_type(&self) -> SilType {
        if self.convention.is_indirect() {
            SilType::address(self.ty.clone())
        } else {
            SilType::object(self.ty.clone())
        }
    }
}

/// A result of a function type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultInfo {
    /// Formal type
    pub ty: Type,
    /// Return convention
    pub convention: ResultConvention,
}

impl ResultInfo {
    /// Creates a result.
    #[must_use]
    pub const fn new(ty: Type, convention: ResultConvention) -> Self {
        Self { ty, convention }
    }

    /// Returns `true` if the result is written through an address.
    #[must_use]
    pub const fn is_indirect(&self) -> bool {
        matches!(self.convention, ResultConvention::Indirect)
    }
}

/// A lowered function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    /// Generic parameters of the function, `None` if it is not generic
    pub generic_sig: Option<GenericSignature>,
    /// Parameters in order; for methods `self` comes last
    pub params: Vec<ParamInfo>,
    /// Formal results in order
    pub results: Vec<ResultInfo>,
    /// Error result type of a throwing function
    pub error: Option<Type>,
    /// Calling representation
    pub representation: Representation,
}

impl FunctionType {
    /// Creates a non-generic, non-throwing function type.
    #[must_use]
    pub fn new(
        params: Vec<ParamInfo>,
        results: Vec<ResultInfo>,
        representation: Representation,
    ) -> Self {
        Self {
            generic_sig: None,
            params,
            results,
            error: None,
            representation,
        }
    }

    /// Thin function type with direct guaranteed/owned conventions.
    #[must_use]
    pub fn thin(params: Vec<Type>, results: Vec<Type>) -> Self {
        Self::new(
            params
                .into_iter()
                .map(|ty| ParamInfo::new(ty, ParamConvention::DirectGuaranteed))
                .collect(),
            results
                .into_iter()
                .map(|ty| ResultInfo::new(ty, ResultConvention::Owned))
                .collect(),
            Representation::Thin,
        )
    }

    /// Sets the generic signature.
    #[must_use]
    pub fn with_generic_sig(mut self, sig: GenericSignature) -> Self {
        self.generic_sig = if sig.is_empty() { None } else { Some(sig) };
        self
    }

    /// Sets the error result type.
    #[must_use]
    pub fn with_error(mut self, error: Type) -> Self {
        self.error = Some(error);
        self
    }

    /// Sets the representation.
    #[must_use]
    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Returns `true` if the function has generic parameters.
    #[must_use]
    pub fn is_polymorphic(&self) -> bool {
        self.generic_sig.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Returns `true` if the function has an error result.
    #[must_use]
    pub fn has_error_result(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the number of indirect results.
    #[must_use]
    pub fn num_indirect_results(&self) -> usize {
        self.results.iter().filter(|r| r.is_indirect()).count()
    }

    /// Returns the direct results in order.
    pub fn direct_results(&self) -> impl Iterator<Item = &ResultInfo> {
        self.results.iter().filter(|r| !r.is_indirect())
    }

    /// Returns the types of the SIL arguments: indirect result addresses followed by
    /// parameters.
    #[must_use]
    pub fn argument_types(&self) -> Vec<SilType> {
        self.results
            .iter()
            .filter(|r| r.is_indirect())
            .map(|r| SilType::address(r.ty.clone()))
            .chain(self.params.iter().map(ParamInfo::sil_type))
            .collect()
    }

    /// Returns the convention of each SIL argument, in the order of
    /// [`FunctionType::argument_types`].
    #[must_use]
    pub fn argument_conventions(&self) -> Vec<ArgumentConvention> {
        std::iter::repeat(ArgumentConvention::IndirectOut)
            .take(self.num_indirect_results())
            .chain(
                self.params
                    .iter()
                    .map(|p| ArgumentConvention::Param(p.convention)),
            )
            .collect()
    }

    /// Returns the type of the single value produced by a call: the only direct result,
    /// or a tuple of all direct results.
    #[must_use]
    pub fn result_type(&self) -> SilType {
        let mut direct: Vec<Type> = self.direct_results().map(|r| r.ty.clone()).collect();
        if direct.len() == 1 {
            SilType::object(direct.remove(0))
        } else {
            SilType::object(Type::tuple(direct))
        }
    }

    /// Returns the error type as an object type.
    #[must_use]
    pub fn error_type(&self) -> Option<SilType> {
        self.error.clone().map(SilType::object)
    }

    /// Returns the `self` parameter of a method, the last parameter.
    #[must_use]
    pub fn self_param(&self) -> Option<&ParamInfo> {
        match self.representation {
            Representation::Method | Representation::WitnessMethod { .. } => self.params.last(),
            _ => None,
        }
    }

    /// Returns the class a class witness thunk is generic over.
    #[must_use]
    pub fn witness_method_class(&self) -> Option<DeclId> {
        match self.representation {
            Representation::WitnessMethod { class_witness, .. } => class_witness,
            _ => None,
        }
    }

    /// Returns the protocol of a default witness thunk.
    #[must_use]
    pub fn default_witness_protocol(&self) -> Option<DeclId> {
        match self.representation {
            Representation::WitnessMethod {
                protocol,
                default_witness: true,
                ..
            } => Some(protocol),
            _ => None,
        }
    }

    /// Returns `true` if a generic parameter occurs in any parameter, result or error type.
    #[must_use]
    pub fn has_generic_params(&self) -> bool {
        self.params.iter().any(|p| p.ty.has_generic_params())
            || self.results.iter().any(|r| r.ty.has_generic_params())
            || self.error.as_ref().is_some_and(Type::has_generic_params)
    }

    /// Rebuilds the signature with every parameter, result and error type mapped.
    #[must_use]
    pub fn map_params(&self, f: &mut dyn FnMut(GenericParamKey) -> Option<Type>) -> FunctionType {
        FunctionType {
            generic_sig: self.generic_sig.clone(),
            params: self
                .params
                .iter()
                .map(|p| ParamInfo::new(p.ty.map_params(f), p.convention))
                .collect(),
            results: self
                .results
                .iter()
                .map(|r| ResultInfo::new(r.ty.map_params(f), r.convention))
                .collect(),
            error: self.error.as_ref().map(|e| e.map_params(f)),
            representation: self.representation,
        }
    }

    /// Applies `subs` and drops the parameters it binds from the generic signature.
    ///
    /// Parameters that stay unbound, or are bound to another generic parameter, remain in
    /// the signature, so substituting with an empty or identity map keeps the function
    /// generic.
    #[must_use]
    pub fn substituted(&self, subs: &SubstitutionMap) -> FunctionType {
        let mut ty = self.map_params(&mut |key| subs.lookup(key).cloned());
        ty.generic_sig = self.generic_sig.as_ref().and_then(|sig| {
            sig.retain(|p| matches!(subs.lookup(p), None | Some(Type::GenericParam(_))))
        });
        ty
    }

    /// Returns the same signature with thick representation, as produced by closures.
    #[must_use]
    pub fn thick(&self) -> FunctionType {
        FunctionType {
            representation: Representation::Thick,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indirect_identity() -> FunctionType {
        // <T>(@in T) -> @out T
        FunctionType::new(
            vec![ParamInfo::new(Type::param(0, 0), ParamConvention::IndirectIn)],
            vec![ResultInfo::new(Type::param(0, 0), ResultConvention::Indirect)],
            Representation::Thin,
        )
        .with_generic_sig(GenericSignature::with_depths(&[1]))
    }

    #[test]
    fn test_argument_types_put_indirect_results_first() {
        let ty = indirect_identity();
        let args = ty.argument_types();
        assert_eq!(args.len(), 2);
        assert!(args[0].is_address());
        assert!(args[1].is_address());
        assert_eq!(
            ty.argument_conventions()[0],
            ArgumentConvention::IndirectOut
        );
        assert!(ty.result_type().ty().is_empty_tuple());
    }

    #[test]
    fn test_result_type_tuple_for_multiple_direct_results() {
        let ty = FunctionType::thin(vec![], vec![Type::int(1), Type::int(8)]);
        assert_eq!(
            ty.result_type(),
            SilType::object(Type::tuple(vec![Type::int(1), Type::int(8)]))
        );
        let single = FunctionType::thin(vec![], vec![Type::int(1)]);
        assert_eq!(single.result_type(), SilType::object(Type::int(1)));
    }

    #[test]
    fn test_substituted_binds_and_drops_signature() {
        let ty = indirect_identity();
        let subs = SubstitutionMap::from_pairs([(GenericParamKey::new(0, 0), Type::int(32))]);
        let concrete = ty.substituted(&subs);
        assert!(!concrete.is_polymorphic());
        assert_eq!(concrete.params[0].ty, Type::int(32));
        assert_eq!(concrete.results[0].ty, Type::int(32));
    }

    #[test]
    fn test_substituted_identity_keeps_signature() {
        let ty = indirect_identity();
        let sig = ty.generic_sig.clone().unwrap();
        let same = ty.substituted(&SubstitutionMap::identity(&sig));
        assert_eq!(same, ty);
        assert_eq!(ty.substituted(&SubstitutionMap::new()), ty);
    }

    #[test]
    fn test_direct_equivalent_conventions() {
        assert_eq!(
            ParamConvention::IndirectIn.direct_equivalent(),
            Some(ParamConvention::DirectOwned)
        );
        assert_eq!(
            ParamConvention::IndirectInGuaranteed.direct_equivalent(),
            Some(ParamConvention::DirectGuaranteed)
        );
        assert_eq!(ParamConvention::IndirectInout.direct_equivalent(), None);
    }

    #[test]
    fn test_has_generic_params() {
        assert!(Type::metatype(Type::param(0, 0)).has_generic_params());
        assert!(!Type::tuple(vec![Type::int(8)]).has_generic_params());
        assert!(Type::function(indirect_identity()).has_generic_params());
    }
}
