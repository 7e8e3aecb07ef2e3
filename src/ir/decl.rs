//! Nominal declarations, methods and protocol conformances.
//!
//! The [`TypeContext`] is the module's view of the declarations produced by the frontend.
//! It answers the type questions the optimizer asks: is this type trivial, what is the
//! superclass of this bound class type, which substitutions does a derived class imply for
//! one of its superclasses, and which conformance does a concrete type use for a protocol.
//!
//! # Architecture
//!
//! - [`NominalDecl`] - classes, structs, enums and protocols
//! - [`MethodDecl`] - class and protocol members, with override links
//! - [`ProtocolConformance`] - the root ("normal") conformance of a declaration
//! - [`ConformanceRef`] - how an instruction refers to a conformance: abstract, concrete,
//!   or concrete and specialized with generic arguments

use crate::ir::{
    subst::{GenericParamKey, GenericSignature, SubstitutionMap},
    types::Type,
};

entity_id!(
    /// Handle of a nominal declaration in the [`TypeContext`].
    DeclId, "decl"
);

entity_id!(
    /// Handle of a method declaration in the [`TypeContext`].
    MethodId, "method"
);

entity_id!(
    /// Handle of a normal protocol conformance in the [`TypeContext`].
    ConformanceId, "conf"
);

/// The kind of a nominal declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    /// Reference type with single inheritance
    Class,
    /// Value type with stored fields
    Struct,
    /// Value type with cases
    Enum,
    /// Protocol
    Protocol,
}

/// Declared access level, ordered from least to most visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessLevel {
    /// Visible in the enclosing declaration
    Private,
    /// Visible in the enclosing file
    FilePrivate,
    /// Visible in the module
    Internal,
    /// Visible to clients, not subclassable or overridable outside the module
    Public,
    /// Visible to clients and subclassable or overridable
    Open,
}

/// A class, struct, enum or protocol declaration.
#[derive(Debug, Clone)]
pub struct NominalDecl {
    name: String,
    kind: DeclKind,
    generic_params: u32,
    superclass: Option<Type>,
    protocols: Vec<DeclId>,
    fields: Vec<Type>,
    is_final: bool,
    access: AccessLevel,
    defined_in_module: bool,
    trivial: bool,
}

impl NominalDecl {
    fn new(name: impl Into<String>, kind: DeclKind) -> Self {
        Self {
            name: name.into(),
            kind,
            generic_params: 0,
            superclass: None,
            protocols: Vec::new(),
            fields: Vec::new(),
            is_final: false,
            access: AccessLevel::Internal,
            defined_in_module: true,
            trivial: false,
        }
    }

    /// A non-final internal class.
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, DeclKind::Class)
    }

    /// A struct, non-trivial until [`NominalDecl::trivial`] is called.
    #[must_use]
    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, DeclKind::Struct)
    }

    /// An enum.
    #[must_use]
    pub fn enumeration(name: impl Into<String>) -> Self {
        Self::new(name, DeclKind::Enum)
    }

    /// A protocol.
    #[must_use]
    pub fn protocol(name: impl Into<String>) -> Self {
        Self::new(name, DeclKind::Protocol)
    }

    /// Declares `count` generic parameters at depth 0.
    #[must_use]
    pub fn with_generic_params(mut self, count: u32) -> Self {
        self.generic_params = count;
        self
    }

    /// Sets the superclass, expressed in terms of this declaration's generic parameters.
    #[must_use]
    pub fn with_superclass(mut self, superclass: Type) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Sets the stored fields of a struct.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<Type>) -> Self {
        self.fields = fields;
        self
    }

    /// Marks the declaration final.
    #[must_use]
    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Sets the access level.
    #[must_use]
    pub fn with_access(mut self, access: AccessLevel) -> Self {
        self.access = access;
        self
    }

    /// Marks the declaration as imported from another module.
    #[must_use]
    pub fn external(mut self) -> Self {
        self.defined_in_module = false;
        self
    }

    /// Marks a struct or enum as trivially copyable.
    #[must_use]
    pub fn trivial(mut self) -> Self {
        self.trivial = true;
        self
    }

    /// Returns the declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declaration kind.
    #[must_use]
    pub const fn kind(&self) -> DeclKind {
        self.kind
    }

    /// Returns `true` for classes.
    #[must_use]
    pub fn is_class(&self) -> bool {
        self.kind == DeclKind::Class
    }

    /// Returns the number of generic parameters.
    #[must_use]
    pub const fn generic_param_count(&self) -> u32 {
        self.generic_params
    }

    /// Returns the superclass type.
    #[must_use]
    pub fn superclass(&self) -> Option<&Type> {
        self.superclass.as_ref()
    }

    /// Returns the protocols this declaration conforms to.
    #[must_use]
    pub fn protocols(&self) -> &[DeclId] {
        &self.protocols
    }

    /// Returns the stored fields.
    #[must_use]
    pub fn fields(&self) -> &[Type] {
        &self.fields
    }

    /// Returns `true` if declared final.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.is_final
    }

    /// Returns the access level.
    #[must_use]
    pub const fn access(&self) -> AccessLevel {
        self.access
    }

    /// Returns `true` if the declaration belongs to the module being compiled.
    #[must_use]
    pub const fn is_defined_in_module(&self) -> bool {
        self.defined_in_module
    }
}

/// A method of a class or a protocol requirement.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    name: String,
    parent: DeclId,
    overrides: Option<MethodId>,
    is_final: bool,
    dynamic: bool,
    access: AccessLevel,
    overridden: bool,
}

impl MethodDecl {
    /// Creates an internal, non-final method of `parent`.
    #[must_use]
    pub fn new(name: impl Into<String>, parent: DeclId) -> Self {
        Self {
            name: name.into(),
            parent,
            overrides: None,
            is_final: false,
            dynamic: false,
            access: AccessLevel::Internal,
            overridden: false,
        }
    }

    /// Declares that this method overrides `base`.
    #[must_use]
    pub fn overriding(mut self, base: MethodId) -> Self {
        self.overrides = Some(base);
        self
    }

    /// Marks the method final.
    #[must_use]
    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Marks the method as dynamically replaceable.
    #[must_use]
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Sets the access level.
    #[must_use]
    pub fn with_access(mut self, access: AccessLevel) -> Self {
        self.access = access;
        self
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declaring class or protocol.
    #[must_use]
    pub const fn parent(&self) -> DeclId {
        self.parent
    }

    /// Returns the method this one overrides.
    #[must_use]
    pub const fn overrides(&self) -> Option<MethodId> {
        self.overrides
    }

    /// Returns `true` if declared final.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.is_final
    }

    /// Returns `true` if the method may be replaced at runtime.
    #[must_use]
    pub const fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Returns the access level.
    #[must_use]
    pub const fn access(&self) -> AccessLevel {
        self.access
    }

    /// Returns `true` once another registered method overrides this one.
    #[must_use]
    pub const fn is_overridden(&self) -> bool {
        self.overridden
    }
}

/// A normal protocol conformance: `decl: protocol`, generic over `decl`'s parameters.
#[derive(Debug, Clone)]
pub struct ProtocolConformance {
    protocol: DeclId,
    conforming: DeclId,
    generic_sig: Option<GenericSignature>,
}

impl ProtocolConformance {
    /// Returns the protocol.
    #[must_use]
    pub const fn protocol(&self) -> DeclId {
        self.protocol
    }

    /// Returns the conforming declaration.
    #[must_use]
    pub const fn conforming_decl(&self) -> DeclId {
        self.conforming
    }

    /// Returns the generic signature of the conformance, that of the conforming declaration.
    #[must_use]
    pub fn generic_sig(&self) -> Option<&GenericSignature> {
        self.generic_sig.as_ref()
    }
}

/// An instruction's reference to a protocol conformance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConformanceRef {
    /// Conformance of a generic parameter or existential, not known statically
    Abstract(DeclId),
    /// A normal conformance of a non-generic type
    Concrete(ConformanceId),
    /// A normal conformance applied to concrete generic arguments
    Specialized {
        /// The normal conformance
        root: ConformanceId,
        /// Generic arguments of the conforming declaration
        subs: SubstitutionMap,
    },
}

impl ConformanceRef {
    /// Returns the normal conformance, `None` for abstract conformances.
    #[must_use]
    pub fn root(&self) -> Option<ConformanceId> {
        match self {
            ConformanceRef::Abstract(_) => None,
            ConformanceRef::Concrete(id) | ConformanceRef::Specialized { root: id, .. } => {
                Some(*id)
            }
        }
    }

    /// Returns `true` for concrete and specialized conformances.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        !matches!(self, ConformanceRef::Abstract(_))
    }

    /// Returns the substitutions a specialized conformance applies to its root.
    #[must_use]
    pub fn substitutions(&self) -> SubstitutionMap {
        match self {
            ConformanceRef::Specialized { subs, .. } => subs.clone(),
            _ => SubstitutionMap::new(),
        }
    }
}

/// All declarations known to a module.
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    decls: Vec<NominalDecl>,
    methods: Vec<MethodDecl>,
    conformances: Vec<ProtocolConformance>,
}

impl TypeContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a declaration.
    pub fn add_decl(&mut self, decl: NominalDecl) -> DeclId {
        self.decls.push(decl);
        DeclId::new(self.decls.len() - 1)
    }

    /// Returns a declaration.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this context.
    #[must_use]
    pub fn decl(&self, id: DeclId) -> &NominalDecl {
        &self.decls[id.index()]
    }

    /// Iterates all declarations in registration order.
    pub fn decls(&self) -> impl Iterator<Item = (DeclId, &NominalDecl)> {
        self.decls
            .iter()
            .enumerate()
            .map(|(i, d)| (DeclId::new(i), d))
    }

    /// Finds a declaration by name.
    #[must_use]
    pub fn find_decl(&self, name: &str) -> Option<DeclId> {
        self.decls
            .iter()
            .position(|d| d.name == name)
            .map(DeclId::new)
    }

    /// Registers a method.
    ///
    /// Registering an overriding method marks every method along its override chain as
    /// overridden.
    pub fn add_method(&mut self, method: MethodDecl) -> MethodId {
        let mut base = method.overrides;
        while let Some(id) = base {
            let overridden = &mut self.methods[id.index()];
            overridden.overridden = true;
            base = overridden.overrides;
        }
        self.methods.push(method);
        MethodId::new(self.methods.len() - 1)
    }

    /// Returns a method.
    #[must_use]
    pub fn method(&self, id: MethodId) -> &MethodDecl {
        &self.methods[id.index()]
    }

    /// Follows the override chain of `id` to the method that introduced the vtable slot.
    #[must_use]
    pub fn root_method(&self, id: MethodId) -> MethodId {
        let mut current = id;
        while let Some(base) = self.methods[current.index()].overrides {
            current = base;
        }
        current
    }

    /// Registers the conformance of `decl` to `protocol`.
    ///
    /// The conformance is generic over the declaration's own parameters.
    pub fn add_conformance(&mut self, decl: DeclId, protocol: DeclId) -> ConformanceId {
        let count = self.decls[decl.index()].generic_params;
        let generic_sig = (count > 0).then(|| GenericSignature::with_depths(&[count]));
        let protocols = &mut self.decls[decl.index()].protocols;
        if !protocols.contains(&protocol) {
            protocols.push(protocol);
        }
        self.conformances.push(ProtocolConformance {
            protocol,
            conforming: decl,
            generic_sig,
        });
        ConformanceId::new(self.conformances.len() - 1)
    }

    /// Returns a normal conformance.
    #[must_use]
    pub fn conformance(&self, id: ConformanceId) -> &ProtocolConformance {
        &self.conformances[id.index()]
    }

    /// Finds the conformance `ty` uses for `protocol`.
    ///
    /// Generic nominal types yield a specialized reference carrying their arguments.
    /// Generic parameters and existentials yield an abstract reference.
    #[must_use]
    pub fn lookup_conformance(&self, ty: &Type, protocol: DeclId) -> Option<ConformanceRef> {
        match ty {
            Type::GenericParam(_) | Type::Existential(_) => {
                Some(ConformanceRef::Abstract(protocol))
            }
            Type::Nominal { decl, args } => {
                let pos = self
                    .conformances
                    .iter()
                    .position(|c| c.conforming == *decl && c.protocol == protocol)?;
                let root = ConformanceId::new(pos);
                if args.is_empty() {
                    Some(ConformanceRef::Concrete(root))
                } else {
                    Some(ConformanceRef::Specialized {
                        root,
                        subs: self.decl_substitutions(*decl, args),
                    })
                }
            }
            _ => None,
        }
    }

    /// Returns the generic signature of a declaration, `None` if it is not generic.
    #[must_use]
    pub fn decl_generic_sig(&self, decl: DeclId) -> Option<GenericSignature> {
        let count = self.decls[decl.index()].generic_params;
        (count > 0).then(|| GenericSignature::with_depths(&[count]))
    }

    /// Returns the number of generic depth levels a declaration introduces, 0 or 1.
    #[must_use]
    pub fn generic_depth(&self, decl: DeclId) -> u32 {
        u32::from(self.decls[decl.index()].generic_params > 0)
    }

    /// Returns the declared type of `decl`, with its own parameters as arguments.
    #[must_use]
    pub fn declared_type(&self, decl: DeclId) -> Type {
        let count = self.decls[decl.index()].generic_params;
        Type::bound(decl, (0..count).map(|i| Type::param(0, i)).collect())
    }

    fn decl_substitutions(&self, decl: DeclId, args: &[Type]) -> SubstitutionMap {
        let count = self.decls[decl.index()].generic_params as usize;
        SubstitutionMap::from_pairs(
            args.iter()
                .take(count)
                .enumerate()
                .map(|(i, ty)| {
                    #[allow(clippy::cast_possible_truncation)]
                    let index = i as u32;
                    (GenericParamKey::new(0, index), ty.clone())
                }),
        )
    }

    /// Returns the class declaration of a class type or class metatype.
    #[must_use]
    pub fn class_decl(&self, ty: &Type) -> Option<DeclId> {
        match ty.strip_metatype() {
            Type::Nominal { decl, .. } if self.decls[decl.index()].is_class() => Some(*decl),
            _ => None,
        }
    }

    /// Returns the superclass of a class type, with the class's generic arguments applied.
    #[must_use]
    pub fn superclass_type(&self, ty: &Type) -> Option<Type> {
        let Type::Nominal { decl, args } = ty else {
            return None;
        };
        let superclass = self.decls[decl.index()].superclass.as_ref()?;
        Some(self.decl_substitutions(*decl, args).subst_type(superclass))
    }

    /// Returns `true` if `sup` is a proper superclass of `sub`.
    #[must_use]
    pub fn is_superclass_of(&self, sup: &Type, sub: &Type) -> bool {
        let mut current = self.superclass_type(sub);
        while let Some(ty) = current {
            if &ty == sup {
                return true;
            }
            current = self.superclass_type(&ty);
        }
        false
    }

    /// Returns the bindings `derived` implies for the generic parameters of `base`.
    ///
    /// Walks the superclass chain of `derived` until it reaches `base` and reads the bound
    /// arguments there. Returns `None` if `base` is not among the superclasses.
    #[must_use]
    pub fn context_substitutions(&self, derived: &Type, base: DeclId) -> Option<SubstitutionMap> {
        let mut current = Some(derived.strip_metatype().clone());
        while let Some(ty) = current {
            if let Type::Nominal { decl, args } = &ty {
                if *decl == base {
                    return Some(self.decl_substitutions(base, args));
                }
            }
            current = self.superclass_type(&ty);
        }
        None
    }

    /// Returns `true` if some instantiation of `sub` could be a subclass of `class_ty`.
    ///
    /// Walks the declared superclass chain of `sub`; bound arguments that mention `sub`'s
    /// own generic parameters match anything.
    #[must_use]
    pub fn could_be_subclass_of(&self, sub: DeclId, class_ty: &Type) -> bool {
        let Type::Nominal {
            decl: target,
            args: target_args,
        } = class_ty
        else {
            return false;
        };
        let mut current = Some(self.declared_type(sub));
        while let Some(ty) = current {
            if let Type::Nominal { decl, args } = &ty {
                if decl == target {
                    return args
                        .iter()
                        .zip(target_args.iter())
                        .all(|(a, b)| a.has_generic_params() || a == b);
                }
            }
            current = self.superclass_type(&ty);
        }
        false
    }

    /// Returns `true` if values of `ty` need no reference counting or destruction.
    #[must_use]
    pub fn is_trivial(&self, ty: &Type) -> bool {
        match ty {
            Type::Builtin(b) => !matches!(b, crate::ir::types::BuiltinType::NativeObject),
            Type::Metatype(_) => true,
            Type::Tuple(elements) => elements.iter().all(|e| self.is_trivial(e)),
            Type::Nominal { decl, args } => {
                let d = &self.decls[decl.index()];
                !d.is_class() && d.trivial && args.iter().all(|a| self.is_trivial(a))
            }
            Type::Existential(_) | Type::GenericParam(_) | Type::Function(_) => false,
        }
    }

    /// Returns `true` if values of `ty` can be held in registers, i.e. their layout is known.
    #[must_use]
    pub fn is_loadable(&self, ty: &Type) -> bool {
        match ty {
            Type::GenericParam(_) | Type::Existential(_) => false,
            Type::Tuple(elements) => elements.iter().all(|e| self.is_loadable(e)),
            Type::Nominal { args, .. } => args.iter().all(|a| self.is_loadable(a)),
            Type::Builtin(_) | Type::Metatype(_) | Type::Function(_) => true,
        }
    }

    /// Returns the stored field types of a struct type with its arguments applied.
    #[must_use]
    pub fn field_types(&self, ty: &Type) -> Vec<Type> {
        let Type::Nominal { decl, args } = ty else {
            return Vec::new();
        };
        let subs = self.decl_substitutions(*decl, args);
        self.decls[decl.index()]
            .fields
            .iter()
            .map(|f| subs.subst_type(f))
            .collect()
    }
}
