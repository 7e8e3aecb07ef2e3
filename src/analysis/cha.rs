//! Class Hierarchy Analysis (CHA).
//!
//! A module-wide index of subclass and protocol-conformance relationships, built once from
//! the module's vtables and declarations. Devirtualization consults it to prove that every
//! possible runtime class of a receiver resolves a method to the same implementation.
//!
//! The analysis is a snapshot: it reflects the module at construction time and is never
//! invalidated. Rebuild it after adding classes or vtables.
//!
//! # Examples
//!
//! ```rust,ignore
//! use silcore::analysis::ClassHierarchyAnalysis;
//!
//! let cha = ClassHierarchyAnalysis::new(&module);
//! for sub in cha.direct_subclasses(base) {
//!     println!("{}", module.types().decl(*sub).name());
//! }
//! ```

use std::{collections::HashMap, sync::OnceLock};

use crate::ir::{DeclId, Module};

/// Subclass and implementer index of one module.
#[derive(Debug)]
pub struct ClassHierarchyAnalysis {
    /// Class -> classes whose vtable names it as their superclass.
    direct_subclasses: HashMap<DeclId, Vec<DeclId>>,
    /// Class -> transitive subclasses excluding the direct ones, computed on first request.
    indirect_subclasses: HashMap<DeclId, OnceLock<Vec<DeclId>>>,
    /// Protocol -> declarations conforming to it.
    protocol_implementations: HashMap<DeclId, Vec<DeclId>>,
}

impl ClassHierarchyAnalysis {
    /// Builds the index for `module`.
    ///
    /// Every declaration contributes to the implementer lists of the protocols it conforms
    /// to. Every class with a vtable and a superclass is appended to the direct subclass
    /// list of that superclass, in vtable order.
    #[must_use]
    pub fn new(module: &Module) -> Self {
        let types = module.types();
        let mut protocol_implementations: HashMap<DeclId, Vec<DeclId>> = HashMap::new();
        let mut indirect_subclasses = HashMap::new();

        for (id, decl) in types.decls() {
            for protocol in decl.protocols() {
                protocol_implementations.entry(*protocol).or_default().push(id);
            }
            if decl.is_class() {
                indirect_subclasses.insert(id, OnceLock::new());
            }
        }

        let mut direct_subclasses: HashMap<DeclId, Vec<DeclId>> = HashMap::new();
        for vtable in module.vtables() {
            let class = vtable.class();
            let Some(superclass) = types
                .decl(class)
                .superclass()
                .and_then(|ty| types.class_decl(ty))
            else {
                continue;
            };
            direct_subclasses.entry(superclass).or_default().push(class);
        }

        log::trace!(
            "class hierarchy: {} classes with subclasses, {} protocols with implementers",
            direct_subclasses.len(),
            protocol_implementations.len()
        );

        Self {
            direct_subclasses,
            indirect_subclasses,
            protocol_implementations,
        }
    }

    /// Returns the classes directly inheriting from `class`.
    #[must_use]
    pub fn direct_subclasses(&self, class: DeclId) -> &[DeclId] {
        self.direct_subclasses
            .get(&class)
            .map_or(&[], Vec::as_slice)
    }

    /// Returns the subclasses of `class` that inherit through at least one intermediate
    /// class, in breadth-first order.
    ///
    /// The direct subclasses are not included. Use [`Self::all_subclasses`] for the
    /// union of both sets.
    ///
    /// Computed on the first request and cached. Inheritance is single, so every class is
    /// reached along exactly one path and the list holds no duplicates.
    #[must_use]
    pub fn indirect_subclasses(&self, class: DeclId) -> &[DeclId] {
        match self.indirect_subclasses.get(&class) {
            Some(cell) => cell.get_or_init(|| self.compute_indirect_subclasses(class)),
            None => &[],
        }
    }

    /// Returns the direct subclasses of `class` followed by its indirect subclasses.
    #[must_use]
    pub fn all_subclasses(&self, class: DeclId) -> Vec<DeclId> {
        let mut subs = self.direct_subclasses(class).to_vec();
        subs.extend_from_slice(self.indirect_subclasses(class));
        subs
    }

    /// Returns the declarations conforming to `protocol`.
    #[must_use]
    pub fn protocol_implementations(&self, protocol: DeclId) -> &[DeclId] {
        self.protocol_implementations
            .get(&protocol)
            .map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if some class directly inherits from `class`.
    #[must_use]
    pub fn has_known_direct_subclasses(&self, class: DeclId) -> bool {
        !self.direct_subclasses(class).is_empty()
    }

    /// Returns `true` if some declaration conforms to `protocol`.
    #[must_use]
    pub fn has_known_implementations(&self, protocol: DeclId) -> bool {
        !self.protocol_implementations(protocol).is_empty()
    }

    fn compute_indirect_subclasses(&self, class: DeclId) -> Vec<DeclId> {
        let mut found: Vec<DeclId> = Vec::new();
        for direct in self.direct_subclasses(class) {
            found.extend_from_slice(self.direct_subclasses(*direct));
        }
        // The list grows while it is walked, so iterate by index.
        let mut next = 0;
        while next < found.len() {
            let current = found[next];
            found.extend_from_slice(self.direct_subclasses(current));
            next += 1;
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ModuleOptions,
        ir::{NominalDecl, Type, TypeContext, VTable},
    };

    /// Root <- A <- B <- C, Root <- D, plus protocol P implemented by A and D.
    fn chain() -> (Module, [DeclId; 5], DeclId) {
        let mut types = TypeContext::new();
        let proto = types.add_decl(NominalDecl::protocol("P"));
        let root = types.add_decl(NominalDecl::class("Root"));
        let a = types.add_decl(NominalDecl::class("A").with_superclass(Type::nominal(root)));
        let b = types.add_decl(NominalDecl::class("B").with_superclass(Type::nominal(a)));
        let c = types.add_decl(NominalDecl::class("C").with_superclass(Type::nominal(b)));
        let d = types.add_decl(NominalDecl::class("D").with_superclass(Type::nominal(root)));
        types.add_conformance(a, proto);
        types.add_conformance(d, proto);

        let mut module = Module::new("m", types, ModuleOptions::default());
        for class in [root, a, b, c, d] {
            module.add_vtable(VTable::new(class)).unwrap();
        }
        (module, [root, a, b, c, d], proto)
    }

    #[test]
    fn test_direct_subclasses_follow_vtables() {
        let (module, [root, a, b, c, d], _) = chain();
        let cha = ClassHierarchyAnalysis::new(&module);
        assert_eq!(cha.direct_subclasses(root), &[a, d]);
        assert_eq!(cha.direct_subclasses(a), &[b]);
        assert_eq!(cha.direct_subclasses(b), &[c]);
        assert!(cha.direct_subclasses(c).is_empty());
        assert!(cha.has_known_direct_subclasses(root));
        assert!(!cha.has_known_direct_subclasses(d));
    }

    #[test]
    fn test_class_without_vtable_is_not_a_known_subclass() {
        let mut types = TypeContext::new();
        let base = types.add_decl(NominalDecl::class("Base"));
        let hidden = types.add_decl(NominalDecl::class("Hidden").with_superclass(Type::nominal(base)));
        let mut module = Module::new("m", types, ModuleOptions::default());
        module.add_vtable(VTable::new(base)).unwrap();

        let cha = ClassHierarchyAnalysis::new(&module);
        assert!(cha.direct_subclasses(base).is_empty());
        assert!(cha.indirect_subclasses(hidden).is_empty());
    }

    #[test]
    fn test_indirect_subclasses_breadth_first() {
        let (module, [root, a, b, c, d], _) = chain();
        let cha = ClassHierarchyAnalysis::new(&module);
        assert_eq!(cha.indirect_subclasses(root), &[b, c]);
        assert_eq!(cha.indirect_subclasses(a), &[c]);
        assert!(cha.indirect_subclasses(b).is_empty());
        assert_eq!(cha.all_subclasses(root), vec![a, d, b, c]);
        // Cached result is stable.
        assert_eq!(cha.indirect_subclasses(root).as_ptr(), cha.indirect_subclasses(root).as_ptr());
    }

    #[test]
    fn test_all_subclasses_are_reachable() {
        let (module, classes, _) = chain();
        let cha = ClassHierarchyAnalysis::new(&module);
        let types = module.types();
        for class in classes {
            let all = cha.all_subclasses(class);
            for direct in cha.direct_subclasses(class) {
                assert!(all.contains(direct));
                assert!(!cha.indirect_subclasses(class).contains(direct));
            }
            for sub in all {
                assert!(types.is_superclass_of(&Type::nominal(class), &Type::nominal(sub)));
            }
        }
    }

    #[test]
    fn test_protocol_implementations() {
        let (module, [root, a, _, _, d], proto) = chain();
        let cha = ClassHierarchyAnalysis::new(&module);
        assert_eq!(cha.protocol_implementations(proto), &[a, d]);
        assert!(cha.has_known_implementations(proto));
        assert!(!cha.has_known_implementations(root));
    }

    #[test]
    fn test_snapshot_is_not_updated() {
        let (mut module, [_, _, _, c, _], _) = chain();
        let cha = ClassHierarchyAnalysis::new(&module);
        let e = module
            .types_mut()
            .add_decl(NominalDecl::class("E").with_superclass(Type::nominal(c)));
        module.add_vtable(VTable::new(e)).unwrap();
        assert!(cha.direct_subclasses(c).is_empty());
        assert_eq!(ClassHierarchyAnalysis::new(&module).direct_subclasses(c), &[e]);
    }
}
