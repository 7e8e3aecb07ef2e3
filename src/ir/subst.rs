//! Generic signatures and substitution maps.
//!
//! A generic parameter is identified by its `(depth, index)` pair: depth 0 holds the
//! parameters of the outermost generic context (a generic class, or `Self` of a protocol
//! requirement), depth 1 the parameters introduced by a generic method nested in it, and
//! so on. A [`SubstitutionMap`] binds such parameters to replacement types.
//!
//! # Composition
//!
//! Calling an inherited or witness implementation requires re-expressing the bindings of
//! the call site in terms of the callee's own signature, whose outer levels may come from a
//! different declaration. [`SubstitutionMap::combine_at_depth`] implements that: parameters
//! of the target signature that live above a cut-off depth are read from one map, the rest
//! are read from another map after shifting their depth.
//!
//! # Examples
//!
//! ```rust,ignore
//! use silcore::ir::{GenericParamKey, SubstitutionMap, Type};
//!
//! let key = GenericParamKey::new(0, 0);
//! let subs = SubstitutionMap::from_pairs([(key, Type::int(64))]);
//! assert_eq!(subs.subst_type(&Type::param(0, 0)), Type::int(64));
//! ```

use std::fmt;

use crate::ir::types::Type;

/// Position of a generic parameter within nested generic contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenericParamKey {
    /// Nesting level, 0 being the outermost context
    pub depth: u32,
    /// Position within its level
    pub index: u32,
}

impl GenericParamKey {
    /// Creates a new parameter key.
    #[must_use]
    pub const fn new(depth: u32, index: u32) -> Self {
        Self { depth, index }
    }
}

impl fmt::Display for GenericParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "τ_{}_{}", self.depth, self.index)
    }
}

/// The ordered list of generic parameters of a declaration or function type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GenericSignature {
    params: Vec<GenericParamKey>,
}

impl GenericSignature {
    /// Creates a signature from an arbitrary list of parameters.
    ///
    /// The parameters are sorted by depth and index and duplicates are removed.
    #[must_use]
    pub fn new(mut params: Vec<GenericParamKey>) -> Self {
        params.sort_unstable();
        params.dedup();
        Self { params }
    }

    /// Creates a signature with `counts[d]` parameters at depth `d`.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// // <T, U><V>
    /// let sig = GenericSignature::with_depths(&[2, 1]);
    /// assert_eq!(sig.depth_count(), 2);
    /// ```
    #[must_use]
    pub fn with_depths(counts: &[u32]) -> Self {
        let mut params = Vec::new();
        for (depth, &count) in counts.iter().enumerate() {
            for index in 0..count {
                #[allow(clippy::cast_possible_truncation)]
                params.push(GenericParamKey::new(depth as u32, index));
            }
        }
        Self { params }
    }

    /// Returns the parameters in depth/index order.
    #[must_use]
    pub fn params(&self) -> &[GenericParamKey] {
        &self.params
    }

    /// Returns `true` if the signature has no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if `key` is one of the parameters.
    #[must_use]
    pub fn contains(&self, key: GenericParamKey) -> bool {
        self.params.binary_search(&key).is_ok()
    }

    /// Returns the number of depth levels, which is the depth of the innermost parameter
    /// plus one, or zero for an empty signature.
    #[must_use]
    pub fn depth_count(&self) -> u32 {
        self.params.last().map_or(0, |p| p.depth + 1)
    }

    /// Returns the parameters that survive `keep`, or `None` if none do.
    #[must_use]
    pub fn retain(&self, mut keep: impl FnMut(GenericParamKey) -> bool) -> Option<Self> {
        let params: Vec<_> = self.params.iter().copied().filter(|p| keep(*p)).collect();
        if params.is_empty() {
            None
        } else {
            Some(Self { params })
        }
    }
}

impl fmt::Display for GenericSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ">")
    }
}

/// Bindings from generic parameters to replacement types.
///
/// Entries are kept sorted by parameter so that two maps with the same bindings compare
/// equal and hash identically. Substituting a type leaves unbound parameters untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubstitutionMap {
    entries: Vec<(GenericParamKey, Type)>,
}

impl SubstitutionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map from `(parameter, replacement)` pairs.
    ///
    /// Later pairs win if a parameter appears more than once.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (GenericParamKey, Type)>) -> Self {
        let mut map = Self::new();
        for (key, ty) in pairs {
            map.insert(key, ty);
        }
        map
    }

    /// Binds the parameters of `sig`, in order, to `replacements`.
    ///
    /// # Panics
    ///
    /// Panics if the number of replacements differs from the number of parameters.
    #[must_use]
    pub fn for_signature(sig: &GenericSignature, replacements: Vec<Type>) -> Self {
        assert_eq!(
            sig.len(),
            replacements.len(),
            "substitution map must bind every generic parameter"
        );
        Self {
            entries: sig.params().iter().copied().zip(replacements).collect(),
        }
    }

    /// Creates the map that binds every parameter of `sig` to itself.
    #[must_use]
    pub fn identity(sig: &GenericSignature) -> Self {
        Self {
            entries: sig
                .params()
                .iter()
                .map(|&p| (p, Type::GenericParam(p)))
                .collect(),
        }
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of bound parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Binds `key` to `ty`, replacing any previous binding.
    pub fn insert(&mut self, key: GenericParamKey, ty: Type) {
        match self.entries.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(pos) => self.entries[pos].1 = ty,
            Err(pos) => self.entries.insert(pos, (key, ty)),
        }
    }

    /// Returns the replacement bound to `key`.
    #[must_use]
    pub fn lookup(&self, key: GenericParamKey) -> Option<&Type> {
        self.entries
            .binary_search_by_key(&key, |(k, _)| *k)
            .ok()
            .map(|pos| &self.entries[pos].1)
    }

    /// Returns the bindings in parameter order.
    pub fn iter(&self) -> impl Iterator<Item = (GenericParamKey, &Type)> {
        self.entries.iter().map(|(k, t)| (*k, t))
    }

    /// Returns the replacement types in parameter order.
    pub fn replacement_types(&self) -> impl Iterator<Item = &Type> {
        self.entries.iter().map(|(_, t)| t)
    }

    /// Returns `true` if no replacement mentions a generic parameter.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.entries.iter().all(|(_, t)| !t.has_generic_params())
    }

    /// Returns the binding of the protocol `Self` parameter, `τ_0_0`.
    #[must_use]
    pub fn self_type(&self) -> Option<&Type> {
        self.lookup(GenericParamKey::new(0, 0))
    }

    /// Applies the bindings to `ty`.
    #[must_use]
    pub fn subst_type(&self, ty: &Type) -> Type {
        if self.is_empty() {
            return ty.clone();
        }
        ty.map_params(&mut |key| self.lookup(key).cloned())
    }

    /// Applies `self` to every replacement type of `other`, producing the composition
    /// "first `other`, then `self`".
    #[must_use]
    pub fn subst_map(&self, other: &SubstitutionMap) -> SubstitutionMap {
        SubstitutionMap {
            entries: other
                .entries
                .iter()
                .map(|(k, t)| (*k, self.subst_type(t)))
                .collect(),
        }
    }

    /// Composes two maps over the parameters of `sig`.
    ///
    /// Parameters of `sig` with a depth below `first_depth` are read from `first` unchanged.
    /// The remaining parameters are read from `second` after their depth has been shifted
    /// by `second_depth - first_depth`. Parameters for which the selected map has no binding
    /// are left unbound.
    ///
    /// # Arguments
    ///
    /// * `first` - Bindings for the outer levels of `sig`
    /// * `second` - Bindings for the inner levels, expressed at their original depth
    /// * `first_depth` - Number of levels of `sig` covered by `first`
    /// * `second_depth` - Depth in `second` at which the inner levels start
    /// * `sig` - The signature the result is expressed in
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// // Witness `<T><U>` for requirement `<Self><U>` of a conformance `A<Int>: P`.
    /// let base = SubstitutionMap::from_pairs([(GenericParamKey::new(0, 0), Type::int(64))]);
    /// let orig = SubstitutionMap::from_pairs([
    ///     (GenericParamKey::new(0, 0), a_of_int),
    ///     (GenericParamKey::new(1, 0), string),
    /// ]);
    /// let sig = GenericSignature::with_depths(&[1, 1]);
    /// let subs = SubstitutionMap::combine_at_depth(&base, &orig, 1, 1, &sig);
    /// ```
    #[must_use]
    pub fn combine_at_depth(
        first: &SubstitutionMap,
        second: &SubstitutionMap,
        first_depth: u32,
        second_depth: u32,
        sig: &GenericSignature,
    ) -> SubstitutionMap {
        let mut entries = Vec::with_capacity(sig.len());
        for &param in sig.params() {
            let replacement = if param.depth < first_depth {
                first.lookup(param)
            } else {
                let shifted =
                    GenericParamKey::new(param.depth - first_depth + second_depth, param.index);
                second.lookup(shifted)
            };
            if let Some(ty) = replacement {
                entries.push((param, ty.clone()));
            }
        }
        SubstitutionMap { entries }
    }
}

impl fmt::Display for SubstitutionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (k, t)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k} := {t:?}")?;
        }
        write!(f, "]")
    }
}
