//! Call site views over apply-like instructions.
//!
//! [`ApplySite`] covers every instruction that applies a callee to arguments: `apply`,
//! `try_apply` and `partial_apply`. [`FullApplySite`] is restricted to the calls whose
//! control returns to the caller, `apply` and `try_apply`. Both are small `Copy` views
//! that read the instruction from its function on demand.
//!
//! Operand 0 of every apply is the callee. The remaining operands are the SIL arguments:
//! for full applies the indirect result addresses come first, then the parameters; a
//! `partial_apply` binds a suffix of the callee's parameters.

use crate::ir::{
    block::BlockId,
    function::{Function, FunctionId},
    instruction::{InstId, InstKind, Opcode},
    subst::SubstitutionMap,
    types::FunctionType,
    value::ValueId,
};

/// Kind of an apply-like instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyKind {
    /// `apply`
    Apply,
    /// `try_apply`
    TryApply,
    /// `partial_apply`
    PartialApply,
}

/// Any instruction applying a callee to arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApplySite {
    inst: InstId,
    kind: ApplyKind,
}

impl ApplySite {
    /// Views `inst` as an apply site.
    ///
    /// # Returns
    ///
    /// `None` if the instruction is not an `apply`, `try_apply` or `partial_apply`.
    #[must_use]
    pub fn new(func: &Function, inst: InstId) -> Option<Self> {
        let kind = match func.inst(inst).opcode() {
            Opcode::Apply => ApplyKind::Apply,
            Opcode::TryApply => ApplyKind::TryApply,
            Opcode::PartialApply => ApplyKind::PartialApply,
            _ => return None,
        };
        Some(Self { inst, kind })
    }

    /// Returns the instruction.
    #[must_use]
    pub const fn inst(&self) -> InstId {
        self.inst
    }

    /// Returns the kind.
    #[must_use]
    pub const fn kind(&self) -> ApplyKind {
        self.kind
    }

    /// Returns the full apply view, `None` for `partial_apply`.
    #[must_use]
    pub const fn as_full(&self) -> Option<FullApplySite> {
        match self.kind {
            ApplyKind::PartialApply => None,
            ApplyKind::Apply | ApplyKind::TryApply => Some(FullApplySite {
                inst: self.inst,
                is_try: matches!(self.kind, ApplyKind::TryApply),
            }),
        }
    }

    /// Returns the callee operand.
    #[must_use]
    pub fn callee(&self, func: &Function) -> ValueId {
        func.inst(self.inst).operand(0)
    }

    /// Returns the arguments following the callee.
    #[must_use]
    pub fn arguments<'f>(&self, func: &'f Function) -> &'f [ValueId] {
        &func.inst(self.inst).operands()[1..]
    }

    /// Returns the substitutions applied to the callee's generic signature.
    #[must_use]
    pub fn substitutions<'f>(&self, func: &'f Function) -> &'f SubstitutionMap {
        func.inst(self.inst)
            .kind()
            .substitutions()
            .expect("apply site carries substitutions")
    }

    /// Returns the unsubstituted type of the callee.
    #[must_use]
    pub fn orig_callee_type(&self, func: &Function) -> FunctionType {
        func.value_type(self.callee(func))
            .ty()
            .as_function()
            .cloned()
            .expect("callee must have function type")
    }

    /// Returns the callee type with the site's substitutions applied.
    #[must_use]
    pub fn subst_callee_type(&self, func: &Function) -> FunctionType {
        self.orig_callee_type(func)
            .substituted(self.substitutions(func))
    }

    /// Returns the function a direct `function_ref` callee refers to.
    #[must_use]
    pub fn referenced_function(&self, func: &Function) -> Option<FunctionId> {
        match func.defining_kind(self.callee(func)) {
            Some(InstKind::FunctionRef { function }) => Some(*function),
            _ => None,
        }
    }

    /// Returns the function the callee ultimately refers to, looking through closures and
    /// representation changes.
    #[must_use]
    pub fn ultimate_callee(&self, func: &Function) -> Option<FunctionId> {
        ultimate_function_ref(func, self.callee(func))
    }
}

/// Follows `partial_apply`, `convert_function` and `thin_to_thick_function` wrappers back to
/// a `function_ref`.
///
/// # Returns
///
/// The referenced function, or `None` if the chain ends anywhere else.
#[must_use]
pub fn ultimate_function_ref(func: &Function, mut value: ValueId) -> Option<FunctionId> {
    loop {
        let inst = func.inst(func.defining_inst(value)?);
        match inst.kind() {
            InstKind::FunctionRef { function } => return Some(*function),
            InstKind::PartialApply { .. }
            | InstKind::ConvertFunction
            | InstKind::ThinToThickFunction => value = inst.operand(0),
            _ => return None,
        }
    }
}

/// A call that returns to the caller: `apply` or `try_apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FullApplySite {
    inst: InstId,
    is_try: bool,
}

impl FullApplySite {
    /// Views `inst` as a full apply site.
    ///
    /// # Returns
    ///
    /// `None` if the instruction is neither `apply` nor `try_apply`.
    #[must_use]
    pub fn new(func: &Function, inst: InstId) -> Option<Self> {
        ApplySite::new(func, inst)?.as_full()
    }

    /// Returns the instruction.
    #[must_use]
    pub const fn inst(&self) -> InstId {
        self.inst
    }

    /// Returns `true` for `try_apply`.
    #[must_use]
    pub const fn is_try(&self) -> bool {
        self.is_try
    }

    /// Returns the general apply site view.
    #[must_use]
    pub const fn site(&self) -> ApplySite {
        ApplySite {
            inst: self.inst,
            kind: if self.is_try {
                ApplyKind::TryApply
            } else {
                ApplyKind::Apply
            },
        }
    }

    /// Returns the callee operand.
    #[must_use]
    pub fn callee(&self, func: &Function) -> ValueId {
        self.site().callee(func)
    }

    /// Returns the SIL arguments, indirect results first.
    #[must_use]
    pub fn arguments<'f>(&self, func: &'f Function) -> &'f [ValueId] {
        self.site().arguments(func)
    }

    /// Returns the substitutions.
    #[must_use]
    pub fn substitutions<'f>(&self, func: &'f Function) -> &'f SubstitutionMap {
        self.site().substitutions(func)
    }

    /// Returns the callee type with the site's substitutions applied.
    #[must_use]
    pub fn subst_callee_type(&self, func: &Function) -> FunctionType {
        self.site().subst_callee_type(func)
    }

    /// Returns the direct result of an `apply`, `None` for `try_apply`.
    #[must_use]
    pub fn result(&self, func: &Function) -> Option<ValueId> {
        if self.is_try {
            None
        } else {
            func.inst(self.inst).result()
        }
    }

    /// Returns the block a `try_apply` continues in on success.
    #[must_use]
    pub fn normal_block(&self, func: &Function) -> Option<BlockId> {
        self.is_try
            .then(|| func.inst(self.inst).successors()[0].block)
    }

    /// Returns the block a `try_apply` continues in when the callee throws.
    #[must_use]
    pub fn error_block(&self, func: &Function) -> Option<BlockId> {
        self.is_try
            .then(|| func.inst(self.inst).successors()[1].block)
    }

    /// Returns `true` if an `apply` is known not to throw.
    #[must_use]
    pub fn is_nonthrowing(&self, func: &Function) -> bool {
        matches!(
            func.inst(self.inst).kind(),
            InstKind::Apply {
                nonthrowing: true,
                ..
            }
        )
    }
}

/// Collects the full apply sites of a function in layout order.
#[must_use]
pub fn full_apply_sites(func: &Function) -> Vec<FullApplySite> {
    func.instructions()
        .filter_map(|(_, inst)| FullApplySite::new(func, inst))
        .collect()
}

/// Collects every apply site of a function in layout order.
#[must_use]
pub fn apply_sites(func: &Function) -> Vec<ApplySite> {
    func.instructions()
        .filter_map(|(_, inst)| ApplySite::new(func, inst))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{FunctionType, Linkage, SubstitutionMap},
        test::fixtures::simple_module,
    };

    #[test]
    fn test_ultimate_callee_looks_through_wrappers() {
        let (mut module, f) = simple_module();
        let callee_ty = FunctionType::thin(vec![], vec![]);
        let g = module
            .create_function("g", callee_ty.clone(), Linkage::Private)
            .unwrap();
        let entry = module.function(f).entry_block().unwrap();
        let mut b = module.builder(f);
        b.position_at_end(entry);
        let r = b.function_ref(g, callee_ty);
        let thick = b.thin_to_thick_function(r);
        let call = b.apply(thick, SubstitutionMap::new(), vec![], false);

        let func = b.function();
        let site = FullApplySite::new(func, call).unwrap();
        assert_eq!(site.site().referenced_function(func), None);
        assert_eq!(site.site().ultimate_callee(func), Some(g));
        assert!(site.result(func).is_some());
        assert_eq!(full_apply_sites(func), vec![site]);
        assert!(ApplySite::new(func, func.defining_inst(r).unwrap()).is_none());
    }
}
