//! SSA values, operands and ownership kinds.
//!
//! Every value is defined exactly once: by an instruction result, by a block argument, or
//! as the function's `undef` of some type. Values live in the arena of their function and
//! are referenced through [`ValueId`] handles.
//!
//! # Use-lists
//!
//! A use is an [`Operand`]: the pair of the using instruction and the operand position.
//! Each value keeps a vector of the operands that reference it, in the order the uses were
//! created. Rebinding an operand removes it from the old value's list and appends it to
//! the new one, so [`Function::replace_all_uses_with`](crate::ir::Function::replace_all_uses_with)
//! preserves the relative order of the moved uses.

use std::fmt;

use crate::ir::{
    block::BlockId,
    instruction::InstId,
    types::{ArgumentConvention, ParamConvention, SilType},
};

entity_id!(
    /// Handle of a value in its function's value arena.
    ValueId, "%"
);

/// How the lifetime of a value is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipKind {
    /// No lifetime to manage, e.g. integers and addresses
    Trivial,
    /// Not kept alive by this value
    Unowned,
    /// The holder must consume the value
    Owned,
    /// Kept alive by someone else for the value's scope
    Guaranteed,
    /// Compatible with every other kind
    Any,
}

impl OwnershipKind {
    /// Merges two ownership kinds.
    ///
    /// `Any` merges with everything and yields the other kind; otherwise the kinds must be
    /// equal. Returns `None` if they conflict.
    #[must_use]
    pub fn merge(self, other: OwnershipKind) -> Option<OwnershipKind> {
        match (self, other) {
            (OwnershipKind::Any, k) | (k, OwnershipKind::Any) => Some(k),
            (a, b) if a == b => Some(a),
            _ => None,
        }
    }

    /// Derives the ownership kind of a function argument.
    ///
    /// Trivial types are always trivial. Indirect arguments are addresses and therefore
    /// trivial too.
    #[must_use]
    pub fn for_argument(convention: ArgumentConvention, trivial: bool) -> OwnershipKind {
        if trivial {
            return OwnershipKind::Trivial;
        }
        match convention {
            ArgumentConvention::IndirectOut => OwnershipKind::Trivial,
            ArgumentConvention::Param(p) => match p {
                ParamConvention::IndirectIn
                | ParamConvention::IndirectInGuaranteed
                | ParamConvention::IndirectInout => OwnershipKind::Trivial,
                ParamConvention::DirectOwned => OwnershipKind::Owned,
                ParamConvention::DirectUnowned => OwnershipKind::Unowned,
                ParamConvention::DirectGuaranteed => OwnershipKind::Guaranteed,
            },
        }
    }
}

impl fmt::Display for OwnershipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OwnershipKind::Trivial => "trivial",
            OwnershipKind::Unowned => "unowned",
            OwnershipKind::Owned => "owned",
            OwnershipKind::Guaranteed => "guaranteed",
            OwnershipKind::Any => "any",
        };
        f.write_str(name)
    }
}

/// What defines a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// Result `index` of instruction `inst`
    InstResult {
        /// The defining instruction
        inst: InstId,
        /// Position among the instruction's results
        index: usize,
    },
    /// Argument `index` of `block`; arguments of the entry block are function arguments
    BlockArg {
        /// The owning block
        block: BlockId,
        /// Position among the block's arguments
        index: usize,
    },
    /// The `undef` value of its type
    Undef,
    /// Defined by an instruction or block that has been erased
    Erased,
}

/// A use of a value: operand `index` of instruction `inst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    /// The using instruction
    pub inst: InstId,
    /// Position in the instruction's operand array
    pub index: usize,
}

impl Operand {
    /// Creates an operand handle.
    #[must_use]
    pub const fn new(inst: InstId, index: usize) -> Self {
        Self { inst, index }
    }
}

/// Arena entry of a value.
#[derive(Debug, Clone)]
pub struct ValueData {
    ty: SilType,
    ownership: OwnershipKind,
    def: ValueDef,
    uses: Vec<Operand>,
}

impl ValueData {
    pub(crate) fn new(ty: SilType, ownership: OwnershipKind, def: ValueDef) -> Self {
        Self {
            ty,
            ownership,
            def,
            uses: Vec::new(),
        }
    }

    /// Returns the value's type.
    #[must_use]
    pub const fn ty(&self) -> &SilType {
        &self.ty
    }

    /// Returns the value's ownership kind.
    #[must_use]
    pub const fn ownership(&self) -> OwnershipKind {
        self.ownership
    }

    /// Returns the definition of the value.
    #[must_use]
    pub const fn def(&self) -> ValueDef {
        self.def
    }

    /// Returns the uses in creation order.
    #[must_use]
    pub fn uses(&self) -> &[Operand] {
        &self.uses
    }

    /// Returns `true` if nothing uses the value.
    #[must_use]
    pub fn use_empty(&self) -> bool {
        self.uses.is_empty()
    }

    pub(crate) fn add_use(&mut self, op: Operand) {
        self.uses.push(op);
    }

    pub(crate) fn remove_use(&mut self, op: Operand) {
        if let Some(pos) = self.uses.iter().position(|u| *u == op) {
            self.uses.remove(pos);
        }
    }

    pub(crate) fn take_uses(&mut self) -> Vec<Operand> {
        std::mem::take(&mut self.uses)
    }

    pub(crate) fn set_def(&mut self, def: ValueDef) {
        self.def = def;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_merge() {
        use OwnershipKind::*;
        assert_eq!(Any.merge(Owned), Some(Owned));
        assert_eq!(Guaranteed.merge(Any), Some(Guaranteed));
        assert_eq!(Owned.merge(Owned), Some(Owned));
        assert_eq!(Owned.merge(Guaranteed), None);
        assert_eq!(Trivial.merge(Unowned), None);
    }

    #[test]
    fn test_ownership_for_argument() {
        use ParamConvention::*;
        assert_eq!(
            OwnershipKind::for_argument(ArgumentConvention::Param(DirectOwned), true),
            OwnershipKind::Trivial
        );
        assert_eq!(
            OwnershipKind::for_argument(ArgumentConvention::Param(DirectOwned), false),
            OwnershipKind::Owned
        );
        assert_eq!(
            OwnershipKind::for_argument(ArgumentConvention::Param(DirectGuaranteed), false),
            OwnershipKind::Guaranteed
        );
        assert_eq!(
            OwnershipKind::for_argument(ArgumentConvention::Param(IndirectIn), false),
            OwnershipKind::Trivial
        );
        assert_eq!(
            OwnershipKind::for_argument(ArgumentConvention::IndirectOut, false),
            OwnershipKind::Trivial
        );
    }

    #[test]
    fn test_use_list_order() {
        let mut data = ValueData::new(
            SilType::object(crate::ir::types::Type::int(8)),
            OwnershipKind::Trivial,
            ValueDef::Undef,
        );
        let a = Operand::new(InstId::new(0), 0);
        let b = Operand::new(InstId::new(1), 1);
        let c = Operand::new(InstId::new(2), 0);
        data.add_use(a);
        data.add_use(b);
        data.add_use(c);
        data.remove_use(b);
        assert_eq!(data.uses(), &[a, c]);
        assert_eq!(data.take_uses(), vec![a, c]);
        assert!(data.use_empty());
    }
}
