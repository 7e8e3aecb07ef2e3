//! Basic blocks.
//!
//! A block owns an ordered list of instructions, the last of which is its terminator, and
//! an ordered list of arguments. Arguments play the role of phi nodes: every branch to the
//! block passes one value per argument. The arguments of the entry block are the
//! function's arguments.
//!
//! The predecessor list mirrors the successor edges of all terminators targeting the
//! block. It is maintained by the function whenever a terminator is created, retargeted
//! or erased.

use crate::ir::{instruction::InstId, value::ValueId};

entity_id!(
    /// Handle of a block in its function's block arena.
    BlockId, "bb"
);

/// One incoming control flow edge: successor `index` of terminator `inst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PredecessorEdge {
    /// The terminator
    pub inst: InstId,
    /// Which of its successors points here
    pub index: usize,
}

/// Arena entry of a basic block.
#[derive(Debug, Clone, Default)]
pub struct Block {
    args: Vec<ValueId>,
    insts: Vec<InstId>,
    preds: Vec<PredecessorEdge>,
}

impl Block {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the block arguments.
    #[must_use]
    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    /// Returns the instructions in order.
    #[must_use]
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    /// Returns `true` if the block has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Returns the last instruction.
    #[must_use]
    pub fn last_inst(&self) -> Option<InstId> {
        self.insts.last().copied()
    }

    /// Returns the incoming edges.
    #[must_use]
    pub fn predecessor_edges(&self) -> &[PredecessorEdge] {
        &self.preds
    }

    pub(crate) fn push_arg(&mut self, value: ValueId) -> usize {
        self.args.push(value);
        self.args.len() - 1
    }

    pub(crate) fn set_arg(&mut self, index: usize, value: ValueId) {
        self.args[index] = value;
    }

    pub(crate) fn insert_inst(&mut self, position: usize, inst: InstId) {
        self.insts.insert(position, inst);
    }

    pub(crate) fn position_of(&self, inst: InstId) -> Option<usize> {
        self.insts.iter().position(|i| *i == inst)
    }

    pub(crate) fn remove_inst(&mut self, inst: InstId) {
        if let Some(pos) = self.position_of(inst) {
            self.insts.remove(pos);
        }
    }

    pub(crate) fn add_pred(&mut self, edge: PredecessorEdge) {
        self.preds.push(edge);
    }

    pub(crate) fn remove_pred(&mut self, edge: PredecessorEdge) {
        if let Some(pos) = self.preds.iter().position(|p| *p == edge) {
            self.preds.remove(pos);
        }
    }
}

impl std::fmt::Display for PredecessorEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.inst, self.index)
    }
}
