//! Structural verifier.
//!
//! Checks the invariants every transformation must preserve:
//!
//! - every block ends in exactly one terminator, which is its last instruction
//! - terminators have as many successors as their kind declares
//! - branches pass as many arguments as their destination block takes
//! - each operand appears in its value's use-list and each use-list entry names an operand
//!   that refers back to the value
//! - each successor edge appears in the target block's predecessor list and vice versa
//! - operands refer to values whose definition is still alive
//!
//! The verifier is a debugging aid for tests and pass drivers. It never mutates the IR.

use crate::{
    ir::{
        block::{BlockId, PredecessorEdge},
        function::{Function, FunctionId},
        instruction::{InstId, InstKind, InstShape},
        module::Module,
        value::{Operand, ValueDef},
    },
    Error, Result,
};

/// Verifies the body of one function.
///
/// Declarations without a body are trivially valid.
///
/// # Errors
///
/// Returns [`Error::Verification`] describing the first violated invariant.
pub fn verify_function(module: &Module, id: FunctionId) -> Result<()> {
    let func = module.function(id);
    check_function(func).map_err(|err| match err {
        Error::Malformed { message, .. } => Error::Verification {
            function: func.name().to_string(),
            message,
        },
        other => other,
    })
}

/// Verifies every live function of a module.
///
/// # Errors
///
/// Returns the error of the first function that fails verification.
pub fn verify_module(module: &Module) -> Result<()> {
    for id in module.functions() {
        verify_function(module, id)?;
    }
    Ok(())
}

fn check_function(func: &Function) -> Result<()> {
    for block in func.blocks() {
        check_block(func, block)?;
    }
    check_use_lists(func)
}

fn check_block(func: &Function, block: BlockId) -> Result<()> {
    let insts = func.block_insts(block);
    let Some((&last, body)) = insts.split_last() else {
        return Err(malformed_error!("{} is empty", block));
    };
    if !func.inst(last).is_terminator() {
        return Err(malformed_error!("{} does not end in a terminator", block));
    }
    for &inst in body {
        if func.inst(inst).is_terminator() {
            return Err(malformed_error!(
                "{} has terminator {} before its end",
                block,
                inst
            ));
        }
    }
    for &inst in insts {
        check_inst(func, block, inst)?;
    }
    for edge in func.block(block).predecessor_edges() {
        if !func.contains_inst(edge.inst) {
            return Err(malformed_error!(
                "{} lists predecessor edge {} of an erased instruction",
                block,
                edge
            ));
        }
        let targets = func.inst(edge.inst).successors();
        if targets.get(edge.index).map(|e| e.block) != Some(block) {
            return Err(malformed_error!(
                "{} lists predecessor edge {} which does not target it",
                block,
                edge
            ));
        }
    }
    Ok(())
}

fn check_inst(func: &Function, block: BlockId, id: InstId) -> Result<()> {
    let inst = func.inst(id);
    let opcode = inst.opcode();
    if inst.parent() != Some(block) {
        return Err(malformed_error!("{} is listed in {} but not parented there", id, block));
    }

    match opcode.shape() {
        InstShape::NonValue if !inst.results().is_empty() => {
            return Err(malformed_error!("{} {} must not have results", opcode, id));
        }
        InstShape::SingleValue if inst.results().len() != 1 => {
            return Err(malformed_error!("{} {} must have exactly one result", opcode, id));
        }
        _ => {}
    }

    let successors = inst.successors();
    match opcode.successor_arity() {
        Some(arity) if !arity.accepts(successors.len()) => {
            return Err(malformed_error!(
                "{} {} has {} successors",
                opcode,
                id,
                successors.len()
            ));
        }
        None if !successors.is_empty() => {
            return Err(malformed_error!("non-terminator {} {} has successors", opcode, id));
        }
        _ => {}
    }

    match inst.kind() {
        InstKind::SwitchEnum { cases, has_default } => {
            check_case_count(id, cases.len(), *has_default, successors.len())?;
        }
        InstKind::SwitchValue { cases, has_default } => {
            check_case_count(id, cases.len(), *has_default, successors.len())?;
        }
        InstKind::Branch | InstKind::CondBranch { .. } => {
            for (index, edge) in successors.iter().enumerate() {
                let passed = inst.successor_args(index).len();
                let expected = func.block_args(edge.block).len();
                if passed != expected {
                    return Err(malformed_error!(
                        "{} passes {} arguments to {} which takes {}",
                        id,
                        passed,
                        edge.block,
                        expected
                    ));
                }
            }
        }
        _ => {}
    }

    for (index, edge) in successors.iter().enumerate() {
        if !func.contains_block(edge.block) {
            return Err(malformed_error!("{} branches to erased {}", id, edge.block));
        }
        let pred = PredecessorEdge { inst: id, index };
        if !func.block(edge.block).predecessor_edges().contains(&pred) {
            return Err(malformed_error!(
                "{} is missing predecessor edge {}",
                edge.block,
                pred
            ));
        }
    }

    for (index, &value) in inst.operands().iter().enumerate() {
        if func.value(value).def() == ValueDef::Erased {
            return Err(malformed_error!(
                "operand {} of {} refers to {} whose definition was erased",
                index,
                id,
                value
            ));
        }
        if !func.uses(value).contains(&Operand::new(id, index)) {
            return Err(malformed_error!(
                "operand {} of {} is missing from the use-list of {}",
                index,
                id,
                value
            ));
        }
    }
    Ok(())
}

fn check_case_count(id: InstId, cases: usize, has_default: bool, successors: usize) -> Result<()> {
    if cases + usize::from(has_default) == successors {
        Ok(())
    } else {
        Err(malformed_error!(
            "{} has {} cases but {} successors",
            id,
            cases,
            successors
        ))
    }
}

fn check_use_lists(func: &Function) -> Result<()> {
    for value in func.values() {
        for op in func.uses(value) {
            if !func.contains_inst(op.inst) {
                return Err(malformed_error!(
                    "use-list of {} names erased instruction {}",
                    value,
                    op.inst
                ));
            }
            let inst = func.inst(op.inst);
            if inst.operands().get(op.index) != Some(&value) {
                return Err(malformed_error!(
                    "use-list of {} names operand {} of {} which refers elsewhere",
                    value,
                    op.index,
                    op.inst
                ));
            }
        }
    }
    Ok(())
}
