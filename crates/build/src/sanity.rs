//! The sanity pass (§7, §8): structural invariant checks run over a just-
//! built function when [`ssa_ir::BuildMode::sanity_check_functions`] is set.
//!
//! Every check here corresponds to an invariant the builder is supposed to
//! maintain by construction; a failure means a builder bug, not a bad
//! input program — the type checker has already rejected anything these
//! invariants would otherwise catch.

use ssa_ir::{Callee, Function, InstrKind, Program, TypeData, Value};

use crate::error::BuildError;

pub fn check_function(program: &Program, func: &Function) -> Result<(), BuildError> {
    check_terminators(func)?;
    check_operand_scope(func)?;
    check_phi_arity(func)?;
    check_call_arity(program, func)?;
    check_generic_arity(program, func)?;
    check_no_degenerate_if(func)?;
    Ok(())
}

/// No `if` has identical true and false targets (§4.3, §4.5): a builder bug
/// that should have lowered straight to `Jump` instead.
fn check_no_degenerate_if(func: &Function) -> Result<(), BuildError> {
    for instr in &func.instrs {
        if let InstrKind::If { then_, else_, .. } = &instr.kind {
            if then_ == else_ {
                return Err(BuildError::SanityFailed {
                    function: func.name.clone(),
                    reason: format!("block {} has an if with identical then/else target {}", instr.block.0, then_.0),
                });
            }
        }
    }
    Ok(())
}

/// Every block ends in exactly one terminator, at the end of its
/// instruction list (§3 BasicBlock invariant).
fn check_terminators(func: &Function) -> Result<(), BuildError> {
    for block in &func.blocks {
        let mut terminator_at = None;
        for (pos, id) in block.instrs.iter().enumerate() {
            if func.instr(*id).kind.is_terminator() {
                if terminator_at.is_some() {
                    return Err(BuildError::SanityFailed {
                        function: func.name.clone(),
                        reason: format!("block {} has more than one terminator", block.index.0),
                    });
                }
                terminator_at = Some(pos);
            }
        }
        match terminator_at {
            Some(pos) if pos == block.instrs.len() - 1 => {}
            Some(_) => {
                return Err(BuildError::SanityFailed {
                    function: func.name.clone(),
                    reason: format!("block {} has instructions after its terminator", block.index.0),
                });
            }
            None => {
                return Err(BuildError::SanityFailed {
                    function: func.name.clone(),
                    reason: format!("block {} has no terminator", block.index.0),
                });
            }
        }
    }
    Ok(())
}

/// Every `Param`/`FreeVar` operand index resolves within this function's own
/// frame, and every `Instr` operand resolves within this function's own
/// instruction list (§3 invariant 3: "every operand belongs to the same
/// function"). Since `Value::Instr` carries a plain array index rather than
/// an owning `FunctionId`, an out-of-range index is the only way that
/// invariant can be violated in this data model — it would mean two
/// functions' instruction lists got stitched together by mistake.
fn check_operand_scope(func: &Function) -> Result<(), BuildError> {
    for instr in &func.instrs {
        for operand in instr.kind.operands() {
            match operand {
                Value::Instr(id) if (id.0 as usize) >= func.instrs.len() => {
                    return Err(BuildError::CrossFunctionOperand { function: func.name.clone() });
                }
                Value::Param(idx) if (*idx as usize) >= func.params.len() => {
                    return Err(BuildError::CrossFunctionOperand { function: func.name.clone() });
                }
                Value::FreeVar(idx) if (*idx as usize) >= func.free_vars.len() => {
                    return Err(BuildError::CrossFunctionOperand { function: func.name.clone() });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// A phi's edge count equals its block's predecessor count (§4.4, §8).
fn check_phi_arity(func: &Function) -> Result<(), BuildError> {
    for instr in &func.instrs {
        if let InstrKind::Phi { edges } = &instr.kind {
            let expected = func.block(instr.block).preds.len();
            if edges.len() != expected {
                return Err(BuildError::PhiArityMismatch {
                    block: instr.block.0,
                    expected,
                    got: edges.len(),
                });
            }
        }
    }
    Ok(())
}

/// A statically resolved call's argument count matches the callee's
/// parameter count, accounting for a variadic tail (§4.3 "Calls").
fn check_call_arity(program: &Program, func: &Function) -> Result<(), BuildError> {
    for instr in &func.instrs {
        let cc = match &instr.kind {
            InstrKind::Call(cc) | InstrKind::Go(cc) | InstrKind::Defer(cc) => cc,
            _ => continue,
        };
        let Callee::Static { target: Some(target), .. } = &cc.callee else { continue };
        let Some(callee) = program.function(*target) else { continue };
        let TypeData::Signature(sig) = callee.signature.data() else { continue };
        let expected = sig.params.len();
        let got = cc.args.len();
        let arity_ok = if sig.variadic { got + 1 >= expected } else { got == expected };
        if !arity_ok {
            return Err(BuildError::WrongCallArity { callee: callee.name.clone(), expected, got });
        }
    }
    Ok(())
}

/// A generic instantiation's type-argument count matches its origin's
/// type-parameter count (§4.3 "Generic instantiation", §6.4).
fn check_generic_arity(program: &Program, func: &Function) -> Result<(), BuildError> {
    let Some(origin_id) = func.origin else { return Ok(()) };
    let Some(type_args) = &func.type_args else { return Ok(()) };
    let Some(origin) = program.function(origin_id) else { return Ok(()) };
    let TypeData::Signature(sig) = origin.signature.data() else { return Ok(()) };
    let expected = sig.type_params.len();
    let got = type_args.len();
    if expected != got {
        return Err(BuildError::WrongGenericArity { function: func.name.clone(), expected, got });
    }
    Ok(())
}
