//! Control-flow opcode handlers: branch, jump, call and return.

use crate::error::RuntimeErrorKind;
use crate::error::TinError;
use crate::hash::H32;
use crate::opcode::Instruction;
use crate::vm::ExecutionEngine;

use crate::error::TinResult;

fn target_offset(instr: &Instruction) -> TinResult<u32> {
    let rel = instr.read_i32()?;
    Ok((instr.offset as i64 + instr.size() as i64 + rel as i64) as u32)
}

fn current_frame_mut(engine: &mut ExecutionEngine) -> TinResult<&mut crate::stack::CallFrame> {
    engine
        .stack
        .current_frame_mut()
        .ok_or_else(|| TinError::Runtime(RuntimeErrorKind::IndexOutOfBounds { index: -1, length: 0 }))
}

pub fn branch(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let target = target_offset(instr)?;
    current_frame_mut(engine)?.ip = target;
    Ok(())
}

pub fn jump(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    branch(engine, instr)
}

pub fn branch_if_false(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let cond = engine.stack.pop()?;
    if !cond.is_truthy() {
        let target = target_offset(instr)?;
        current_frame_mut(engine)?.ip = target;
    }
    Ok(())
}

pub fn call(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let name = H32::from(instr.read_u32()?);
    // Advance the caller's ip past this instruction before dispatch: a
    // scripted callee pushes its own frame (with its own fresh ip), and a
    // native callee returns immediately into this same frame, which must
    // not be re-executed from the call instruction.
    current_frame_mut(engine)?.ip += instr.size();
    engine.dispatch_inline_call(H32::NONE, name)
}

pub fn call_method(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let method = H32::from(instr.read_u32()?);
    current_frame_mut(engine)?.ip += instr.size();
    engine.dispatch_inline_method(method)
}

pub fn call_type_method(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let (type_ns_raw, method_raw) = instr.read_u32_pair()?;
    current_frame_mut(engine)?.ip += instr.size();
    engine.dispatch_inline_call(H32::from(type_ns_raw), H32::from(method_raw))
}

/// `Return` takes no operand: it leaves the return cell already sitting in
/// parameter slot 0 (written there by a `PopLocal 0` earlier in the
/// function body) on the stack, per the synthetic-return-slot convention.
/// Slot 0 is cleared to `Void` first so the frame-pop's string-refcount
/// sweep (which walks every cell from the frame's base to the top) does
/// not treat the value being returned as abandoned.
pub fn op_return(engine: &mut ExecutionEngine, _instr: &Instruction) -> TinResult<()> {
    let base = current_frame_mut(engine)?.base;
    let value = engine.stack.read_slot(base, 0)?;
    engine.stack.write_slot(base, 0, crate::value::Cell::void())?;
    engine.finish_frame(value)
}
