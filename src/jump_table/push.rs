//! Push/pop opcode handlers: literals, locals, namespace/member variables
//! and array elements.

use crate::error::{LinkErrorKind, RuntimeErrorKind, TinError};
use crate::hash::H32;
use crate::opcode::Instruction;
use crate::value::Cell;
use crate::vm::ExecutionEngine;

use crate::error::TinResult;

pub fn push_literal_int(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    engine.stack.push(Cell::from_int(instr.read_i32()?))
}

pub fn push_literal_float(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    engine.stack.push(Cell::from_float(instr.read_f32()?))
}

pub fn push_literal_bool(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let v = instr.operand.first().copied().unwrap_or(0) != 0;
    engine.stack.push(Cell::from_bool(v))
}

/// The operand is the `H32` of a string already interned (by the bytecode
/// loader's constant pool) into [`crate::hash::StringTable`]. Pushing a
/// literal takes a fresh logical reference, balanced by the refdec any
/// frame-pop or overwrite performs on the cell.
pub fn push_literal_string(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let hash = H32::from(instr.read_u32()?);
    engine.strings.refinc(hash);
    engine.stack.push(Cell::from_string_handle(hash))
}

pub fn push_local(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let offset = instr.read_u32()? as usize;
    let base = engine
        .stack
        .current_frame()
        .ok_or_else(|| TinError::Runtime(RuntimeErrorKind::IndexOutOfBounds { index: -1, length: 0 }))?
        .base;
    let cell = engine.stack.read_slot(base, offset)?;
    engine.stack.push(cell)
}

pub fn pop_local(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let offset = instr.read_u32()? as usize;
    let base = engine
        .stack
        .current_frame()
        .ok_or_else(|| TinError::Runtime(RuntimeErrorKind::IndexOutOfBounds { index: -1, length: 0 }))?
        .base;
    let value = engine.stack.pop()?;
    engine.stack.write_slot(base, offset, value)?;
    // Locals have no name table at runtime (only parameters do); report the
    // owning function and an anonymous name rather than fabricate one.
    let owner = engine.stack.current_frame().map(|f| f.function).unwrap_or(H32::NONE);
    engine.debugger.fire_variable_write(owner, H32::NONE, &value);
    Ok(())
}

pub fn push_variable(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let (ns_raw, name_raw) = instr.read_u32_pair()?;
    let (ns, name) = (H32::from(ns_raw), H32::from(name_raw));
    let value = match engine.namespaces.lookup_member(ns, name, true).and_then(|ve| ve.inline_value()) {
        Some(c) => c,
        None => {
            engine.record_error(TinError::Link(LinkErrorKind::UnresolvedMember { namespace: ns, member: name }));
            Cell::void()
        }
    };
    engine.stack.push(value)
}

pub fn pop_to_variable(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let (ns_raw, name_raw) = instr.read_u32_pair()?;
    let (ns, name) = (H32::from(ns_raw), H32::from(name_raw));
    let value = engine.stack.pop()?;
    let ve = engine.namespaces.get_or_create_variable(ns, name, value.kind());
    ve.set_inline_value(value);
    engine.debugger.fire_variable_write(ns, name, &value);
    Ok(())
}

pub fn push_member(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let (object_id, member_raw) = instr.read_u32_pair()?;
    let member = H32::from(member_raw);
    if object_id == 0 {
        engine.record_error(TinError::Runtime(RuntimeErrorKind::NilObjectId));
        return engine.stack.push(Cell::void());
    }
    let value = engine
        .objects
        .get(object_id)
        .and_then(|o| o.dynamic_vars.get(&member))
        .and_then(|ve| ve.inline_value());
    match value {
        Some(c) => engine.stack.push(c),
        None => {
            engine.record_error(TinError::Runtime(RuntimeErrorKind::ObjectNotAlive(object_id)));
            engine.stack.push(Cell::void())
        }
    }
}

pub fn pop_to_member(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let (object_id, member_raw) = instr.read_u32_pair()?;
    let member = H32::from(member_raw);
    let value = engine.stack.pop()?;
    if object_id == 0 {
        engine.record_error(TinError::Runtime(RuntimeErrorKind::NilObjectId));
        return Ok(());
    }
    let owner = engine.objects.get(object_id).map(|o| o.namespace).unwrap_or(H32::NONE);
    match engine.objects.get_or_create_dynamic_var(object_id, member, value.kind()) {
        Some(ve) => {
            ve.set_inline_value(value);
            engine.debugger.fire_variable_write(owner, member, &value);
            Ok(())
        }
        None => {
            engine.record_error(TinError::Runtime(RuntimeErrorKind::ObjectNotAlive(object_id)));
            Ok(())
        }
    }
}

pub fn push_array_element(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let name = H32::from(instr.read_u32()?);
    let index = engine.stack.pop()?.as_int();
    let value = engine.namespaces.lookup_member(H32::NONE, name, false).and_then(|ve| {
        if index < 0 {
            None
        } else {
            ve.array_get(index as usize)
        }
    });
    match value {
        Some(c) => engine.stack.push(c),
        None => {
            let length = engine
                .namespaces
                .get(H32::NONE)
                .and_then(|ns| ns.variables.get(&name))
                .map(|ve| ve.array_len())
                .unwrap_or(0);
            engine.record_error(TinError::Runtime(RuntimeErrorKind::IndexOutOfBounds {
                index: index as i64,
                length,
            }));
            engine.stack.push(Cell::void())
        }
    }
}

pub fn pop_to_array_element(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let name = H32::from(instr.read_u32()?);
    let index = engine.stack.pop()?.as_int();
    let value = engine.stack.pop()?;
    let ve = engine.namespaces.get_or_create_variable(H32::NONE, name, value.kind());
    if index < 0 || !ve.array_set(index as usize, value) {
        let length = ve.array_len();
        engine.record_error(TinError::Runtime(RuntimeErrorKind::IndexOutOfBounds {
            index: index as i64,
            length,
        }));
    } else {
        engine.debugger.fire_variable_write(H32::NONE, name, &value);
    }
    Ok(())
}

pub fn dup(engine: &mut ExecutionEngine, _instr: &Instruction) -> TinResult<()> {
    let top = engine.stack.peek(0)?;
    engine.stack.push(top)
}

pub fn pop(engine: &mut ExecutionEngine, _instr: &Instruction) -> TinResult<()> {
    engine.stack.pop().map(|_| ())
}
