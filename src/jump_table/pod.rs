//! POD member access opcode handlers: read/write a registered member of a
//! POD value, e.g. `vector3f`'s `x`/`y`/`z` member table.

use crate::error::{LinkErrorKind, TinError};
use crate::hash::H32;
use crate::opcode::Instruction;
use crate::value::Cell;
use crate::vm::ExecutionEngine;

use crate::error::TinResult;

/// Pops a POD cell and pushes the member's value, read out of its byte
/// offset within the cell's 16-byte payload.
pub fn push_pod_member(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let member = H32::from(instr.read_u32()?);
    let pod = engine.stack.pop()?;
    match engine.types.pod_member(pod.kind(), member) {
        Some(m) => {
            let bytes = pod.raw_bytes();
            let mut cell = Cell::default_for(m.var_type);
            cell.raw_bytes_mut()[..m.var_type.size()].copy_from_slice(&bytes[m.offset..m.offset + m.var_type.size()]);
            engine.stack.push(cell)
        }
        None => {
            engine.record_error(TinError::Link(LinkErrorKind::UnresolvedMember {
                namespace: H32::NONE,
                member,
            }));
            engine.stack.push(Cell::void())
        }
    }
}

/// Stack: `[..., pod]`, with the new member value on top (already popped
/// here as `value`). Mutates the popped POD cell in place and pushes it
/// back — callers that need the mutation visible elsewhere (a variable,
/// a member) follow this with a `PopLocal`/`PopToVariable`/`PopToMember`.
pub fn pop_pod_member(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let member = H32::from(instr.read_u32()?);
    let value = engine.stack.pop()?;
    let mut pod = engine.stack.pop()?;
    match engine.types.pod_member(pod.kind(), member) {
        Some(m) => {
            if value.kind() == m.var_type {
                let size = m.var_type.size();
                let src = *value.raw_bytes();
                pod.raw_bytes_mut()[m.offset..m.offset + size].copy_from_slice(&src[..size]);
            } else if let Some(converted) = engine.types.convert(&value, m.var_type) {
                let size = m.var_type.size();
                let src = *converted.raw_bytes();
                pod.raw_bytes_mut()[m.offset..m.offset + size].copy_from_slice(&src[..size]);
            }
            engine.stack.push(pod)
        }
        None => {
            engine.record_error(TinError::Link(LinkErrorKind::UnresolvedMember {
                namespace: H32::NONE,
                member,
            }));
            engine.stack.push(pod)
        }
    }
}
