//! Object lifecycle opcode handlers: create, destroy, `is-a`.

use crate::error::{LinkErrorKind, TinError};
use crate::hash::H32;
use crate::opcode::Instruction;
use crate::value::Cell;
use crate::vm::ExecutionEngine;

use crate::error::TinResult;

/// Stack: `[..., name]` (a string handle, possibly `H32::NONE`/void for an
/// anonymous object). Pushes the new object-id, or `0` if the class
/// namespace has no registered host factory.
pub fn object_create(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let class_ns = H32::from(instr.read_u32()?);
    let name_cell = engine.stack.pop()?;
    let name = if name_cell.kind() == crate::value::VarType::StringHandle {
        name_cell.as_string_handle()
    } else {
        H32::NONE
    };
    match engine.objects.create_scripted(class_ns, name) {
        Some(id) => engine.stack.push(Cell::from_object_id(id)),
        None => {
            engine.record_error(TinError::Link(LinkErrorKind::UnresolvedClass(class_ns)));
            engine.stack.push(Cell::from_object_id(0))
        }
    }
}

/// Stack: `[..., object_id]`. Destroys the object; a no-op (but still
/// recorded) if it is already dead or unknown.
pub fn object_destroy(engine: &mut ExecutionEngine, _instr: &Instruction) -> TinResult<()> {
    let id = engine.stack.pop()?.as_object_id();
    let strings = &mut engine.strings;
    engine.objects.destroy_with_string_release(id, |h| strings.refdec(h));
    Ok(())
}

/// Stack: `[..., object_id]`. Pushes a bool: whether the object's class is
/// `target_ns` or a descendant of it.
pub fn object_is_a(engine: &mut ExecutionEngine, instr: &Instruction) -> TinResult<()> {
    let target_ns = H32::from(instr.read_u32()?);
    let id = engine.stack.pop()?.as_object_id();
    let result = engine
        .objects
        .get(id)
        .map(|o| engine.namespaces.is_a(o.namespace, target_ns))
        .unwrap_or(false);
    engine.stack.push(Cell::from_bool(result))
}
