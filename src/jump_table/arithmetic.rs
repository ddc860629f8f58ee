//! Arithmetic and bitwise/logical opcode handlers.
//!
//! Operands are popped rhs-then-lhs (rhs was pushed last); a registered
//! per-type operator override (vector3f's `+`/`-`) is tried before the
//! default numeric coercion, and `+` on any string operand concatenates.

use crate::error::{RuntimeErrorKind, TinError, TypeErrorKind};
use crate::opcode::Instruction;
use crate::types::BinOp;
use crate::value::{Cell, VarType};
use crate::vm::ExecutionEngine;

use crate::error::TinResult;

fn binary(engine: &mut ExecutionEngine, op: BinOp) -> TinResult<()> {
    let rhs = engine.stack.pop()?;
    let lhs = engine.stack.pop()?;

    if lhs.kind() == VarType::StringHandle || rhs.kind() == VarType::StringHandle {
        if matches!(op, BinOp::Add) {
            let mut s = engine.cell_to_display_string(&lhs);
            s.push_str(&engine.cell_to_display_string(&rhs));
            let cell = engine.intern_to_cell(&s);
            return engine.stack.push(cell);
        }
    }

    // A vector3f*scalar override may be registered on either operand's type
    // (`vector3f * float` looks it up via lhs, `float * vector3f` via rhs).
    let override_handler = engine.types.op_override(lhs.kind()).or_else(|| engine.types.op_override(rhs.kind()));
    if let Some(handler) = override_handler {
        if let Some(result) = handler(op, &lhs, &rhs) {
            return engine.stack.push(result);
        }
    }

    let target = VarType::default_numeric(lhs.kind(), rhs.kind());
    let computed = (|| -> TinResult<Cell> {
        let l = engine.types.convert_or_err(&lhs, target)?;
        let r = engine.types.convert_or_err(&rhs, target)?;
        compute_numeric(op, target, &l, &r)
    })();
    let default = Cell::default_for(target);
    let result = engine.recoverable(computed, default)?;
    engine.stack.push(result)
}

fn compute_numeric(op: BinOp, target: VarType, l: &Cell, r: &Cell) -> TinResult<Cell> {
    if target == VarType::Float32 {
        let (a, b) = (l.as_float(), r.as_float());
        return Ok(match op {
            BinOp::Add => Cell::from_float(a + b),
            BinOp::Sub => Cell::from_float(a - b),
            BinOp::Mul => Cell::from_float(a * b),
            // Float divide by zero produces the host's float-math result
            // (+-inf/NaN) rather than raising.
            BinOp::Div => Cell::from_float(a / b),
            BinOp::Mod => Cell::from_float(a % b),
            _ => {
                return Err(TinError::Type(TypeErrorKind::NoOperator {
                    op: "bitwise",
                    ty: "float32",
                }))
            }
        });
    }
    let (a, b) = (l.as_int(), r.as_int());
    Ok(match op {
        BinOp::Add => Cell::from_int(a.wrapping_add(b)),
        BinOp::Sub => Cell::from_int(a.wrapping_sub(b)),
        BinOp::Mul => Cell::from_int(a.wrapping_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return Err(TinError::Runtime(RuntimeErrorKind::IntegerDivideByZero));
            }
            Cell::from_int(a.wrapping_div(b))
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(TinError::Runtime(RuntimeErrorKind::IntegerDivideByZero));
            }
            Cell::from_int(a.wrapping_rem(b))
        }
        BinOp::Shl => Cell::from_int(a.wrapping_shl(b as u32)),
        BinOp::Shr => Cell::from_int(a.wrapping_shr(b as u32)),
        BinOp::And => Cell::from_int(a & b),
        BinOp::Or => Cell::from_int(a | b),
        BinOp::Xor => Cell::from_int(a ^ b),
        BinOp::BoolAnd => Cell::from_bool(l.is_truthy() && r.is_truthy()),
        BinOp::BoolOr => Cell::from_bool(l.is_truthy() || r.is_truthy()),
        _ => {
            return Err(TinError::Type(TypeErrorKind::NoOperator {
                op: "comparison",
                ty: "int32",
            }))
        }
    })
}

pub fn add(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::Add)
}
pub fn sub(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::Sub)
}
pub fn mul(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::Mul)
}
pub fn div(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::Div)
}
pub fn modulo(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::Mod)
}
pub fn shl(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::Shl)
}
pub fn shr(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::Shr)
}
pub fn bitand(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::And)
}
pub fn bitor(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::Or)
}
pub fn bitxor(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::Xor)
}
pub fn booland(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::BoolAnd)
}
pub fn boolor(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    binary(engine, BinOp::BoolOr)
}

pub fn not(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    let v = engine.stack.pop()?;
    engine.stack.push(Cell::from_bool(!v.is_truthy()))
}

pub fn neg(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    let v = engine.stack.pop()?;
    let result = match v.kind() {
        VarType::Float32 => Cell::from_float(-v.as_float()),
        _ => Cell::from_int(-v.as_int()),
    };
    engine.stack.push(result)
}
