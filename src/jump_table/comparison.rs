//! Comparison opcode handlers.
//!
//! Results are pushed as `int32` `0`/`1`, not `bool`, to preserve the
//! bitwise-friendly semantics the compiler expects; a registered operator
//! override (vector3f) may substitute its own convention, documented at
//! [`crate::types`] as an intentional, preserved inversion for equality.

use crate::opcode::Instruction;
use crate::types::BinOp;
use crate::value::{Cell, VarType};
use crate::vm::ExecutionEngine;

use crate::error::TinResult;

fn compare(engine: &mut ExecutionEngine, op: BinOp) -> TinResult<()> {
    let rhs = engine.stack.pop()?;
    let lhs = engine.stack.pop()?;

    if let Some(handler) = engine.types.op_override(lhs.kind()) {
        if let Some(result) = handler(op, &lhs, &rhs) {
            return engine.stack.push(result);
        }
    }

    if lhs.kind() == VarType::StringHandle && rhs.kind() == VarType::StringHandle {
        let a = engine.cell_to_display_string(&lhs);
        let b = engine.cell_to_display_string(&rhs);
        let result = match op {
            BinOp::CompareEqual => a == b,
            BinOp::CompareNotEqual => a != b,
            BinOp::CompareLess => a < b,
            BinOp::CompareLessEqual => a <= b,
            BinOp::CompareGreater => a > b,
            BinOp::CompareGreaterEqual => a >= b,
            _ => false,
        };
        return engine.stack.push(Cell::from_int(result as i32));
    }

    let target = VarType::default_numeric(lhs.kind(), rhs.kind());
    let l = engine.types.convert(&lhs, target).unwrap_or(lhs);
    let r = engine.types.convert(&rhs, target).unwrap_or(rhs);
    let result = if target == VarType::Float32 {
        let (a, b) = (l.as_float(), r.as_float());
        match op {
            BinOp::CompareEqual => a == b,
            BinOp::CompareNotEqual => a != b,
            BinOp::CompareLess => a < b,
            BinOp::CompareLessEqual => a <= b,
            BinOp::CompareGreater => a > b,
            BinOp::CompareGreaterEqual => a >= b,
            _ => false,
        }
    } else {
        let (a, b) = (l.as_int(), r.as_int());
        match op {
            BinOp::CompareEqual => a == b,
            BinOp::CompareNotEqual => a != b,
            BinOp::CompareLess => a < b,
            BinOp::CompareLessEqual => a <= b,
            BinOp::CompareGreater => a > b,
            BinOp::CompareGreaterEqual => a >= b,
            _ => false,
        }
    };
    engine.stack.push(Cell::from_int(result as i32))
}

pub fn cmp_eq(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    compare(engine, BinOp::CompareEqual)
}
pub fn cmp_ne(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    compare(engine, BinOp::CompareNotEqual)
}
pub fn cmp_lt(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    compare(engine, BinOp::CompareLess)
}
pub fn cmp_le(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    compare(engine, BinOp::CompareLessEqual)
}
pub fn cmp_gt(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    compare(engine, BinOp::CompareGreater)
}
pub fn cmp_ge(engine: &mut ExecutionEngine, _i: &Instruction) -> TinResult<()> {
    compare(engine, BinOp::CompareGreaterEqual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Instruction;
    use crate::opcode::OpCode;

    fn instr() -> Instruction {
        Instruction {
            opcode: OpCode::CmpLt,
            offset: 0,
            operand: vec![],
        }
    }

    #[test]
    fn comparison_result_is_int32_not_bool() {
        let mut engine = ExecutionEngine::new();
        engine.stack.push(Cell::from_int(3)).unwrap();
        engine.stack.push(Cell::from_int(4)).unwrap();
        cmp_lt(&mut engine, &instr()).unwrap();
        let result = engine.stack.pop().unwrap();
        assert_eq!(result.kind(), VarType::Int32);
        assert_eq!(result.as_int(), 1);
    }
}
