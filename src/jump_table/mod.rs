//! The opcode dispatch table: a fixed array of handler function pointers
//! indexed by opcode byte.

mod arithmetic;
mod comparison;
mod control;
mod object_ops;
mod pod;
mod push;

use once_cell::sync::Lazy;

use crate::error::TinResult;
use crate::opcode::OpCode;
use crate::vm::ExecutionEngine;

use crate::opcode::Instruction;

/// One opcode's handler: executes its effect against `engine`, including
/// advancing the instruction pointer if it branches, calls, or returns.
pub type Handler = fn(&mut ExecutionEngine, &Instruction) -> TinResult<()>;

/// Fixed-size array of handlers, indexed by opcode byte.
pub struct JumpTable {
    handlers: [Option<Handler>; 256],
}

impl JumpTable {
    pub fn new() -> Self {
        let mut handlers: [Option<Handler>; 256] = [None; 256];
        macro_rules! reg {
            ($op:expr, $handler:expr) => {
                handlers[$op as u8 as usize] = Some($handler);
            };
        }

        reg!(OpCode::PushLiteralInt, push::push_literal_int);
        reg!(OpCode::PushLiteralFloat, push::push_literal_float);
        reg!(OpCode::PushLiteralString, push::push_literal_string);
        reg!(OpCode::PushLiteralBool, push::push_literal_bool);
        reg!(OpCode::PushVariable, push::push_variable);
        reg!(OpCode::PushMember, push::push_member);
        reg!(OpCode::PushArrayElement, push::push_array_element);
        reg!(OpCode::PopToVariable, push::pop_to_variable);
        reg!(OpCode::PopToMember, push::pop_to_member);
        reg!(OpCode::PopToArrayElement, push::pop_to_array_element);
        reg!(OpCode::Dup, push::dup);
        reg!(OpCode::Pop, push::pop);
        reg!(OpCode::PushLocal, push::push_local);
        reg!(OpCode::PopLocal, push::pop_local);

        reg!(OpCode::Add, arithmetic::add);
        reg!(OpCode::Sub, arithmetic::sub);
        reg!(OpCode::Mul, arithmetic::mul);
        reg!(OpCode::Div, arithmetic::div);
        reg!(OpCode::Mod, arithmetic::modulo);
        reg!(OpCode::Shl, arithmetic::shl);
        reg!(OpCode::Shr, arithmetic::shr);
        reg!(OpCode::BitAnd, arithmetic::bitand);
        reg!(OpCode::BitOr, arithmetic::bitor);
        reg!(OpCode::BitXor, arithmetic::bitxor);
        reg!(OpCode::BoolAnd, arithmetic::booland);
        reg!(OpCode::BoolOr, arithmetic::boolor);
        reg!(OpCode::Not, arithmetic::not);
        reg!(OpCode::Neg, arithmetic::neg);

        reg!(OpCode::CmpEq, comparison::cmp_eq);
        reg!(OpCode::CmpNe, comparison::cmp_ne);
        reg!(OpCode::CmpLt, comparison::cmp_lt);
        reg!(OpCode::CmpLe, comparison::cmp_le);
        reg!(OpCode::CmpGt, comparison::cmp_gt);
        reg!(OpCode::CmpGe, comparison::cmp_ge);

        reg!(OpCode::Branch, control::branch);
        reg!(OpCode::BranchIfFalse, control::branch_if_false);
        reg!(OpCode::Jump, control::jump);
        reg!(OpCode::Call, control::call);
        reg!(OpCode::CallMethod, control::call_method);
        reg!(OpCode::Return, control::op_return);

        reg!(OpCode::PushPodMember, pod::push_pod_member);
        reg!(OpCode::PopPodMember, pod::pop_pod_member);

        reg!(OpCode::ObjectCreate, object_ops::object_create);
        reg!(OpCode::ObjectDestroy, object_ops::object_destroy);
        reg!(OpCode::ObjectIsA, object_ops::object_is_a);

        reg!(OpCode::CallTypeMethod, control::call_type_method);

        JumpTable { handlers }
    }

    pub fn get(&self, op: OpCode) -> Option<Handler> {
        self.handlers[op as u8 as usize]
    }
}

impl Default for JumpTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The single shared dispatch table. Handlers are stateless function
/// pointers, so every [`ExecutionEngine`] dispatches through this one
/// instance rather than rebuilding the 256-entry array per engine.
pub static JUMP_TABLE: Lazy<JumpTable> = Lazy::new(JumpTable::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_has_a_handler() {
        let table = JumpTable::new();
        for b in 0..=255u8 {
            if let Ok(op) = OpCode::from_byte(b) {
                assert!(table.get(op).is_some(), "missing handler for {op:?}");
            }
        }
    }
}
