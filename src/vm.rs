//! The opcode interpreter: reads a code block, drives the execution stack,
//! calls into the registries for variable resolution and native dispatch,
//! and emits debugger events.

use hashbrown::HashMap;

use crate::debugger::DebuggerHooks;
use crate::error::{LinkErrorKind, RuntimeErrorKind, TinError, TinResult};
use crate::function::{CodeBlock, FunctionEntry};
use crate::hash::{H32, StringTable};
use crate::jump_table::JUMP_TABLE;
use crate::namespace::NamespaceRegistry;
use crate::object::ObjectRegistry;
use crate::opcode::{decode, Instruction};
use crate::scheduler::Scheduler;
use crate::stack::ExecutionStack;
use crate::types::TypeRegistry;
use crate::value::Cell;

/// VM state machine: `Idle -> Running -> Suspended (awaiting native
/// reentry) -> Running -> Returned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMState {
    Idle,
    Running,
    Suspended,
    Returned,
    Halted,
    Fault,
}

/// Backward-branch bookkeeping for the infinite-loop guard.
#[derive(Default)]
struct LoopGuard {
    revisits: u32,
}

/// Default threshold for the infinite-loop guard.
pub const DEFAULT_LOOP_GUARD_THRESHOLD: u32 = 1_000_000;

/// Default max cell/frame stack depth.
pub const DEFAULT_STACK_DEPTH: usize = 4096;

/// Non-functional callbacks a host may install.
#[derive(Default)]
pub struct HostCallbacks {
    pub print: Option<fn(&str)>,
    pub assert: Option<fn(&str) -> bool>,
}

/// The execution engine: owns every registry the opcode set consults, the
/// cell/frame stack, the scheduler, and the host bridge surface.
pub struct ExecutionEngine {
    state: VMState,
    pub stack: ExecutionStack,
    pub strings: StringTable,
    pub types: TypeRegistry,
    pub namespaces: NamespaceRegistry,
    pub objects: ObjectRegistry,
    pub scheduler: Scheduler,
    code_blocks: HashMap<u32, CodeBlock>,
    loop_guards: HashMap<(u32, u32), LoopGuard>,
    loop_guard_threshold: u32,
    pub debugger: DebuggerHooks,
    pub host: HostCallbacks,
    /// First error recorded during the current `exec_*` call.
    first_error: Option<TinError>,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        let member_hash = |s: &str| H32::new(s);
        ExecutionEngine {
            state: VMState::Idle,
            stack: ExecutionStack::new(DEFAULT_STACK_DEPTH),
            strings: StringTable::new(),
            types: TypeRegistry::with_builtins(member_hash),
            namespaces: NamespaceRegistry::new(),
            objects: ObjectRegistry::new(),
            scheduler: Scheduler::new(),
            code_blocks: HashMap::new(),
            loop_guards: HashMap::new(),
            loop_guard_threshold: DEFAULT_LOOP_GUARD_THRESHOLD,
            debugger: DebuggerHooks::default(),
            host: HostCallbacks::default(),
            first_error: None,
        }
    }

    pub fn state(&self) -> VMState {
        self.state
    }

    pub fn set_state(&mut self, state: VMState) {
        self.state = state;
    }

    pub fn set_loop_guard_threshold(&mut self, threshold: u32) {
        self.loop_guard_threshold = threshold;
    }

    pub fn register_code_block(&mut self, block: CodeBlock) {
        self.code_blocks.insert(block.id, block);
    }

    pub fn code_block(&self, id: u32) -> Option<&CodeBlock> {
        self.code_blocks.get(&id)
    }

    pub fn take_first_error(&mut self) -> Option<TinError> {
        self.first_error.take()
    }

    pub(crate) fn record_error(&mut self, err: TinError) {
        if self.first_error.is_none() {
            self.first_error = Some(err.clone());
        }
        log::debug!("recoverable error recorded: {err}");
    }

    /// Folds a fallible opcode-handler computation into the VM's
    /// record-and-continue error model: only a fatal `RuntimeErrorKind`
    /// propagates and aborts the `exec_*` call; every other error is
    /// recorded as the first error of the call and `default` is
    /// substituted so execution can continue.
    pub(crate) fn recoverable(&mut self, result: TinResult<Cell>, default: Cell) -> TinResult<Cell> {
        match result {
            Ok(c) => Ok(c),
            Err(e) => {
                let fatal = matches!(&e, TinError::Runtime(rk) if rk.is_fatal());
                if fatal {
                    Err(e)
                } else {
                    self.record_error(e);
                    Ok(default)
                }
            }
        }
    }

    /// Calls `name_hash` (resolved in the root namespace) with already-
    /// marshalled argument cells (slot 0 excluded). Drives execution to
    /// completion for scripted functions; invokes the dispatcher directly
    /// for native ones.
    pub fn call_function(&mut self, name_hash: H32, args: &[Cell]) -> TinResult<Cell> {
        self.call_in_namespace(H32::NONE, name_hash, args)
    }

    /// Calls a method on `object_id`, resolving `method_hash` by walking
    /// the object's namespace chain.
    pub fn call_method(&mut self, object_id: u32, method_hash: H32, args: &[Cell]) -> TinResult<Cell> {
        if object_id == 0 {
            self.record_error(TinError::Runtime(RuntimeErrorKind::NilObjectId));
            return Ok(Cell::void());
        }
        let Some(object) = self.objects.get(object_id) else {
            self.record_error(TinError::Runtime(RuntimeErrorKind::ObjectNotAlive(object_id)));
            return Ok(Cell::void());
        };
        let namespace = object.namespace;
        self.call_in_namespace(namespace, method_hash, args)
    }

    fn call_in_namespace(&mut self, namespace: H32, name_hash: H32, args: &[Cell]) -> TinResult<Cell> {
        let Some(fe) = self.namespaces.lookup_function(namespace, name_hash, true).cloned() else {
            self.record_error(TinError::Link(LinkErrorKind::UnresolvedFunction(name_hash)));
            return Ok(Cell::void());
        };

        if let Some(dispatcher) = fe.dispatcher {
            let mut marshalled = self.marshal_args(&fe, args)?;
            self.debugger.fire_function_entered(fe.name);
            dispatcher(self, &mut marshalled)?;
            self.debugger.fire_function_exited(fe.name);
            return Ok(marshalled[0]);
        }

        let marshalled = self.marshal_args(&fe, args)?;
        let base = self.stack.depth();
        for cell in &marshalled {
            self.stack.push(*cell)?;
        }
        self.stack.push_frame(&fe, base)?;
        self.debugger.fire_function_entered(fe.name);

        let target_frame_depth = self.stack.frame_depth() - 1;
        self.set_state(VMState::Running);
        loop {
            if self.stack.frame_depth() <= target_frame_depth {
                break;
            }
            self.execute_next()?;
            if matches!(self.state, VMState::Halted | VMState::Fault) {
                break;
            }
        }

        if self.stack.depth() > base {
            self.stack.pop()
        } else {
            Ok(Cell::void())
        }
    }

    /// Converts each argument to its declared parameter type. `args` holds
    /// only the real parameters (slot 0, the return slot, is synthesized).
    fn marshal_args(&self, fe: &FunctionEntry, args: &[Cell]) -> TinResult<Vec<Cell>> {
        let mut marshalled = Vec::with_capacity(fe.params.len());
        marshalled.push(Cell::default_for(
            fe.params.first().map(|p| p.var_type).unwrap_or(crate::value::VarType::Void),
        ));
        for (i, param) in fe.params.iter().enumerate().skip(1) {
            let arg = args.get(i - 1).copied().unwrap_or_else(|| Cell::default_for(param.var_type));
            let converted = self.types.convert_or_err(&arg, param.var_type)?;
            marshalled.push(converted);
        }
        Ok(marshalled)
    }

    /// Used by the `Call`/`CallMethod` opcode handlers: pops the callee's
    /// arguments off the evaluation stack, resolves and dispatches it, and
    /// either pushes a native result immediately or pushes a new frame for
    /// the surrounding `execute_next` loop to step into.
    pub(crate) fn dispatch_inline_call(&mut self, namespace: H32, name_hash: H32) -> TinResult<()> {
        let Some(fe) = self.namespaces.lookup_function(namespace, name_hash, true).cloned() else {
            self.record_error(TinError::Link(LinkErrorKind::UnresolvedFunction(name_hash)));
            self.stack.push(Cell::void())?;
            return Ok(());
        };

        let arg_count = fe.params.len().saturating_sub(1);
        let mut raw_args = Vec::with_capacity(arg_count);
        for _ in 0..arg_count {
            raw_args.push(self.stack.pop()?);
        }
        raw_args.reverse();
        let mut marshalled = self.marshal_args(&fe, &raw_args)?;

        if let Some(dispatcher) = fe.dispatcher {
            self.debugger.fire_function_entered(fe.name);
            dispatcher(self, &mut marshalled)?;
            self.debugger.fire_function_exited(fe.name);
            self.stack.push(marshalled[0])?;
            return Ok(());
        }

        let base = self.stack.depth();
        for cell in &marshalled {
            self.stack.push(*cell)?;
        }
        self.stack.push_frame(&fe, base)?;
        self.debugger.fire_function_entered(fe.name);
        Ok(())
    }

    /// Resolves the object at the top of the stack (popped) and dispatches
    /// `method_hash` on its namespace chain, per [`ExecutionEngine::dispatch_inline_call`].
    pub(crate) fn dispatch_inline_method(&mut self, method_hash: H32) -> TinResult<()> {
        let object_cell = self.stack.pop()?;
        let object_id = object_cell.as_object_id();
        if object_id == 0 {
            self.record_error(TinError::Runtime(RuntimeErrorKind::NilObjectId));
            self.stack.push(Cell::void())?;
            return Ok(());
        }
        let Some(object) = self.objects.get(object_id) else {
            self.record_error(TinError::Runtime(RuntimeErrorKind::ObjectNotAlive(object_id)));
            self.stack.push(Cell::void())?;
            return Ok(());
        };
        let namespace = object.namespace;
        self.dispatch_inline_call(namespace, method_hash)
    }

    /// Executes the single instruction at the current frame's instruction
    /// pointer, advancing it (or performing an implicit return at end of
    /// the code block).
    pub fn execute_next(&mut self) -> TinResult<()> {
        let Some(frame) = self.stack.current_frame() else {
            self.set_state(VMState::Halted);
            return Ok(());
        };
        let Some(block_id) = frame.code_block else {
            // A native frame never reaches `execute_next`; treat it as done.
            self.finish_frame(Cell::void())?;
            return Ok(());
        };
        let ip = frame.ip;
        let Some(block) = self.code_blocks.get(&block_id) else {
            return Err(TinError::Link(LinkErrorKind::UnresolvedFunction(H32::NONE)));
        };

        if ip as usize >= block.instructions.len() {
            return self.finish_frame(Cell::void());
        }

        if let Some(line) = block.line_for_offset(ip) {
            self.debugger.fire_line_changed(line);
        }

        let instruction = decode(&block.instructions, ip)?;
        self.check_loop_guard(block_id, &instruction)?;

        let handler = JUMP_TABLE.get(instruction.opcode);
        match handler {
            Some(h) => h(self, &instruction)?,
            None => return Err(TinError::Link(LinkErrorKind::UnresolvedFunction(H32::NONE))),
        }

        // Advance the instruction pointer unless the handler already moved
        // it (a branch, call or return).
        if let Some(frame) = self.stack.current_frame_mut() {
            if frame.ip == ip {
                frame.ip += instruction.size();
            }
        }
        Ok(())
    }

    /// Pops the current frame, decrementing string refcounts for any
    /// string-handle cells it held, pushes `return_value` back onto the
    /// stack, and fires the function-exited debugger hook.
    pub(crate) fn finish_frame(&mut self, return_value: Cell) -> TinResult<()> {
        let strings = &mut self.strings;
        let frame = self.stack.pop_frame(|cell| strings.refdec(cell.as_string_handle()))?;
        self.debugger.fire_function_exited(frame.function);
        self.stack.push(return_value)?;
        if self.stack.frame_depth() == 0 {
            self.set_state(VMState::Returned);
        }
        Ok(())
    }

    fn check_loop_guard(&mut self, block_id: u32, instr: &Instruction) -> TinResult<()> {
        if !instr.opcode.is_branch() {
            return Ok(());
        }
        let target = self.branch_target(instr)?;
        if target > instr.offset {
            self.loop_guards.remove(&(block_id, instr.offset));
            return Ok(());
        }
        let guard = self.loop_guards.entry((block_id, instr.offset)).or_default();
        guard.revisits += 1;
        if guard.revisits > self.loop_guard_threshold {
            return Err(TinError::Runtime(RuntimeErrorKind::InfiniteLoopGuard {
                code_block: block_id,
                offset: instr.offset,
            }));
        }
        Ok(())
    }

    fn branch_target(&self, instr: &Instruction) -> TinResult<u32> {
        let rel = instr.read_i32()?;
        Ok((instr.offset as i64 + instr.size() as i64 + rel as i64) as u32)
    }

    /// Renders `cell` the way the `+` string-concatenation rule and the
    /// `StringCat`-style native functions need it: string handles resolve
    /// through the string table, everything else through the type
    /// registry's `to_string`.
    pub fn cell_to_display_string(&self, cell: &Cell) -> String {
        if cell.kind() == crate::value::VarType::StringHandle {
            return self.strings.lookup(cell.as_string_handle()).unwrap_or("").to_string();
        }
        self.types.to_string(cell)
    }

    /// Interns `s` and returns a fresh `StringHandle` cell with its
    /// reference already accounted for.
    pub fn intern_to_cell(&mut self, s: &str) -> Cell {
        let hash = self.strings.intern(s);
        Cell::from_string_handle(hash)
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FunctionEntry, ParamSlot};
    use crate::opcode::OpCode;
    use crate::value::VarType;

    fn assemble(ops: &[(OpCode, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (op, operand) in ops {
            out.push(*op as u8);
            out.extend_from_slice(operand);
        }
        out
    }

    #[test]
    fn simple_add_and_return() {
        let mut engine = ExecutionEngine::new();
        let code = assemble(&[
            (OpCode::PushLiteralInt, 3i32.to_le_bytes().to_vec()),
            (OpCode::PushLiteralInt, 4i32.to_le_bytes().to_vec()),
            (OpCode::Add, vec![]),
            (OpCode::PopLocal, 0u32.to_le_bytes().to_vec()),
            (OpCode::Return, vec![]),
        ]);
        engine.register_code_block(CodeBlock::new(0, code, vec![]));
        let fe = FunctionEntry::scripted(
            H32::new("f"),
            H32::NONE,
            vec![ParamSlot {
                name: H32::NONE,
                var_type: VarType::Int32,
            }],
            0,
            0,
            0,
        );
        engine
            .namespaces
            .get_mut(H32::NONE)
            .unwrap()
            .functions
            .insert(H32::new("f"), fe);

        let depth_before = engine.stack.depth();
        let result = engine.call_function(H32::new("f"), &[]).unwrap();
        assert_eq!(result.as_int(), 7);
        assert_eq!(engine.stack.depth(), depth_before);
    }

    #[test]
    fn recursive_call_balances_stack() {
        // if (n < 2) return n; else return fib(n-1) + fib(n-2);
        let mut engine = ExecutionEngine::new();
        let fib = H32::new("fib");

        let mut code = Vec::new();
        let push_local = |code: &mut Vec<u8>, offset: u32| {
            code.push(OpCode::PushLocal as u8);
            code.extend_from_slice(&offset.to_le_bytes());
        };
        push_local(&mut code, 1); // n
        code.push(OpCode::PushLiteralInt as u8);
        code.extend_from_slice(&2i32.to_le_bytes());
        code.push(OpCode::CmpLt as u8);
        code.push(OpCode::BranchIfFalse as u8);
        let branch_patch = code.len();
        code.extend_from_slice(&0i32.to_le_bytes());
        push_local(&mut code, 1);
        code.push(OpCode::PopLocal as u8);
        code.extend_from_slice(&0u32.to_le_bytes());
        code.push(OpCode::Return as u8);
        let else_start = code.len();
        let rel = (else_start - (branch_patch + 4)) as i32;
        code[branch_patch..branch_patch + 4].copy_from_slice(&rel.to_le_bytes());

        push_local(&mut code, 1);
        code.push(OpCode::PushLiteralInt as u8);
        code.extend_from_slice(&1i32.to_le_bytes());
        code.push(OpCode::Sub as u8);
        code.push(OpCode::Call as u8);
        code.extend_from_slice(&fib.raw().to_le_bytes());

        push_local(&mut code, 1);
        code.push(OpCode::PushLiteralInt as u8);
        code.extend_from_slice(&2i32.to_le_bytes());
        code.push(OpCode::Sub as u8);
        code.push(OpCode::Call as u8);
        code.extend_from_slice(&fib.raw().to_le_bytes());

        code.push(OpCode::Add as u8);
        code.push(OpCode::PopLocal as u8);
        code.extend_from_slice(&0u32.to_le_bytes());
        code.push(OpCode::Return as u8);

        engine.register_code_block(CodeBlock::new(0, code, vec![]));
        let fe = FunctionEntry::scripted(
            fib,
            H32::NONE,
            vec![
                ParamSlot {
                    name: H32::NONE,
                    var_type: VarType::Int32,
                },
                ParamSlot {
                    name: H32::new("n"),
                    var_type: VarType::Int32,
                },
            ],
            0,
            0,
            0,
        );
        engine.namespaces.get_mut(H32::NONE).unwrap().functions.insert(fib, fe);

        let depth_before = engine.stack.depth();
        let result = engine.call_function(fib, &[Cell::from_int(10)]).unwrap();
        assert_eq!(result.as_int(), 55);
        assert_eq!(engine.stack.depth(), depth_before);
    }

    fn register_scripted_no_args(engine: &mut ExecutionEngine, name: H32, code: Vec<u8>) {
        engine.register_code_block(CodeBlock::new(0, code, vec![]));
        let fe = FunctionEntry::scripted(
            name,
            H32::NONE,
            vec![ParamSlot {
                name: H32::NONE,
                var_type: VarType::Void,
            }],
            0,
            0,
            0,
        );
        engine.namespaces.get_mut(H32::NONE).unwrap().functions.insert(name, fe);
    }

    fn noop(_engine: &mut ExecutionEngine, _args: &mut [Cell]) -> TinResult<()> {
        Ok(())
    }

    #[test]
    fn tight_backward_jump_trips_the_loop_guard() {
        let mut engine = ExecutionEngine::new();
        engine.set_loop_guard_threshold(10);
        let spin = H32::new("spin");
        // A single `Jump` back to itself: pure backward-branch spin with no
        // other work in the body.
        let code = assemble(&[(OpCode::Jump, (-5i32).to_le_bytes().to_vec())]);
        register_scripted_no_args(&mut engine, spin, code);

        match engine.call_function(spin, &[]) {
            Err(TinError::Runtime(RuntimeErrorKind::InfiniteLoopGuard { code_block, offset })) => {
                assert_eq!(code_block, 0);
                assert_eq!(offset, 0);
            }
            other => panic!("expected InfiniteLoopGuard, got {other:?}"),
        }
    }

    #[test]
    fn loop_body_containing_a_call_still_trips_the_loop_guard() {
        let mut engine = ExecutionEngine::new();
        engine.set_loop_guard_threshold(10);
        crate::host::register_function(&mut engine, "noop", &[], VarType::Void, noop);
        let noop_hash = H32::new("noop");
        let looper = H32::new("looper");

        // Call noop(); jump back to the Call. The backward branch targets
        // the same offset every iteration, so a function call in the loop
        // body must not reset its revisit count: a real infinite loop that
        // does work every iteration still has to trip the guard.
        let mut code = assemble(&[(OpCode::Call, noop_hash.raw().to_le_bytes().to_vec())]);
        let jump_offset = code.len() as u32;
        code.push(OpCode::Jump as u8);
        let rel = -((jump_offset + 5) as i32);
        code.extend_from_slice(&rel.to_le_bytes());
        register_scripted_no_args(&mut engine, looper, code);

        match engine.call_function(looper, &[]) {
            Err(TinError::Runtime(RuntimeErrorKind::InfiniteLoopGuard { code_block, offset })) => {
                assert_eq!(code_block, 0);
                assert_eq!(offset, jump_offset);
            }
            other => panic!("expected InfiniteLoopGuard, got {other:?}"),
        }
    }
}
