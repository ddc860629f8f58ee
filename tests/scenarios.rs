//! End-to-end scenarios driving the public API the way a host embedding
//! the runtime would: assemble bytecode for a handful of top-level
//! functions, register whatever natives/classes they call, and run them
//! to completion through `ExecutionEngine`/`ScriptContext`.

use std::sync::atomic::{AtomicU32, Ordering};

use tinscript::context::ScriptContext;
use tinscript::error::{RuntimeErrorKind, TinError, TinResult};
use tinscript::function::{CodeBlock, FunctionEntry, ParamSlot};
use tinscript::hash::H32;
use tinscript::host;
use tinscript::opcode::OpCode;
use tinscript::value::{Cell, VarType};
use tinscript::vm::ExecutionEngine;

/// Assembles a top-level function with no parameters: registers its code
/// as a fresh code block and inserts a matching `FunctionEntry` into the
/// root namespace, returning the name it was registered under.
fn define_main(engine: &mut ExecutionEngine, code_block_id: u32, name: &str, return_type: VarType, code: Vec<u8>) -> H32 {
    engine.register_code_block(CodeBlock::new(code_block_id, code, vec![]));
    let name_hash = engine.strings.intern(name);
    let fe = FunctionEntry::scripted(
        name_hash,
        H32::NONE,
        vec![ParamSlot {
            name: H32::NONE,
            var_type: return_type,
        }],
        0,
        code_block_id,
        0,
    );
    engine.namespaces.get_mut(H32::NONE).unwrap().functions.insert(name_hash, fe);
    name_hash
}

fn push_int(code: &mut Vec<u8>, v: i32) {
    code.push(OpCode::PushLiteralInt as u8);
    code.extend_from_slice(&v.to_le_bytes());
}

fn call(code: &mut Vec<u8>, name: H32) {
    code.push(OpCode::Call as u8);
    code.extend_from_slice(&name.raw().to_le_bytes());
}

fn push_variable(code: &mut Vec<u8>, name: H32) {
    code.push(OpCode::PushVariable as u8);
    code.extend_from_slice(&H32::NONE.raw().to_le_bytes());
    code.extend_from_slice(&name.raw().to_le_bytes());
}

fn pop_to_variable(code: &mut Vec<u8>, name: H32) {
    code.push(OpCode::PopToVariable as u8);
    code.extend_from_slice(&H32::NONE.raw().to_le_bytes());
    code.extend_from_slice(&name.raw().to_le_bytes());
}

/// Writes the top of the evaluation stack into frame-relative local
/// `offset`. Every function body pops its result into slot 0 this way
/// before `Return`, which sources the return cell from there rather than
/// from the evaluation stack.
fn pop_local(code: &mut Vec<u8>, offset: u32) {
    code.push(OpCode::PopLocal as u8);
    code.extend_from_slice(&offset.to_le_bytes());
}

#[test]
fn string_cat_of_an_integer_sum() {
    let mut engine = ExecutionEngine::new();
    host::register_string_cat(&mut engine);
    let string_cat = H32::new("StringCat");
    let g_result = engine.strings.intern("gResult");

    let mut code = Vec::new();
    push_int(&mut code, 3);
    push_int(&mut code, 4);
    code.push(OpCode::Add as u8);
    call(&mut code, string_cat);
    code.push(OpCode::Dup as u8);
    pop_to_variable(&mut code, g_result);
    pop_local(&mut code, 0);
    code.push(OpCode::Return as u8);

    let main = define_main(&mut engine, 0, "main", VarType::StringHandle, code);
    let result = engine.call_function(main, &[]).unwrap();
    assert_eq!(engine.cell_to_display_string(&result), "7");

    let stored = engine
        .namespaces
        .get(H32::NONE)
        .unwrap()
        .variables
        .get(&g_result)
        .and_then(|ve| ve.inline_value())
        .unwrap();
    assert_eq!(engine.cell_to_display_string(&stored), "7");
}

#[test]
fn vector3f_add_and_string_cat() {
    let mut engine = ExecutionEngine::new();
    host::register_string_cat(&mut engine);
    let string_cat = H32::new("StringCat");
    let v0 = engine.strings.intern("v0");
    let v1 = engine.strings.intern("v1");
    let g_result = engine.strings.intern("gResult");

    // A compiler would parse these literal assignments through the
    // vector3f type's `from_string`; without one, the host does it here.
    let a = engine.types.from_string(VarType::Vector3f, "1, 2, 3").unwrap();
    let b = engine.types.from_string(VarType::Vector3f, "4 5 6").unwrap();
    engine.namespaces.get_or_create_variable(H32::NONE, v0, VarType::Vector3f).set_inline_value(a);
    engine.namespaces.get_or_create_variable(H32::NONE, v1, VarType::Vector3f).set_inline_value(b);

    let mut code = Vec::new();
    push_variable(&mut code, v0);
    push_variable(&mut code, v1);
    code.push(OpCode::Add as u8);
    call(&mut code, string_cat);
    code.push(OpCode::Dup as u8);
    pop_to_variable(&mut code, g_result);
    pop_local(&mut code, 0);
    code.push(OpCode::Return as u8);

    let main = define_main(&mut engine, 0, "main", VarType::StringHandle, code);
    let result = engine.call_function(main, &[]).unwrap();
    assert_eq!(engine.cell_to_display_string(&result), "5.0000 7.0000 9.0000");
}

#[test]
fn native_mul2_through_string_cat() {
    let mut engine = ExecutionEngine::new();
    host::register_mul2(&mut engine);
    host::register_string_cat(&mut engine);
    let mul2 = H32::new("mul2");
    let string_cat = H32::new("StringCat");

    let mut code = Vec::new();
    push_int(&mut code, -5);
    call(&mut code, mul2);
    call(&mut code, string_cat);
    pop_local(&mut code, 0);
    code.push(OpCode::Return as u8);

    let main = define_main(&mut engine, 0, "main", VarType::StringHandle, code);
    let result = engine.call_function(main, &[]).unwrap();
    assert_eq!(engine.cell_to_display_string(&result), "-10");
}

#[test]
fn global_array_indexes_past_offset_zero() {
    let mut engine = ExecutionEngine::new();
    host::register_global_array(&mut engine, "scores", VarType::Int32, 4);
    let scores = engine.strings.intern("scores");

    // scores[2] = 99; return scores[2];
    let mut code = Vec::new();
    push_int(&mut code, 99);
    push_int(&mut code, 2);
    code.push(OpCode::PopToArrayElement as u8);
    code.extend_from_slice(&scores.raw().to_le_bytes());
    push_int(&mut code, 2);
    code.push(OpCode::PushArrayElement as u8);
    code.extend_from_slice(&scores.raw().to_le_bytes());
    pop_local(&mut code, 0);
    code.push(OpCode::Return as u8);

    let main = define_main(&mut engine, 0, "main", VarType::Int32, code);
    let result = engine.call_function(main, &[]).unwrap();
    assert_eq!(result.as_int(), 99);
    assert!(engine.take_first_error().is_none());
}

fn cbase_factory() -> usize {
    0
}
fn cbase_destructor(_ptr: usize) {}

#[test]
fn object_create_set_member_destroy_then_fails_to_read() {
    let mut engine = ExecutionEngine::new();
    let cbase = host::register_class(&mut engine, "CBase", None, cbase_factory, cbase_destructor);
    let name = engine.strings.intern("obj1");
    let id = engine.objects.create_scripted(cbase, name).unwrap();
    let intvalue = engine.strings.intern("intvalue");

    let mut set_and_read = Vec::new();
    push_int(&mut set_and_read, 12);
    set_and_read.push(OpCode::PopToMember as u8);
    set_and_read.extend_from_slice(&id.to_le_bytes());
    set_and_read.extend_from_slice(&intvalue.raw().to_le_bytes());
    set_and_read.push(OpCode::PushMember as u8);
    set_and_read.extend_from_slice(&id.to_le_bytes());
    set_and_read.extend_from_slice(&intvalue.raw().to_le_bytes());
    pop_local(&mut set_and_read, 0);
    set_and_read.push(OpCode::Return as u8);
    let set_fn = define_main(&mut engine, 0, "set_and_read", VarType::Int32, set_and_read);
    let result = engine.call_function(set_fn, &[]).unwrap();
    assert_eq!(result.as_int(), 12);
    assert!(engine.take_first_error().is_none());

    assert!(engine.objects.destroy(id));

    let mut read_after = Vec::new();
    read_after.push(OpCode::PushMember as u8);
    read_after.extend_from_slice(&id.to_le_bytes());
    read_after.extend_from_slice(&intvalue.raw().to_le_bytes());
    pop_local(&mut read_after, 0);
    read_after.push(OpCode::Return as u8);
    let read_fn = define_main(&mut engine, 1, "read_after_destroy", VarType::Int32, read_after);
    let result = engine.call_function(read_fn, &[]).unwrap();
    assert_eq!(result.kind(), VarType::Void);
    match engine.take_first_error() {
        Some(TinError::Runtime(RuntimeErrorKind::ObjectNotAlive(bad_id))) => assert_eq!(bad_id, id),
        other => panic!("expected ObjectNotAlive, got {other:?}"),
    }
}

static SCHEDULED_DISPATCH_COUNT: AtomicU32 = AtomicU32::new(0);

fn count_dispatch(_engine: &mut ExecutionEngine, _args: &mut [Cell]) -> TinResult<()> {
    SCHEDULED_DISPATCH_COUNT.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

#[test]
fn scheduled_call_fires_exactly_once_when_due() {
    SCHEDULED_DISPATCH_COUNT.store(0, Ordering::SeqCst);
    let mut ctx = ScriptContext::new();
    host::register_function(ctx.engine_mut(), "onTimer", &[], VarType::Void, count_dispatch);
    let on_timer = ctx.engine_mut().strings.intern("onTimer");
    ctx.engine_mut().scheduler.schedule(0, 100, on_timer, None, vec![], None);

    ctx.tick(50).unwrap();
    assert_eq!(SCHEDULED_DISPATCH_COUNT.load(Ordering::SeqCst), 0);

    ctx.tick(100).unwrap();
    assert_eq!(SCHEDULED_DISPATCH_COUNT.load(Ordering::SeqCst), 1);

    ctx.tick(200).unwrap();
    assert_eq!(SCHEDULED_DISPATCH_COUNT.load(Ordering::SeqCst), 1);
}

#[test]
fn recursive_fibonacci_ten_does_not_leak_frames() {
    let mut engine = ExecutionEngine::new();
    let fib = H32::new("fib");

    let mut code = Vec::new();
    let push_local = |code: &mut Vec<u8>, offset: u32| {
        code.push(OpCode::PushLocal as u8);
        code.extend_from_slice(&offset.to_le_bytes());
    };
    push_local(&mut code, 1);
    push_int(&mut code, 2);
    code.push(OpCode::CmpLt as u8);
    code.push(OpCode::BranchIfFalse as u8);
    let branch_patch = code.len();
    code.extend_from_slice(&0i32.to_le_bytes());
    push_local(&mut code, 1);
    pop_local(&mut code, 0);
    code.push(OpCode::Return as u8);
    let else_start = code.len();
    let rel = (else_start - (branch_patch + 4)) as i32;
    code[branch_patch..branch_patch + 4].copy_from_slice(&rel.to_le_bytes());

    push_local(&mut code, 1);
    push_int(&mut code, 1);
    code.push(OpCode::Sub as u8);
    call(&mut code, fib);

    push_local(&mut code, 1);
    push_int(&mut code, 2);
    code.push(OpCode::Sub as u8);
    call(&mut code, fib);

    code.push(OpCode::Add as u8);
    pop_local(&mut code, 0);
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
