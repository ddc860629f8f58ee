//! `ScriptContext`: the embeddable facade binding every registry plus the
//! scheduler into one handle.
//!
//! A context is single-threaded: it is deliberately `!Send`/`!Sync` (via a
//! `PhantomData<Rc<()>>` marker) because every registry uses `Rc`/interior
//! mutability rather than `Arc`/locks. A host embedding TinScript across
//! threads owns one context per thread.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{TinError, TinResult};
use crate::hash::H32;
use crate::value::Cell;
use crate::vm::ExecutionEngine;

/// The embeddable script runtime handle.
pub struct ScriptContext {
    engine: ExecutionEngine,
    now_ms: u64,
    _not_send_or_sync: PhantomData<Rc<()>>,
}

impl ScriptContext {
    pub fn new() -> Self {
        ScriptContext {
            engine: ExecutionEngine::new(),
            now_ms: 0,
            _not_send_or_sync: PhantomData,
        }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ExecutionEngine {
        &mut self.engine
    }

    /// Executes a single top-level console-style command: a bare call to a
    /// global function by name.
    pub fn exec_command(&mut self, function_name: &str, args: &[Cell]) -> TinResult<Cell> {
        let hash = self.engine.strings.intern(function_name);
        self.engine.call_function(hash, args)
    }

    /// Loads and runs a code block's top-level statements immediately, by
    /// calling its synthetic entry function (conventionally named by the
    /// loader).
    pub fn exec_script(&mut self, entry_function: H32) -> TinResult<Cell> {
        self.engine.call_function(entry_function, &[])
    }

    /// Calls a named global function with already-typed arguments.
    pub fn exec_function(&mut self, function_name: H32, args: &[Cell]) -> TinResult<Cell> {
        self.engine.call_function(function_name, args)
    }

    /// Calls a method on a live object.
    pub fn object_exec(&mut self, object_id: u32, method_name: H32, args: &[Cell]) -> TinResult<Cell> {
        self.engine.call_method(object_id, method_name, args)
    }

    pub fn get_global(&self, name: &str) -> Option<Cell> {
        let hash = crate::hash::H32::new(name);
        self.engine.namespaces.get(H32::NONE)?.variables.get(&hash)?.inline_value()
    }

    pub fn set_global(&mut self, name: &str, value: Cell) {
        let hash = self.engine.strings.intern(name);
        let ve = self.engine.namespaces.get_or_create_variable(H32::NONE, hash, value.kind());
        ve.set_inline_value(value);
    }

    /// Advances wall-clock time to `now_ms` and dispatches every scheduler
    /// event now due. A dispatched native call may itself synchronously
    /// schedule more events; per `spec.md` §4.7 those participate in this
    /// same tick if their wake-time is also `<= now_ms`, so the scheduler is
    /// drained repeatedly (not just once) until a pass produces nothing new.
    pub fn tick(&mut self, now_ms: u64) -> TinResult<()> {
        self.now_ms = now_ms;
        loop {
            let due = self.engine.scheduler.tick(now_ms);
            if due.is_empty() {
                break;
            }
            for event in due {
                let result = match event.object_id {
                    Some(id) => self.engine.call_method(id, event.function, &event.args),
                    None => self.engine.call_function(event.function, &event.args),
                };
                if let Err(e) = result {
                    if let TinError::Runtime(ref rk) = e {
                        if rk.is_fatal() {
                            return Err(e);
                        }
                    }
                    self.engine.record_error(e);
                }
            }
        }
        Ok(())
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Installs the host's print callback, invoked by script-level `print`
    /// statements.
    pub fn install_print_callback(&mut self, callback: fn(&str)) {
        crate::host::set_print_callback(&mut self.engine, callback);
    }

    /// Installs the host's assert callback, invoked by script-level
    /// `assert` statements; returning `false` raises
    /// [`crate::error::TinError::HostAssert`].
    pub fn install_assert_callback(&mut self, callback: fn(&str) -> bool) {
        crate::host::set_assert_callback(&mut self.engine, callback);
    }
}

impl Default for ScriptContext {
    fn default() -> Self {
        Self::new()
    }
}

// One context is reachable per host thread via a thread-local pointer set
// at creation. Installing it is an optional convenience for hosts that
// want global `exec_*` free functions rather than threading a
// `&mut ScriptContext` through their own call stack; nothing in this
// crate requires it.
thread_local! {
    static CURRENT: RefCell<Option<Rc<RefCell<ScriptContext>>>> = const { RefCell::new(None) };
}

/// Installs `ctx` as the calling thread's current context, replacing any
/// previously installed one, and returns the shared handle.
pub fn install_current(ctx: ScriptContext) -> Rc<RefCell<ScriptContext>> {
    let handle = Rc::new(RefCell::new(ctx));
    CURRENT.with(|cell| *cell.borrow_mut() = Some(handle.clone()));
    handle
}

/// Runs `f` against the calling thread's current context, if one has been
/// installed via [`install_current`].
pub fn with_current<R>(f: impl FnOnce(&mut ScriptContext) -> R) -> Option<R> {
    CURRENT.with(|cell| cell.borrow().as_ref().map(|handle| f(&mut handle.borrow_mut())))
}

/// Clears the calling thread's current context, if any.
pub fn clear_current() {
    CURRENT.with(|cell| *cell.borrow_mut() = None);
}
