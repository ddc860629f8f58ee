//! Debugger hooks: function-pointer callbacks a host installs to observe
//! execution without altering it.

use crate::hash::H32;
use crate::value::Cell;

/// Fired whenever a variable write completes (`PopLocal`, `PopToVariable`,
/// `PopToMember`, array element writes).
pub type VariableWriteHook = fn(owner: H32, name: H32, value: &Cell);
/// Fired when the active source line changes, per the code block's line map.
pub type LineChangedHook = fn(line: u32);
/// Fired on function entry/exit (`name` is the function's `H32`).
pub type FunctionHook = fn(name: H32);
/// Fired when execution reaches a line flagged as a breakpoint by the host.
pub type BreakpointHook = fn(line: u32);

/// Optional hooks, all `None` by default: zero overhead when unused.
#[derive(Default)]
pub struct DebuggerHooks {
    pub on_variable_write: Option<VariableWriteHook>,
    pub on_line_changed: Option<LineChangedHook>,
    pub on_function_entered: Option<FunctionHook>,
    pub on_function_exited: Option<FunctionHook>,
    pub on_breakpoint: Option<BreakpointHook>,
    /// Lines flagged as breakpoints; checked against `on_line_changed`.
    breakpoints: Vec<u32>,
}

impl DebuggerHooks {
    pub fn set_breakpoint(&mut self, line: u32) {
        if !self.breakpoints.contains(&line) {
            self.breakpoints.push(line);
        }
    }

    pub fn clear_breakpoint(&mut self, line: u32) {
        self.breakpoints.retain(|l| *l != line);
    }

    pub(crate) fn fire_variable_write(&self, owner: H32, name: H32, value: &Cell) {
        if let Some(hook) = self.on_variable_write {
            hook(owner, name, value);
        }
    }

    pub(crate) fn fire_line_changed(&self, line: u32) {
        if let Some(hook) = self.on_line_changed {
            hook(line);
        }
        if self.breakpoints.contains(&line) {
            if let Some(hook) = self.on_breakpoint {
                hook(line);
            }
        }
    }

    pub(crate) fn fire_function_entered(&self, name: H32) {
        if let Some(hook) = self.on_function_entered {
            hook(name);
        }
    }

    pub(crate) fn fire_function_exited(&self, name: H32) {
        if let Some(hook) = self.on_function_exited {
            hook(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static LAST_LINE: AtomicU32 = AtomicU32::new(0);

    fn record_line(line: u32) {
        LAST_LINE.store(line, Ordering::SeqCst);
    }

    #[test]
    fn breakpoint_fires_alongside_line_changed() {
        let mut hooks = DebuggerHooks::default();
        hooks.on_line_changed = Some(record_line);
        hooks.set_breakpoint(5);
        hooks.fire_line_changed(5);
        assert_eq!(LAST_LINE.load(Ordering::SeqCst), 5);
    }
}
