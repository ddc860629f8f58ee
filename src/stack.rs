//! The execution stack: a contiguous typed-cell stack with a parallel
//! call-frame stack.

use crate::error::{RuntimeErrorKind, TinError, TinResult};
use crate::function::FunctionEntry;
use crate::hash::H32;
use crate::value::{Cell, VarType};
use crate::variable::VariableEntry;

/// A saved call frame: the function being executed, its code block and
/// instruction pointer, the base offset into the cell stack, and the
/// frame's VE array (parameters + locals), sized to the function's
/// context.
pub struct CallFrame {
    pub function: H32,
    pub namespace: H32,
    /// `None` for a native frame (no bytecode to step through).
    pub code_block: Option<u32>,
    pub ip: u32,
    pub base: usize,
    pub locals: Vec<VariableEntry>,
}

/// The VM's cell stack plus its call-frame stack.
///
/// Overflow is a fatal error: it is reported and the current `exec_*` call
/// is aborted cleanly.
pub struct ExecutionStack {
    cells: Vec<Cell>,
    frames: Vec<CallFrame>,
    max_depth: usize,
}

impl ExecutionStack {
    pub fn new(max_depth: usize) -> Self {
        ExecutionStack {
            cells: Vec::new(),
            frames: Vec::new(),
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.cells.len()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, cell: Cell) -> TinResult<()> {
        if self.cells.len() >= self.max_depth {
            return Err(TinError::Runtime(RuntimeErrorKind::StackOverflow {
                max_depth: self.max_depth,
            }));
        }
        self.cells.push(cell);
        Ok(())
    }

    pub fn pop(&mut self) -> TinResult<Cell> {
        self.cells.pop().ok_or_else(|| {
            TinError::Runtime(RuntimeErrorKind::IndexOutOfBounds {
                index: -1,
                length: 0,
            })
        })
    }

    /// Peeks `k` cells down from the top (`peek(0)` is the top of stack).
    pub fn peek(&self, k: usize) -> TinResult<Cell> {
        let len = self.cells.len();
        if k >= len {
            return Err(TinError::Runtime(RuntimeErrorKind::IndexOutOfBounds {
                index: k as i64,
                length: len,
            }));
        }
        Ok(self.cells[len - 1 - k])
    }

    /// Reserves `n` void cells for locals above the current top, returning
    /// the base offset at which they start.
    pub fn reserve_locals(&mut self, n: usize) -> TinResult<usize> {
        let base = self.cells.len();
        for _ in 0..n {
            self.push(Cell::void())?;
        }
        Ok(base)
    }

    /// Pushes a new call frame for `fe`, reserving its parameter+local
    /// cells. Caller has already pushed the marshalled argument cells,
    /// which become the frame's base.
    pub fn push_frame(&mut self, fe: &FunctionEntry, base: usize) -> TinResult<()> {
        if self.frames.len() >= self.max_depth {
            return Err(TinError::Runtime(RuntimeErrorKind::StackOverflow {
                max_depth: self.max_depth,
            }));
        }
        let locals = (0..fe.frame_size())
            .map(|i| {
                let ty = fe
                    .params
                    .get(i)
                    .map(|p| p.var_type)
                    .unwrap_or(VarType::Void);
                VariableEntry::stack_slot(H32::NONE, ty, base + i, Default::default(), fe.name)
            })
            .collect();
        log::trace!("push_frame: {:?} base={} depth={}", fe.name, base, self.frames.len() + 1);
        self.frames.push(CallFrame {
            function: fe.name,
            namespace: fe.namespace,
            code_block: fe.code_block,
            ip: fe.entry_offset,
            base,
            locals,
        });
        Ok(())
    }

    /// Pops the current call frame, decrementing refcounts (via `on_drop`)
    /// for any string-handle cells in the frame's range.
    pub fn pop_frame(&mut self, mut on_drop: impl FnMut(&Cell)) -> TinResult<CallFrame> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| TinError::Runtime(RuntimeErrorKind::IndexOutOfBounds { index: -1, length: 0 }))?;
        while self.cells.len() > frame.base {
            let cell = self.cells.pop().unwrap();
            if cell.kind() == VarType::StringHandle {
                on_drop(&cell);
            }
        }
        log::trace!("pop_frame: {:?} depth={}", frame.function, self.frames.len());
        Ok(frame)
    }

    pub fn current_frame(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.last_mut()
    }

    /// Reads the cell at `frame-base + offset`.
    pub fn read_slot(&self, base: usize, offset: usize) -> TinResult<Cell> {
        self.cells.get(base + offset).copied().ok_or_else(|| {
            TinError::Runtime(RuntimeErrorKind::IndexOutOfBounds {
                index: offset as i64,
                length: self.cells.len().saturating_sub(base),
            })
        })
    }

    /// Writes the cell at `frame-base + offset`.
    pub fn write_slot(&mut self, base: usize, offset: usize, value: Cell) -> TinResult<()> {
        let idx = base + offset;
        if idx >= self.cells.len() {
            return Err(TinError::Runtime(RuntimeErrorKind::IndexOutOfBounds {
                index: offset as i64,
                length: self.cells.len().saturating_sub(base),
            }));
        }
        self.cells[idx] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FunctionEntry, ParamSlot};

    #[test]
    fn push_pop_balances() {
        let mut stack = ExecutionStack::new(64);
        let depth = stack.depth();
        stack.push(Cell::from_int(1)).unwrap();
        stack.push(Cell::from_int(2)).unwrap();
        stack.pop().unwrap();
        stack.pop().unwrap();
        assert_eq!(stack.depth(), depth);
    }

    #[test]
    fn overflow_is_reported() {
        let mut stack = ExecutionStack::new(2);
        stack.push(Cell::from_int(1)).unwrap();
        stack.push(Cell::from_int(2)).unwrap();
        let err = stack.push(Cell::from_int(3));
        assert!(matches!(
            err,
            Err(TinError::Runtime(RuntimeErrorKind::StackOverflow { .. }))
        ));
    }

    #[test]
    fn frame_push_pop_restores_depth_and_decrefs_strings() {
        let mut stack = ExecutionStack::new(64);
        let fe = FunctionEntry::scripted(
            H32::new("f"),
            H32::NONE,
            vec![ParamSlot {
                name: H32::NONE,
                var_type: VarType::StringHandle,
            }],
            0,
            0,
            0,
        );
        let base = stack.depth();
        stack.push(Cell::from_string_handle(H32::new("hi"))).unwrap();
        stack.push_frame(&fe, base).unwrap();
        let mut dropped = 0;
        stack.pop_frame(|_| dropped += 1).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(stack.depth(), base);
    }
}
