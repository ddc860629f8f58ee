//! [`VariableEntry`]: a uniform record describing one typed storage slot.

use bitflags::bitflags;

use crate::hash::H32;
use crate::value::{Cell, VarType};

bitflags! {
    /// Lifecycle/role flags carried by a [`VariableEntry`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VarFlags: u8 {
        const PARAMETER = 0b0001;
        const LOCAL     = 0b0010;
        const MEMBER    = 0b0100;
        const DYNAMIC   = 0b1000;
    }
}

/// Where a [`VariableEntry`]'s storage physically lives.
#[derive(Debug, Clone)]
pub enum Storage {
    /// Value lives inline in the entry itself.
    Inline(Cell),
    /// A fixed-size array living on the heap, `kind` repeated `len` times.
    HeapArray(Vec<Cell>),
    /// An offset into a call frame's cell range (frame-base relative).
    StackOffset(usize),
    /// A raw host pointer for a host-registered object's native member.
    HostPointer(usize),
    /// A reference to another VE (by owning namespace/object + name), used
    /// for aliasing rather than copying.
    Reference { owner: H32, name: H32 },
}

/// One typed storage slot: name, type, array length, storage location,
/// lifecycle flags, and a back-reference to the owning function or
/// namespace. Array length is always ≥ 1 (1 for scalars).
#[derive(Debug, Clone)]
pub struct VariableEntry {
    pub name: H32,
    pub var_type: VarType,
    array_len: usize,
    pub storage: Storage,
    pub flags: VarFlags,
    /// `H32::NONE` when the owner is the global namespace/no owning
    /// function; otherwise the owning function or namespace's hash.
    pub owner: H32,
}

impl VariableEntry {
    /// Creates a scalar VE holding the type's default zero value inline.
    pub fn scalar(name: H32, var_type: VarType, flags: VarFlags, owner: H32) -> Self {
        VariableEntry {
            name,
            var_type,
            array_len: 1,
            storage: Storage::Inline(Cell::default_for(var_type)),
            flags,
            owner,
        }
    }

    /// Creates a fixed-size array VE of `len` elements (`len` ≥ 1).
    pub fn array(name: H32, var_type: VarType, len: usize, flags: VarFlags, owner: H32) -> Self {
        let len = len.max(1);
        VariableEntry {
            name,
            var_type,
            array_len: len,
            storage: Storage::HeapArray(vec![Cell::default_for(var_type); len]),
            flags,
            owner,
        }
    }

    /// Creates a VE whose storage lives at `offset` cells into the current
    /// call frame (used for parameters and locals).
    pub fn stack_slot(name: H32, var_type: VarType, offset: usize, flags: VarFlags, owner: H32) -> Self {
        VariableEntry {
            name,
            var_type,
            array_len: 1,
            storage: Storage::StackOffset(offset),
            flags,
            owner,
        }
    }

    pub fn array_len(&self) -> usize {
        self.array_len
    }

    pub fn is_array(&self) -> bool {
        self.array_len > 1
    }

    /// Reads the scalar/inline value, if this VE is backed by inline or
    /// heap-array storage. Stack-relative and host-pointer VEs are resolved
    /// by the execution stack / object registry respectively.
    pub fn inline_value(&self) -> Option<Cell> {
        match &self.storage {
            Storage::Inline(c) => Some(*c),
            Storage::HeapArray(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn set_inline_value(&mut self, value: Cell) {
        if let Storage::Inline(c) = &mut self.storage {
            *c = value;
        }
    }

    pub fn array_get(&self, index: usize) -> Option<Cell> {
        match &self.storage {
            Storage::HeapArray(v) => v.get(index).copied(),
            Storage::Inline(c) if index == 0 => Some(*c),
            _ => None,
        }
    }

    pub fn array_set(&mut self, index: usize, value: Cell) -> bool {
        match &mut self.storage {
            Storage::HeapArray(v) => {
                if let Some(slot) = v.get_mut(index) {
                    *slot = value;
                    true
                } else {
                    false
                }
            }
            Storage::Inline(c) if index == 0 => {
                *c = value;
                true
            }
            _ => false,
        }
    }
}
