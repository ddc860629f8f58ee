//! Error kinds for the runtime.
//!
//! Errors are values, never panics or unwinds: every fallible entry point
//! returns a `Result`, and the VM records the first error it hits during a
//! given `exec_*` call rather than propagating exceptions through arbitrary
//! frames.

use thiserror::Error;

use crate::hash::H32;

/// The top-level error categories the runtime can report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TinError {
    /// Source failed to compile; the failing script is rejected and runtime
    /// state is unchanged.
    #[error("compile error at line {line}: {message}")]
    Compile { line: u32, message: String },

    /// Unresolved function or class at call time.
    #[error("link error: {0}")]
    Link(#[from] LinkErrorKind),

    /// No conversion path between operand types.
    #[error("type error: {0}")]
    Type(#[from] TypeErrorKind),

    /// Divide-by-zero, bounds, null-object, stack overflow, infinite loop.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeErrorKind),

    /// Raised by native code via the dispatcher.
    #[error("host assert: {0}")]
    HostAssert(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkErrorKind {
    #[error("unresolved function {0}")]
    UnresolvedFunction(H32),
    #[error("unresolved class {0}")]
    UnresolvedClass(H32),
    #[error("unresolved member {member} on namespace {namespace}")]
    UnresolvedMember { namespace: H32, member: H32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeErrorKind {
    #[error("no conversion from {from} to {to}")]
    NoConversion {
        from: &'static str,
        to: &'static str,
    },
    #[error("no operator override for {op} on {ty}")]
    NoOperator { op: &'static str, ty: &'static str },
}

/// Recoverable unless noted: the VM substitutes a default-typed zero and
/// continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    #[error("integer divide by zero")]
    IntegerDivideByZero,
    #[error("array index {index} out of bounds (length {length})")]
    IndexOutOfBounds { index: i64, length: usize },
    #[error("method call on nil object-id")]
    NilObjectId,
    #[error("stack overflow (max depth {max_depth})")]
    StackOverflow { max_depth: usize },
    #[error("infinite loop guard tripped at offset {offset} in code block {code_block}")]
    InfiniteLoopGuard { code_block: u32, offset: u32 },
    #[error("object {0} is not alive")]
    ObjectNotAlive(u32),
}

impl RuntimeErrorKind {
    /// Only stack overflow and the infinite-loop guard abort the entire
    /// outermost `exec_*` call; everything else is recoverable at the
    /// instruction granularity.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeErrorKind::StackOverflow { .. } | RuntimeErrorKind::InfiniteLoopGuard { .. }
        )
    }
}

/// Convenience alias used throughout the crate.
pub type TinResult<T> = Result<T, TinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_overflow_and_loop_guard_are_fatal() {
        assert!(RuntimeErrorKind::StackOverflow { max_depth: 8 }.is_fatal());
        assert!(RuntimeErrorKind::InfiniteLoopGuard {
            code_block: 0,
            offset: 0
        }
        .is_fatal());
        assert!(!RuntimeErrorKind::IntegerDivideByZero.is_fatal());
        assert!(!RuntimeErrorKind::IndexOutOfBounds {
            index: -1,
            length: 0
        }
        .is_fatal());
    }
}
