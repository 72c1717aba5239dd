//! Result and error types representing the outcome of compiling a function.

use crate::mir::BlockId;
use std::fmt;

/// A compilation error.
///
/// The backend does not attempt partial compilation: every variant here is
/// fatal for the function (and therefore the module) being compiled.
#[derive(Debug, PartialEq)]
pub enum CodegenError {
    /// The input IR is malformed: a φ disagrees with its block's
    /// predecessors, a block is missing its terminator, or a virtual
    /// register is used without a reaching definition.
    MalformedIr {
        /// Name of the offending function.
        func: String,
        /// Block the problem was detected in, when known.
        block: Option<BlockId>,
        /// Human-readable description of the violation.
        message: String,
    },

    /// An operation the target has no lowering for.
    Unsupported(String),

    /// No physical register is available at a point where one is mandatory
    /// and the reserved scratch pool is also empty.
    RegisterExhausted {
        /// Name of the function being allocated.
        func: String,
        /// Description of the fixed point that could not be satisfied.
        message: String,
    },

    /// An internal data structure violated one of its invariants (duplicate
    /// CFG edge, missing block, stale adjacency).
    InvariantViolation(String),

    /// No backend is registered for the requested target.
    UnknownTarget(String),
}

/// A convenient alias for a `Result` that uses `CodegenError` as the error.
pub type CodegenResult<T> = Result<T, CodegenError>;

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MalformedIr {
                func,
                block: Some(block),
                message,
            } => write!(f, "malformed IR in {func}, {block}: {message}"),
            Self::MalformedIr {
                func,
                block: None,
                message,
            } => write!(f, "malformed IR in {func}: {message}"),
            Self::Unsupported(what) => write!(f, "unsupported operation: {what}"),
            Self::RegisterExhausted { func, message } => {
                write!(f, "register exhaustion in {func}: {message}")
            }
            Self::InvariantViolation(what) => write!(f, "invariant violation: {what}"),
            Self::UnknownTarget(what) => write!(f, "no registered target for {what}"),
        }
    }
}

impl std::error::Error for CodegenError {}
