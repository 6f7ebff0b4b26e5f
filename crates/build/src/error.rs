//! Builder error types (§7). Two tiers: `BuildError` aborts the build of the
//! enclosing function; `Diagnostic` with `Severity::Warning` is logged and
//! build continues — the same split as the teacher's `lint.rs`
//! (`Severity::{Error,Warning,Hint}`) and its hand-rolled `CodeGenError`
//! (`Display` + `Error` impls, no `thiserror`).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, message: message.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.severity, self.message)
    }
}

/// A fatal programmer error (§7): these abort the build of the enclosing
/// function. Never retried — "either the contract holds and the function
/// is built, or the contract is violated and the function is rejected."
#[derive(Debug, Clone)]
pub enum BuildError {
    /// An instruction operand references a value from a different function.
    CrossFunctionOperand { function: String },
    /// A phi's edge count does not match its block's predecessor count.
    PhiArityMismatch { block: u32, expected: usize, got: usize },
    /// A generic instance was requested with the wrong number of type
    /// arguments.
    WrongGenericArity { function: String, expected: usize, got: usize },
    /// A call whose resolved signature has the wrong arity.
    WrongCallArity { callee: String, expected: usize, got: usize },
    /// A sanity-pass inconsistency, reported only when
    /// `sanity_check_functions` is set.
    SanityFailed { function: String, reason: String },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::CrossFunctionOperand { function } => {
                write!(f, "operand from a different function used while building {function}")
            }
            BuildError::PhiArityMismatch { block, expected, got } => {
                write!(f, "block {block}: phi has {got} edges, expected {expected} (one per predecessor)")
            }
            BuildError::WrongGenericArity { function, expected, got } => {
                write!(f, "{function}: generic instantiation given {got} type arguments, expected {expected}")
            }
            BuildError::WrongCallArity { callee, expected, got } => {
                write!(f, "call to {callee}: {got} arguments, expected {expected}")
            }
            BuildError::SanityFailed { function, reason } => {
                write!(f, "sanity check failed for {function}: {reason}")
            }
        }
    }
}

impl std::error::Error for BuildError {}
