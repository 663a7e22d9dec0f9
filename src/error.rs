//! Compile-time failures. Propagation is fail-fast: the first error aborts
//! the compilation with a message naming the offending form.

use crate::reader::ReadError;
use crate::sexpr::Sexpr;

#[derive(Debug, Clone)]
pub enum CompileError {
    /// Malformed S-expression, reported with its byte offset.
    Read(ReadError),
    /// Malformed core form, reserved-word misuse, duplicate parameter,
    /// improper lambda header, unknown head symbol. Carries the form.
    Syntax(Sexpr, &'static str),
    NotYetImplemented(&'static str),
    /// An invariant violation inside the compiler, not a user error.
    Internal(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Read(e) => write!(f, "{}", e),
            CompileError::Syntax(form, what) => write!(f, "syntax error: {}: {}", what, form),
            CompileError::NotYetImplemented(what) => {
                write!(f, "not yet implemented: {}", what)
            }
            CompileError::Internal(what) => write!(f, "internal compiler error: {}", what),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<ReadError> for CompileError {
    fn from(e: ReadError) -> Self {
        CompileError::Read(e)
    }
}
