//! Error types for template compilation and evaluation.

use thiserror::Error;

/// A template source failed to parse.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Syntax error with source location.
    #[error("line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
}

/// Evaluation failed on non-hole content.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A name resolved to nothing in the scope chain.
    #[error("line {line}: \"{name}\": unknown identifier")]
    UnknownIdentifier { line: usize, name: String },

    /// A call named no registered helper.
    #[error("line {line}: \"{name}\": unknown helper")]
    UnknownHelper { line: usize, name: String },

    /// A constant helper was invoked as a function.
    #[error("line {line}: \"{name}\" is not callable")]
    NotCallable { line: usize, name: String },

    /// Wrong number of arguments passed to a helper.
    #[error("line {line}: helper \"{name}\" expects {expected} arguments, got {got}")]
    ArgumentCount {
        line: usize,
        name: String,
        expected: usize,
        got: usize,
    },

    /// An operation was applied to values of the wrong type.
    #[error("line {line}: {message}")]
    TypeMismatch { line: usize, message: String },
}
