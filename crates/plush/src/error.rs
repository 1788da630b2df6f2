//! Top-level render errors.
//!
//! Only genuine failures surface here. Cache conditions — not found,
//! stale, disabled — are ordinary miss states inside the engine and fall
//! through to a fresh render instead of raising.

use thiserror::Error;

use crate::compiler::{EvalError, ParseError};

/// An error returned from a render call.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The template source failed to compile.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Evaluation failed on non-hole content.
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// A hole marker carried a captured failure into the splice.
    #[error("{message}")]
    HoleFill { message: String },

    /// A partial was rendered without a feeder configured on the engine.
    #[error("could not find partial feeder, configure one on the engine")]
    MissingFeeder,

    /// The partial feeder failed to produce source text.
    #[error("partial '{name}': {source}")]
    Feeder {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Reading source text from a reader failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
