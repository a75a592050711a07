//! Error types for rewriting and for the crate-level entry points.

use crate::eval::EvalError;
use crate::parser::ParseError;
use std::fmt;
use thiserror::Error;

/// 1-based position of a positional macro argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgPos(pub usize);

impl fmt::Display for ArgPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "argument {}", self.0)
    }
}

/// Misuse of the macro mini-language.
///
/// Any of these aborts the whole invocation; no partial rewrite is emitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("{arg}: unknown flag character '{ch}' in @{flags}")]
    UnknownFlagCharacter { arg: ArgPos, ch: char, flags: String },

    #[error("{arg}: flags @{flags} ask for both row-wise and column-wise processing")]
    ConflictingModeFlags { arg: ArgPos, flags: String },

    #[error("{arg}: invalid table-collection sink `{sink}`: {reason}")]
    InvalidTableSink {
        arg: ArgPos,
        sink: String,
        reason: String,
    },

    #[error("{arg}: field `{field}` is not processed the same way as field `{first}` of its table collection")]
    MixedModeInTableGroup {
        arg: ArgPos,
        field: String,
        first: String,
    },

    #[error("{arg}: `{expr}` is not a column identifier ({found})")]
    InvalidColumnIdentifierType {
        arg: ArgPos,
        expr: String,
        found: String,
    },

    #[error("{arg}: malformed argument `{expr}`: {reason}")]
    MalformedArgumentShape {
        arg: ArgPos,
        expr: String,
        reason: String,
    },
}

impl RewriteError {
    /// The argument the error points at.
    pub fn arg(&self) -> ArgPos {
        match self {
            RewriteError::UnknownFlagCharacter { arg, .. }
            | RewriteError::ConflictingModeFlags { arg, .. }
            | RewriteError::InvalidTableSink { arg, .. }
            | RewriteError::MixedModeInTableGroup { arg, .. }
            | RewriteError::InvalidColumnIdentifierType { arg, .. }
            | RewriteError::MalformedArgumentShape { arg, .. } => *arg,
        }
    }

    pub(crate) fn malformed(arg: ArgPos, expr: impl fmt::Display, reason: impl Into<String>) -> Self {
        RewriteError::MalformedArgumentShape {
            arg,
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn table_sink(arg: ArgPos, sink: impl fmt::Display, reason: impl Into<String>) -> Self {
        RewriteError::InvalidTableSink {
            arg,
            sink: sink.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for rewriting operations.
pub type RewriteResult<T> = Result<T, RewriteError>;

/// Errors surfaced by the crate-level entry points.
#[derive(Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
