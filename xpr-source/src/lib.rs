//! Source text representation and the expression evaluator's error type.

use std::fmt;
use thiserror::Error;

/// Borrowed view over the original expression text, plus helpers for turning a
/// byte offset into a printable source line and caret column.
pub struct Source<'a> {
    /// Original source code.
    pub content: &'a str,
}

impl<'a> Source<'a> {
    /// Create a new `Source` with the specified `content`.
    pub fn new(content: &'a str) -> Self {
        Self { content }
    }

    /// Returns the line containing `position` and the zero-based column of
    /// `position` within that line, both counted in bytes.
    ///
    /// Expressions are effectively single-line, but this walks newlines
    /// defensively rather than assuming it.
    pub fn line_and_column(&self, position: usize) -> (&'a str, usize) {
        let position = position.min(self.content.len());
        let line_start = self.content[..position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = self.content[position..]
            .find('\n')
            .map(|i| position + i)
            .unwrap_or(self.content.len());
        (&self.content[line_start..line_end], position - line_start)
    }
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(content: &'a str) -> Self {
        Source::new(content)
    }
}

/// The closed set of error kinds the evaluator can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpErrorKind {
    InvalExpr,
    InvalArgCountHigh,
    InvalArgCountLow,
    InvalArg,
    InvalFunc,
    InvalParam,
    InvalOperator,
    NoMem,
    Complex,
    DivByZero,
    NonInteger,
    NonNumeric,
    NonBoolean,
    NonString,
    IntOverflow,
    Trigonometric,
    InvalRet,
    UserFuncError,
}

impl fmt::Display for ExpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExpErrorKind::InvalExpr => "InvalExpr",
            ExpErrorKind::InvalArgCountHigh => "InvalArgCountHigh",
            ExpErrorKind::InvalArgCountLow => "InvalArgCountLow",
            ExpErrorKind::InvalArg => "InvalArg",
            ExpErrorKind::InvalFunc => "InvalFunc",
            ExpErrorKind::InvalParam => "InvalParam",
            ExpErrorKind::InvalOperator => "InvalOperator",
            ExpErrorKind::NoMem => "NoMem",
            ExpErrorKind::Complex => "Complex",
            ExpErrorKind::DivByZero => "DivByZero",
            ExpErrorKind::NonInteger => "NonInteger",
            ExpErrorKind::NonNumeric => "NonNumeric",
            ExpErrorKind::NonBoolean => "NonBoolean",
            ExpErrorKind::NonString => "NonString",
            ExpErrorKind::IntOverflow => "IntOverflow",
            ExpErrorKind::Trigonometric => "Trigonometric",
            ExpErrorKind::InvalRet => "InvalRet",
            ExpErrorKind::UserFuncError => "UserFuncError",
        };
        f.write_str(name)
    }
}

/// An error produced while compiling or solving an expression.
///
/// `position` is the byte offset of the offending token in the original
/// source, or `None` for context-free failures (e.g. a host callback that
/// doesn't report a position).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExpError {
    pub kind: ExpErrorKind,
    pub message: String,
    pub position: Option<usize>,
}

impl ExpError {
    pub fn new(kind: ExpErrorKind, message: impl Into<String>, position: Option<usize>) -> Self {
        Self {
            kind,
            message: message.into(),
            position,
        }
    }

    /// An error tied to a specific byte offset in the source.
    pub fn at(kind: ExpErrorKind, message: impl Into<String>, position: usize) -> Self {
        Self::new(kind, message, Some(position))
    }

    /// A context-free error (no meaningful source position).
    pub fn context_free(kind: ExpErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None)
    }
}

pub type ExpResult<T> = Result<T, ExpError>;
