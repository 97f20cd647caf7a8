//! Exceptions raised by callables.
//!
//! The guard never inspects these; they travel back to the caller untouched.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Exception class of a raised [`Exception`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    TypeError,
    NameError,
    ValueError,
    AttributeError,
    ZeroDivisionError,
    RuntimeError,
}

impl ExceptionKind {
    pub const fn name(self) -> &'static str {
        match self {
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::RuntimeError => "RuntimeError",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An exception raised by a callable body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Exception {
    pub kind: ExceptionKind,
    pub message: Arc<str>,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<Arc<str>>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    /// `name 'x' is not defined`
    pub fn name_error(name: &str) -> Self {
        Self::new(
            ExceptionKind::NameError,
            format!("name '{name}' is not defined"),
        )
    }

    pub fn zero_division() -> Self {
        Self::new(ExceptionKind::ZeroDivisionError, "division by zero")
    }

}
