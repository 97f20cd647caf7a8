//! Error types for analysis, configuration and guarded calls.

use crate::violation::ScopeViolation;
use localscope_runtime::Exception;
use std::sync::Arc;
use thiserror::Error;

/// A compiled callable could not be analyzed.
///
/// Analysis never degrades to a partial access set; any construct it cannot
/// account for surfaces as one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("{qualname}: unknown opcode 0x{opcode:02x} at instruction {pc}")]
    UnknownOpcode {
        qualname: Arc<str>,
        pc: usize,
        opcode: u8,
    },

    #[error("{qualname}: {table} index {index} out of range at instruction {pc}")]
    IndexOutOfRange {
        qualname: Arc<str>,
        pc: usize,
        table: &'static str,
        index: u16,
    },

    #[error("{qualname}: function created from a {kind} constant at instruction {pc}")]
    NotCode {
        qualname: Arc<str>,
        pc: usize,
        kind: &'static str,
    },

    #[error("{qualname}: nested deeper than {limit} levels")]
    TooDeep { qualname: Arc<str>, limit: usize },
}

/// Invalid guard configuration, reported before any call can happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("`{0}` is not a valid identifier")]
    InvalidName(Arc<str>),

    #[error("allowed type `{0}` is not a type")]
    NotAType(Arc<str>),

    #[error("cannot analyze callable: {0}")]
    Extraction(#[from] ExtractError),
}

/// Failure of a guarded call.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The guard refused the call; the callable did not run.
    #[error(transparent)]
    Scope(#[from] ScopeViolation),

    /// The callable ran and raised.
    #[error(transparent)]
    Raised(#[from] Exception),
}

impl CallError {
    /// The violation, if the guard refused the call.
    pub fn violation(&self) -> Option<&ScopeViolation> {
        match self {
            CallError::Scope(violation) => Some(violation),
            CallError::Raised(_) => None,
        }
    }

    /// The exception, if the callable raised.
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            CallError::Raised(exception) => Some(exception),
            CallError::Scope(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_display() {
        let err = ExtractError::UnknownOpcode {
            qualname: "f".into(),
            pc: 3,
            opcode: 0xff,
        };
        assert_eq!(err.to_string(), "f: unknown opcode 0xff at instruction 3");

        let err = ExtractError::IndexOutOfRange {
            qualname: "g.<locals>.h".into(),
            pc: 0,
            table: "name",
            index: 9,
        };
        assert_eq!(
            err.to_string(),
            "g.<locals>.h: name index 9 out of range at instruction 0"
        );
    }

    #[test]
    fn test_config_error_from_extract() {
        let err: ConfigError = ExtractError::TooDeep {
            qualname: "f".into(),
            limit: 64,
        }
        .into();
        assert!(matches!(err, ConfigError::Extraction(_)));
        assert_eq!(
            err.to_string(),
            "cannot analyze callable: f: nested deeper than 64 levels"
        );
    }

    #[test]
    fn test_call_error_passes_exception_through() {
        let err: CallError = Exception::zero_division().into();
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        assert!(err.violation().is_none());
        assert_eq!(err.exception(), Some(&Exception::zero_division()));
    }
}
