//! Error types for policy tree access and fragment resolution.

use crate::value::ValueKind;
use thiserror::Error;

/// Errors returned by policy tree operations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// No value exists at the requested path.
    #[error("no value at {0}")]
    NotFound(String),
    /// A value had a different kind than the accessor expected.
    #[error("wrong type at {path}: expected {expected}, found {actual}")]
    TypeMismatch {
        path: String,
        expected: ValueKind,
        actual: ValueKind,
    },
    /// Appending a value to an array whose elements have a different kind.
    #[error("mixed kinds at {path}: array holds {existing}, appended {appended}")]
    MixedArray {
        path: String,
        existing: ValueKind,
        appended: ValueKind,
    },
    /// A dotted path was empty or contained an empty segment.
    #[error("invalid path {0:?}")]
    InvalidPath(String),
    /// A tree value that the policy model cannot represent.
    #[error("unsupported value at {path}: {reason}")]
    Unsupported { path: String, reason: String },
    /// Reading a policy fragment failed.
    #[error("failed to read fragment: {0}")]
    ReadFailed(#[from] std::io::Error),
    /// Parsing a policy fragment failed.
    #[error("failed to parse fragment: {0}")]
    ParseFailed(#[from] json5::Error),
    /// Fragment references form a cycle.
    #[error("circular fragment reference: {0}")]
    CircularReference(String),
}
