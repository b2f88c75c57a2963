//! Error types for dictionary authoring defects and validation failures.
//!
//! The two taxonomies are disjoint: [`DictionaryError`] covers defects in a
//! dictionary itself and is raised immediately; data violations accumulate
//! into a report and only become a raised [`ValidationFailure`] at the
//! caller's request.

use crate::report::ValidationReport;
use thiserror::Error;
use warden_rs_policy::{PolicyError, ValueKind};

/// Authoring-time defects in a dictionary, plus the unresolved-reference
/// precondition that blocks validation.
#[derive(Debug, Error)]
pub enum DictionaryError {
    /// The reserved definitions section appears more than once.
    #[error("expected a single definitions section, found {0}")]
    MultipleDefinitions(usize),
    /// The reserved definitions section is absent.
    #[error("missing definitions section")]
    MissingDefinitions,
    /// No definition exists for the requested field.
    #[error("no definition for {0}")]
    UndefinedField(String),
    /// A definition entry is not a policy sub-tree.
    #[error("definition for {0} is not a policy")]
    MalformedDefinition(String),
    /// A type token that names no known type.
    #[error("unknown type \"{token}\" for {field}")]
    UnknownType { field: String, token: String },
    /// A type token that is not permitted in this position.
    #[error("illegal type \"{token}\" for {field}")]
    IllegalType { field: String, token: String },
    /// The `type` property itself is not a string literal.
    #[error("expected string for {field} type, found {actual}")]
    TypeNotString { field: String, actual: ValueKind },
    /// An occurrence bound that is not a non-negative integer.
    #[error("occurs bound {field} is not a non-negative integer")]
    BadOccurs { field: String },
    /// More than one min value for one definition.
    #[error("min value for {0} occurs multiple times")]
    MultipleMin(String),
    /// More than one max value for one definition.
    #[error("max value for {0} occurs multiple times")]
    MultipleMax(String),
    /// Min value kind does not match the declared type.
    #[error("wrong type for {field} min: expected {expected}, found {actual}")]
    MinWrongType {
        field: String,
        expected: ValueKind,
        actual: ValueKind,
    },
    /// Max value kind does not match the declared type.
    #[error("wrong type for {field} max: expected {expected}, found {actual}")]
    MaxWrongType {
        field: String,
        expected: ValueKind,
        actual: ValueKind,
    },
    /// An allowed value kind does not match the declared type.
    #[error("wrong type for {field} allowed value: expected {expected}, found {actual}")]
    AllowedWrongType {
        field: String,
        expected: ValueKind,
        actual: ValueKind,
    },
    /// More than one childDefinition in one dictionary.
    #[error("multiple childDefinition entries in one dictionary")]
    MultipleWildcards,
    /// A nested sub-dictionary declaration is malformed.
    #[error("{field}: {reason}")]
    MalformedSubdictionary { field: String, reason: String },
    /// A property that is not part of the dictionary schema.
    #[error("unknown dictionary property {0}")]
    UnknownProperty(String),
    /// A nested dictionaryFile reference that has not been resolved.
    ///
    /// This blocks validation of the affected field and is raised
    /// immediately, never folded into a report.
    #[error("dictionaryFile for {0} needs to be loaded before validation")]
    SubdictionaryNotLoaded(String),
    /// Operation requires a bound dictionary.
    #[error("no dictionary bound to this policy")]
    NoDictionary,
    /// The backing tree or a referenced fragment failed underneath.
    #[error("policy tree error: {0}")]
    Tree(#[from] PolicyError),
}

/// A validation pass found data violations; carries the whole report.
#[derive(Debug, Error)]
#[error("validation failed: {report}")]
pub struct ValidationFailure {
    /// Everything found in the pass, per dotted field path.
    pub report: ValidationReport,
}

/// Boundary error distinguishing schema defects from data violations.
#[derive(Debug, Error)]
pub enum ValidateError {
    /// The dictionary itself is defective or unresolved.
    #[error(transparent)]
    Schema(#[from] DictionaryError),
    /// The instance violates the dictionary.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
}
