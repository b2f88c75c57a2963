//! Schema-driven validation for policy trees.
//!
//! A [`Dictionary`] declares, per field, an expected type, value
//! cardinality, ranges, enumerations, and, for nested configuration, a
//! sub-dictionary. Validation of a policy instance reports every violation
//! in one pass into a bitmask-accumulating [`ValidationReport`];
//! [`BoundPolicy`] couples a tree to a shared dictionary and checks
//! single-field edits at the point of mutation.

mod bound;
mod definition;
mod dictionary;
mod error;
mod report;

/// Self-validating policy bound to a shared dictionary.
pub use bound::BoundPolicy;
/// Resolved per-field constraint records.
pub use definition::{DeclaredType, Definition};
/// The dictionary and its reserved wildcard definition name.
pub use dictionary::{Dictionary, WILDCARD_NAME};
/// The two failure taxonomies and their boundary type.
pub use error::{DictionaryError, ValidateError, ValidationFailure};
/// Violation bitmask and accumulating report.
pub use report::{ValidationReport, Violations};
