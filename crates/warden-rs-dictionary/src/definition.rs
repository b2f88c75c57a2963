//! Per-field constraint records resolved from a dictionary.

use crate::dictionary::Dictionary;
use crate::error::DictionaryError;
use std::fmt;
use std::path::{Path, PathBuf};
use warden_rs_policy::{Entry, Value, ValueKind};

/// Declared type of a dictionary definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    /// Unconstrained: any value kind is accepted.
    Undef,
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Floating point.
    Double,
    /// String.
    Str,
    /// Nested policy sub-tree.
    Policy,
}

impl DeclaredType {
    /// Parse a type token from a definition.
    ///
    /// The `file` token is rejected standalone; on a definition that
    /// declares `dictionaryFile` it is accepted as sugar for `policy`.
    pub(crate) fn parse(
        field: &str,
        token: &str,
        has_dictionary_file: bool,
    ) -> Result<Self, DictionaryError> {
        match token {
            "undef" | "undefined" => Ok(DeclaredType::Undef),
            "bool" | "boolean" => Ok(DeclaredType::Bool),
            "int" | "integer" => Ok(DeclaredType::Int),
            "double" | "real" => Ok(DeclaredType::Double),
            "string" => Ok(DeclaredType::Str),
            "policy" => Ok(DeclaredType::Policy),
            "file" if has_dictionary_file => Ok(DeclaredType::Policy),
            "file" => Err(DictionaryError::IllegalType {
                field: field.to_string(),
                token: token.to_string(),
            }),
            _ => Err(DictionaryError::UnknownType {
                field: field.to_string(),
                token: token.to_string(),
            }),
        }
    }

    /// The value kind this type accepts (`Undef` accepts every kind).
    pub fn kind(self) -> ValueKind {
        match self {
            DeclaredType::Undef => ValueKind::Undef,
            DeclaredType::Bool => ValueKind::Bool,
            DeclaredType::Int => ValueKind::Int,
            DeclaredType::Double => ValueKind::Double,
            DeclaredType::Str => ValueKind::String,
            DeclaredType::Policy => ValueKind::Policy,
        }
    }

    /// True when a value of `kind` satisfies this declared type.
    ///
    /// Strict kind equality: integers never pass as doubles, nor the
    /// reverse. File references never satisfy any type; they are a
    /// resolution state, not a kind mismatch.
    pub fn accepts(self, kind: ValueKind) -> bool {
        self == DeclaredType::Undef || self.kind() == kind
    }

    /// True when values of this type support range comparisons.
    pub(crate) fn orderable(self) -> bool {
        matches!(
            self,
            DeclaredType::Bool | DeclaredType::Int | DeclaredType::Double | DeclaredType::Str
        )
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().name())
    }
}

/// Nested sub-schema state of a policy-typed definition.
#[derive(Debug, Clone)]
pub(crate) enum SubDictionary {
    /// No nested schema declared.
    None,
    /// Resolved nested dictionary, inline or loaded from a fragment.
    Resolved(Box<Dictionary>),
    /// Declared via `dictionaryFile` but not yet loaded.
    Pending(PathBuf),
}

/// One field's resolved constraint record.
///
/// Built on demand by [`Dictionary::make_def`]; constructing one surfaces
/// the same authoring errors an explicit [`Dictionary::check`] would.
#[derive(Debug, Clone)]
pub struct Definition {
    pub(crate) name: String,
    pub(crate) declared: DeclaredType,
    pub(crate) min_occurs: usize,
    /// Upper bound on value count; 0 means unbounded.
    pub(crate) max_occurs: usize,
    pub(crate) min: Option<Value>,
    pub(crate) max: Option<Value>,
    pub(crate) allowed: Vec<Value>,
    pub(crate) sub: SubDictionary,
    pub(crate) defaults: Option<Entry>,
}

impl Definition {
    /// The definition's name in the dictionary.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn declared_type(&self) -> DeclaredType {
        self.declared
    }

    /// Minimum number of values required by a full validation pass.
    pub fn min_occurs(&self) -> usize {
        self.min_occurs
    }

    /// Maximum number of values permitted; 0 means unbounded.
    pub fn max_occurs(&self) -> usize {
        self.max_occurs
    }

    /// True when the definition permits array storage (maxOccurs other than 1).
    pub fn is_array_capable(&self) -> bool {
        self.max_occurs != 1
    }

    /// Declared lower range bound, if any.
    pub fn min(&self) -> Option<&Value> {
        self.min.as_ref()
    }

    /// Declared upper range bound, if any.
    pub fn max(&self) -> Option<&Value> {
        self.max.as_ref()
    }

    /// Declared enumeration of permitted values; empty means unrestricted.
    pub fn allowed(&self) -> &[Value] {
        &self.allowed
    }

    /// The resolved nested dictionary, if one is declared and loaded.
    pub fn sub_dictionary(&self) -> Option<&Dictionary> {
        match &self.sub {
            SubDictionary::Resolved(dictionary) => Some(dictionary),
            _ => None,
        }
    }

    /// Path of a declared-but-unloaded `dictionaryFile`, if any.
    pub fn pending_file(&self) -> Option<&Path> {
        match &self.sub {
            SubDictionary::Pending(path) => Some(path),
            _ => None,
        }
    }

    /// Declared default value(s), if any.
    pub fn default_values(&self) -> Option<&Entry> {
        self.defaults.as_ref()
    }
}
