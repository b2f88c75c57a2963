//! Violation bitmask and the accumulating validation report.

use bitflags::bitflags;
use std::collections::BTreeMap;
use std::fmt;

bitflags! {
    /// Validation violations recorded against a single field path.
    ///
    /// Each violation kind is a distinct bit; simultaneous violations on
    /// one field combine with bitwise OR and stay independently queryable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Violations: u32 {
        /// Value kind differs from the declared type.
        const WRONG_TYPE = 1 << 0;
        /// Required field (minOccurs > 0) is absent.
        const MISSING_REQUIRED = 1 << 1;
        /// Scalar storage where the definition permits arrays.
        const NOT_AN_ARRAY = 1 << 2;
        /// Fewer values than minOccurs.
        const ARRAY_TOO_SHORT = 1 << 3;
        /// More values than maxOccurs.
        const TOO_MANY_VALUES = 1 << 4;
        /// Value outside the declared [min, max] range.
        const VALUE_OUT_OF_RANGE = 1 << 5;
        /// Value absent from the declared enumeration.
        const VALUE_DISALLOWED = 1 << 6;
        /// Instance key with no explicit or wildcard definition.
        const UNKNOWN_NAME = 1 << 7;
        /// File reference not yet resolved into a sub-tree.
        const NOT_LOADED = 1 << 8;
    }
}

impl Violations {
    /// The empty set: no violations.
    pub const OK: Violations = Violations::empty();
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("OK");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            f.write_str(name)?;
        }
        Ok(())
    }
}

/// Per-path violation masks accumulated across one validation pass.
///
/// Created empty by the caller and passed in by mutable reference; never
/// shared across concurrent validations of one instance. The provenance
/// triple (source, ordinal, label) identifies the originating check and is
/// used for diagnostics only.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    source: String,
    ordinal: u32,
    label: String,
    errors: BTreeMap<String, Violations>,
}

impl ValidationReport {
    /// Create an empty report for the given originating check.
    pub fn new(source: impl Into<String>, ordinal: u32, label: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ordinal,
            label: label.into(),
            errors: BTreeMap::new(),
        }
    }

    /// Identifier of the originating check.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Ordinal of the originating check.
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Description of the originating check.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// OR `violations` into the mask recorded for `path`.
    ///
    /// Recording is additive; repeated reports for one path accumulate and
    /// never overwrite. Recording an empty mask is a no-op.
    pub fn record(&mut self, path: impl Into<String>, violations: Violations) {
        if violations.is_empty() {
            return;
        }
        let slot = self.errors.entry(path.into()).or_insert(Violations::OK);
        *slot |= violations;
    }

    /// The accumulated mask for one path (`OK` when none recorded).
    pub fn errors_for(&self, path: &str) -> Violations {
        self.errors.get(path).copied().unwrap_or(Violations::OK)
    }

    /// The OR of the masks across every recorded path.
    pub fn errors(&self) -> Violations {
        self.errors
            .values()
            .fold(Violations::OK, |acc, mask| acc | *mask)
    }

    /// Number of distinct paths with a non-empty mask.
    pub fn field_count(&self) -> usize {
        self.errors.len()
    }

    /// Recorded paths, in deterministic order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    /// True when no violations have been recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} field(s) in violation ({}#{} {})",
            self.field_count(),
            self.source,
            self.ordinal,
            self.label
        )?;
        for (path, mask) in &self.errors {
            write!(f, "\n  {path}: {mask}")?;
        }
        Ok(())
    }
}
