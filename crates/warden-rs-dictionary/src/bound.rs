//! Policies bound to a dictionary for incremental self-validation.

use crate::definition::{Definition, SubDictionary};
use crate::dictionary::{Dictionary, WILDCARD_NAME, join_path, range_violations};
use crate::error::{DictionaryError, ValidateError, ValidationFailure};
use crate::report::{ValidationReport, Violations};
use log::{debug, warn};
use std::path::Path;
use std::sync::Arc;
use warden_rs_policy::{Entry, FragmentResolver, Policy, PolicyError, Value, ValueKind, parse_path};

/// A policy tree optionally bound to a shared dictionary.
///
/// The binding is a non-owning association: the dictionary is shared and
/// may outlive any number of bound instances. While bound, single-field
/// edits are checked at the point of mutation against the governing
/// definition; whole-tree invariants (required fields, minimum
/// cardinality) are deferred to an explicit [`validate`](Self::validate),
/// since intermediate states while building up a value are legitimate.
#[derive(Debug, Clone, Default)]
pub struct BoundPolicy {
    policy: Policy,
    dictionary: Option<Arc<Dictionary>>,
}

impl BoundPolicy {
    /// Wrap an existing tree with no dictionary bound.
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            dictionary: None,
        }
    }

    /// Build a policy purely from a dictionary's defaults, bind it, and
    /// validate the result.
    ///
    /// Defaults that violate their own definitions surface as a
    /// [`ValidationFailure`] carrying the full report.
    pub fn from_defaults(dictionary: Arc<Dictionary>) -> Result<Self, ValidateError> {
        let mut bound = Self {
            policy: Policy::new(),
            dictionary: None,
        };
        bound.merge_defaults(&dictionary)?;
        bound.bind_dictionary(dictionary);
        bound.validate_strict()?;
        Ok(bound)
    }

    /// Bind a dictionary. Binding does not itself validate.
    pub fn bind_dictionary(&mut self, dictionary: Arc<Dictionary>) {
        self.dictionary = Some(dictionary);
    }

    /// Replace the bound dictionary without re-validating existing data.
    ///
    /// Subsequent validation and edits use the new dictionary and may
    /// newly report `UNKNOWN_NAME` or type violations for data that was
    /// valid under the old one.
    pub fn rebind_dictionary(&mut self, dictionary: Arc<Dictionary>) {
        debug!("rebinding dictionary");
        self.dictionary = Some(dictionary);
    }

    /// True once a dictionary is bound.
    pub fn can_validate(&self) -> bool {
        self.dictionary.is_some()
    }

    /// The bound dictionary, if any.
    pub fn dictionary(&self) -> Option<&Arc<Dictionary>> {
        self.dictionary.as_ref()
    }

    /// The underlying tree.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Unwrap into the underlying tree, dropping the binding.
    pub fn into_policy(self) -> Policy {
        self.policy
    }

    /// Replace the value at `path` with a scalar, checking it against the
    /// governing definition first.
    ///
    /// Only the per-value checks run here (type, range, enumeration),
    /// never required-ness. On violation the mutation is rejected whole
    /// and the tree is left untouched.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), ValidateError> {
        let value = value.into();
        if let Some(dictionary) = self.dictionary.clone() {
            let definition = governing_def(&dictionary, path)?;
            let mask = per_value_mask(&definition, &value);
            if !mask.is_empty() {
                return Err(single_field_failure("set", path, mask));
            }
        }
        self.policy
            .set(path, value)
            .map_err(|err| tree_failure("set", err))
    }

    /// Append a value at `path`, checking it against the governing
    /// definition and the maxOccurs bound first.
    pub fn add(&mut self, path: &str, value: impl Into<Value>) -> Result<(), ValidateError> {
        let value = value.into();
        if let Some(dictionary) = self.dictionary.clone() {
            let definition = governing_def(&dictionary, path)?;
            let mut mask = per_value_mask(&definition, &value);
            let count = self.policy.value_count(path);
            if definition.max_occurs() > 0 && count + 1 > definition.max_occurs() {
                mask |= Violations::TOO_MANY_VALUES;
            }
            if !mask.is_empty() {
                return Err(single_field_failure("add", path, mask));
            }
        }
        self.policy
            .add(path, value)
            .map_err(|err| tree_failure("add", err))
    }

    /// Remove the entry at `path`; unconditionally allowed.
    pub fn remove(&mut self, path: &str) {
        self.policy.remove(path);
    }

    /// Run the full validation pass against the bound dictionary,
    /// accumulating into `report`.
    pub fn validate(&self, report: &mut ValidationReport) -> Result<(), DictionaryError> {
        let dictionary = self
            .dictionary
            .as_ref()
            .ok_or(DictionaryError::NoDictionary)?;
        dictionary.validate(&self.policy, report)
    }

    /// Full validation that raises a [`ValidationFailure`] on any
    /// violation.
    pub fn validate_strict(&self) -> Result<(), ValidateError> {
        let dictionary = self
            .dictionary
            .as_ref()
            .ok_or(DictionaryError::NoDictionary)?;
        dictionary.validate_strict(&self.policy)
    }

    /// Insert `dictionary`'s defaults for every wholly-absent path,
    /// recursing through resolved sub-dictionaries.
    ///
    /// Existing values are never overwritten, at any depth, which makes
    /// the operation idempotent. Returns the number of paths inserted.
    /// Defaults behind an unloaded `dictionaryFile` are skipped with a
    /// warning until the reference is loaded.
    pub fn merge_defaults(&mut self, dictionary: &Dictionary) -> Result<usize, DictionaryError> {
        let inserted = merge_defaults_into(dictionary, &mut self.policy)?;
        debug!("merged defaults (inserted={inserted})");
        Ok(inserted)
    }

    /// Resolve file references in the owned tree; returns the number
    /// resolved.
    pub fn load_references(
        &mut self,
        resolver: &dyn FragmentResolver,
        root: &Path,
    ) -> Result<usize, PolicyError> {
        self.policy.load_references(resolver, root)
    }
}

/// Find the definition governing a dotted path, descending through
/// resolved sub-dictionaries and falling back to wildcards per level.
fn governing_def(dictionary: &Dictionary, path: &str) -> Result<Definition, ValidateError> {
    let segments = parse_path(path).map_err(DictionaryError::Tree)?;
    lookup_def(dictionary, &segments, path, "")
}

fn lookup_def(
    dictionary: &Dictionary,
    segments: &[&str],
    full_path: &str,
    prefix: &str,
) -> Result<Definition, ValidateError> {
    let Some((name, rest)) = segments.split_first() else {
        return Err(DictionaryError::UndefinedField(full_path.to_string()).into());
    };
    let definitions = dictionary.definitions()?;
    let definition = if *name != WILDCARD_NAME && definitions.exists(name) {
        dictionary.make_def(name)?
    } else if let Some(wildcard) = dictionary.wildcard_def()? {
        wildcard
    } else {
        return Err(single_field_failure(
            "lookup",
            full_path,
            Violations::UNKNOWN_NAME,
        ));
    };

    if rest.is_empty() {
        return Ok(definition);
    }
    let walked = join_path(prefix, name);
    match &definition.sub {
        SubDictionary::Resolved(sub) => lookup_def(sub, rest, full_path, &walked),
        SubDictionary::Pending(_) => {
            Err(DictionaryError::SubdictionaryNotLoaded(walked).into())
        }
        SubDictionary::None => Err(single_field_failure(
            "lookup",
            full_path,
            Violations::UNKNOWN_NAME,
        )),
    }
}

/// Type, range, and enumeration checks for one incoming value.
///
/// File references pass unchecked: they are a deferred state that the full
/// validation pass reports as `NOT_LOADED` until resolved.
fn per_value_mask(definition: &Definition, value: &Value) -> Violations {
    if value.kind() == ValueKind::File {
        return Violations::OK;
    }
    if !definition.declared_type().accepts(value.kind()) {
        return Violations::WRONG_TYPE;
    }
    let mut mask = range_violations(definition, value);
    if !definition.allowed().is_empty() && !definition.allowed().contains(value) {
        mask |= Violations::VALUE_DISALLOWED;
    }
    mask
}

/// Build the single-field failure raised by incremental edits.
fn single_field_failure(operation: &str, path: &str, mask: Violations) -> ValidateError {
    warn!("rejected {operation} at {path}: {mask}");
    let mut report = ValidationReport::new("bound-policy", 0, operation);
    report.record(path, mask);
    ValidationFailure { report }.into()
}

/// Map a tree mutation error into the boundary taxonomy.
fn tree_failure(operation: &str, err: PolicyError) -> ValidateError {
    match err {
        PolicyError::TypeMismatch { path, .. } | PolicyError::MixedArray { path, .. } => {
            single_field_failure(operation, &path, Violations::WRONG_TYPE)
        }
        other => DictionaryError::Tree(other).into(),
    }
}

fn merge_defaults_into(
    dictionary: &Dictionary,
    policy: &mut Policy,
) -> Result<usize, DictionaryError> {
    let mut inserted = 0;
    for name in dictionary.field_names()? {
        let definition = dictionary.make_def(&name)?;
        let absent = !policy.exists(&name);

        if absent {
            if let Some(defaults) = definition.default_values() {
                match defaults {
                    Entry::Scalar(value) => policy.set(&name, value.clone())?,
                    Entry::Array(values) => policy.set_array(&name, values.clone())?,
                }
                inserted += 1;
            }
        }

        if definition.pending_file().is_some() {
            warn!("skipping defaults behind unloaded dictionaryFile ({name})");
            continue;
        }
        let Some(sub) = definition.sub_dictionary() else {
            continue;
        };
        match policy.entry(&name) {
            None => {
                let mut fresh = Policy::new();
                let nested = merge_defaults_into(sub, &mut fresh)?;
                if nested > 0 {
                    policy.set(&name, Value::Policy(fresh))?;
                    inserted += nested;
                }
            }
            Some(Entry::Scalar(Value::Policy(existing))) => {
                let mut merged = existing.clone();
                let nested = merge_defaults_into(sub, &mut merged)?;
                if nested > 0 {
                    policy.set(&name, Value::Policy(merged))?;
                    inserted += nested;
                }
            }
            // Arrays and non-tree values are left alone: defaults never
            // overwrite existing data.
            Some(_) => {}
        }
    }
    Ok(inserted)
}
