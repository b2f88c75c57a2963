//! Dictionaries: schemas for policy trees, and the validation walk.

use crate::definition::{DeclaredType, Definition, SubDictionary};
use crate::error::{DictionaryError, ValidateError, ValidationFailure};
use crate::report::{ValidationReport, Violations};
use log::{debug, warn};
use std::cmp::Ordering;
use std::path::Path;
use warden_rs_policy::{Entry, FragmentResolver, Policy, PolicyError, Value};

/// Reserved top-level section holding the field definitions.
const KEY_DEFINITIONS: &str = "definitions";
const KEY_TYPE: &str = "type";
const KEY_DESCRIPTION: &str = "description";
const KEY_MIN_OCCURS: &str = "minOccurs";
const KEY_MAX_OCCURS: &str = "maxOccurs";
const KEY_MIN: &str = "min";
const KEY_MAX: &str = "max";
const KEY_ALLOWED: &str = "allowed";
const KEY_DEFAULT: &str = "default";
const KEY_DICTIONARY: &str = "dictionary";
const KEY_DICTIONARY_FILE: &str = "dictionaryFile";

/// Reserved definition name applied to instance keys that have no
/// explicit definition of their own.
pub const WILDCARD_NAME: &str = "childDefinition";

/// Properties a definition may carry; anything else is an authoring error.
const DEFINITION_KEYS: &[&str] = &[
    KEY_TYPE,
    KEY_DESCRIPTION,
    KEY_MIN_OCCURS,
    KEY_MAX_OCCURS,
    KEY_MIN,
    KEY_MAX,
    KEY_ALLOWED,
    KEY_DEFAULT,
    KEY_DICTIONARY,
    KEY_DICTIONARY_FILE,
];

/// A schema for policy trees.
///
/// A dictionary is itself backed by a policy tree whose reserved
/// `definitions` section holds one constraint record per field name.
/// Once [`check`](Dictionary::check) passes, a dictionary is logically
/// immutable and may be shared read-only (e.g. behind an `Arc`) across any
/// number of instances.
#[derive(Debug, Clone, PartialEq)]
pub struct Dictionary {
    tree: Policy,
}

impl Dictionary {
    /// Wrap a policy tree that already contains a definitions section.
    ///
    /// Construction never fails; structural defects surface through
    /// [`check`](Dictionary::check), [`make_def`](Dictionary::make_def), or
    /// the validation walk, whichever runs first.
    pub fn from_policy(tree: Policy) -> Self {
        Self { tree }
    }

    /// Build a dictionary from a JSON value (see [`Policy::from_json`]).
    pub fn from_json(value: &serde_json::Value) -> Result<Self, PolicyError> {
        Ok(Self::from_policy(Policy::from_json(value)?))
    }

    /// The backing tree.
    pub fn as_policy(&self) -> &Policy {
        &self.tree
    }

    /// The single definitions section.
    pub(crate) fn definitions(&self) -> Result<&Policy, DictionaryError> {
        match self.tree.entry(KEY_DEFINITIONS) {
            None => Err(DictionaryError::MissingDefinitions),
            Some(Entry::Scalar(Value::Policy(definitions))) => Ok(definitions),
            Some(Entry::Array(values)) => {
                Err(DictionaryError::MultipleDefinitions(values.len()))
            }
            Some(_) => Err(DictionaryError::MalformedDefinition(
                KEY_DEFINITIONS.to_string(),
            )),
        }
    }

    /// Names of the defined fields, excluding the wildcard, in
    /// deterministic order.
    pub fn field_names(&self) -> Result<Vec<String>, DictionaryError> {
        Ok(self
            .definitions()?
            .names()
            .filter(|name| *name != WILDCARD_NAME)
            .map(str::to_string)
            .collect())
    }

    /// Verify the dictionary is internally consistent.
    ///
    /// Cheap and repeatable; the validation walk performs it implicitly
    /// before consulting any definition. An unloaded `dictionaryFile` is
    /// not a defect here; it only blocks validation of its field.
    pub fn check(&self) -> Result<(), DictionaryError> {
        for key in self.tree.names() {
            if key != KEY_DEFINITIONS {
                return Err(DictionaryError::UnknownProperty(key.to_string()));
            }
        }
        let definitions = self.definitions()?;
        for name in definitions.names() {
            let definition = self.make_def(name)?;
            if let Some(sub) = definition.sub_dictionary() {
                sub.check()?;
            }
        }
        Ok(())
    }

    /// The wildcard definition, if one is declared.
    pub(crate) fn wildcard_def(&self) -> Result<Option<Definition>, DictionaryError> {
        if self.definitions()?.exists(WILDCARD_NAME) {
            self.make_def(WILDCARD_NAME).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Build the resolved constraint record for one field.
    ///
    /// Surfaces the same class of authoring error as [`check`] the first
    /// time an offending field is actually inspected.
    pub fn make_def(&self, name: &str) -> Result<Definition, DictionaryError> {
        let definitions = self.definitions()?;
        let entry = definitions
            .entry(name)
            .ok_or_else(|| DictionaryError::UndefinedField(name.to_string()))?;
        let body = match entry {
            Entry::Scalar(Value::Policy(body)) => body,
            Entry::Array(_) if name == WILDCARD_NAME => {
                return Err(DictionaryError::MultipleWildcards);
            }
            _ => return Err(DictionaryError::MalformedDefinition(name.to_string())),
        };
        for key in body.names() {
            if !DEFINITION_KEYS.contains(&key) {
                return Err(DictionaryError::UnknownProperty(format!("{name}.{key}")));
            }
        }

        let has_dictionary_file = body.exists(KEY_DICTIONARY_FILE);
        let declared = match body.entry(KEY_TYPE) {
            None => DeclaredType::Undef,
            Some(Entry::Scalar(Value::Str(token))) => {
                DeclaredType::parse(name, token, has_dictionary_file)?
            }
            Some(entry) => {
                return Err(DictionaryError::TypeNotString {
                    field: name.to_string(),
                    actual: entry.kind(),
                });
            }
        };

        let min_occurs = occurs_bound(body, name, KEY_MIN_OCCURS, 0)?;
        let max_occurs = occurs_bound(body, name, KEY_MAX_OCCURS, 1)?;
        let min = range_bound(body, name, KEY_MIN, declared)?;
        let max = range_bound(body, name, KEY_MAX, declared)?;
        let allowed = allowed_values(body, name, declared)?;
        let sub = sub_dictionary(body, name, declared)?;
        let defaults = body.entry(KEY_DEFAULT).cloned();

        Ok(Definition {
            name: name.to_string(),
            declared,
            min_occurs,
            max_occurs,
            min,
            max,
            allowed,
            sub,
            defaults,
        })
    }

    /// True when `name` currently carries a resolved nested dictionary.
    ///
    /// False for fields without a nested schema and for `dictionaryFile`
    /// references that have not been loaded yet.
    pub fn has_sub_dictionary(&self, name: &str) -> bool {
        match self.make_def(name) {
            Ok(definition) => definition.sub_dictionary().is_some(),
            Err(err) => {
                debug!("has_sub_dictionary({name}) on defective definition: {err}");
                false
            }
        }
    }

    /// Resolve every file reference in the backing tree (notably
    /// `dictionaryFile` declarations); returns the number resolved.
    pub fn load_references(
        &mut self,
        resolver: &dyn FragmentResolver,
        root: &Path,
    ) -> Result<usize, DictionaryError> {
        let loaded = self.tree.load_references(resolver, root)?;
        debug!("dictionary references loaded (count={loaded})");
        Ok(loaded)
    }

    /// Validate `policy` against this dictionary, accumulating every data
    /// violation into `report`.
    ///
    /// Schema defects and unresolved `dictionaryFile` references raise a
    /// [`DictionaryError`] immediately; data violations never raise here,
    /// since the caller decides what a non-empty report means. The walk always
    /// covers every field and never mutates the instance.
    pub fn validate(
        &self,
        policy: &Policy,
        report: &mut ValidationReport,
    ) -> Result<(), DictionaryError> {
        self.check()?;
        self.validate_into(policy, "", report)
    }

    /// Validation sugar that raises on any violation.
    ///
    /// Builds a report, runs the walk, and returns a
    /// [`ValidationFailure`] carrying the report iff its aggregate mask is
    /// non-empty.
    pub fn validate_strict(&self, policy: &Policy) -> Result<(), ValidateError> {
        let mut report = ValidationReport::new("dictionary", 0, "validate_strict");
        self.validate(policy, &mut report)?;
        if report.is_empty() {
            Ok(())
        } else {
            warn!("validation failed: {report}");
            Err(ValidationFailure { report }.into())
        }
    }

    fn validate_into(
        &self,
        policy: &Policy,
        prefix: &str,
        report: &mut ValidationReport,
    ) -> Result<(), DictionaryError> {
        let definitions = self.definitions()?;
        let wildcard = self.wildcard_def()?;

        for name in definitions.names() {
            if name == WILDCARD_NAME {
                continue;
            }
            let definition = self.make_def(name)?;
            validate_field(&definition, policy, name, prefix, report)?;
        }

        for name in policy.names() {
            if name != WILDCARD_NAME && definitions.exists(name) {
                continue;
            }
            match &wildcard {
                Some(definition) => validate_field(definition, policy, name, prefix, report)?,
                None => report.record(join_path(prefix, name), Violations::UNKNOWN_NAME),
            }
        }
        Ok(())
    }
}

/// Validate one named field of `policy` against `definition`.
///
/// `name` is the instance key (it differs from the definition name when a
/// wildcard matched). Errors returned here are schema preconditions; data
/// violations accumulate into the report.
fn validate_field(
    definition: &Definition,
    policy: &Policy,
    name: &str,
    prefix: &str,
    report: &mut ValidationReport,
) -> Result<(), DictionaryError> {
    let path = join_path(prefix, name);
    let entry = policy.entry(name);
    let count = entry.map(Entry::len).unwrap_or(0);
    let mut mask = Violations::OK;

    if count == 0 && definition.min_occurs > 0 {
        mask |= Violations::MISSING_REQUIRED;
    }
    if count > 0
        && definition.is_array_capable()
        && !entry.map(Entry::is_array).unwrap_or(false)
    {
        mask |= Violations::NOT_AN_ARRAY;
    }
    if count > 0 && count < definition.min_occurs {
        mask |= Violations::ARRAY_TOO_SHORT;
    }
    if definition.max_occurs > 0 && count > definition.max_occurs {
        mask |= Violations::TOO_MANY_VALUES;
    }

    for value in entry.map(Entry::values).unwrap_or(&[]) {
        if matches!(value, Value::File(_)) {
            // Unresolved reference: nothing further can be checked on
            // this value until it is loaded.
            mask |= Violations::NOT_LOADED;
            continue;
        }
        if !definition.declared.accepts(value.kind()) {
            mask |= Violations::WRONG_TYPE;
            continue;
        }
        mask |= range_violations(definition, value);
        if !definition.allowed.is_empty() && !definition.allowed.contains(value) {
            mask |= Violations::VALUE_DISALLOWED;
        }
        if let Value::Policy(sub_policy) = value {
            match &definition.sub {
                SubDictionary::Pending(_) => {
                    return Err(DictionaryError::SubdictionaryNotLoaded(path));
                }
                SubDictionary::Resolved(sub_dictionary) => {
                    sub_dictionary.validate_into(sub_policy, &path, report)?;
                }
                SubDictionary::None => {}
            }
        }
    }

    report.record(path, mask);
    Ok(())
}

/// Range-check one correctly-typed value against a definition's bounds.
pub(crate) fn range_violations(definition: &Definition, value: &Value) -> Violations {
    let below = definition
        .min
        .as_ref()
        .is_some_and(|min| value.compare(min) == Some(Ordering::Less));
    let above = definition
        .max
        .as_ref()
        .is_some_and(|max| value.compare(max) == Some(Ordering::Greater));
    if below || above {
        Violations::VALUE_OUT_OF_RANGE
    } else {
        Violations::OK
    }
}

pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn occurs_bound(
    body: &Policy,
    field: &str,
    key: &str,
    default: usize,
) -> Result<usize, DictionaryError> {
    match body.entry(key) {
        None => Ok(default),
        Some(Entry::Scalar(Value::Int(bound))) if *bound >= 0 => Ok(*bound as usize),
        Some(_) => Err(DictionaryError::BadOccurs {
            field: format!("{field}.{key}"),
        }),
    }
}

fn range_bound(
    body: &Policy,
    field: &str,
    key: &str,
    declared: DeclaredType,
) -> Result<Option<Value>, DictionaryError> {
    let Some(entry) = body.entry(key) else {
        return Ok(None);
    };
    match entry {
        Entry::Array(_) => Err(if key == KEY_MIN {
            DictionaryError::MultipleMin(field.to_string())
        } else {
            DictionaryError::MultipleMax(field.to_string())
        }),
        Entry::Scalar(value) => {
            if declared.orderable() && value.kind() == declared.kind() {
                Ok(Some(value.clone()))
            } else if key == KEY_MIN {
                Err(DictionaryError::MinWrongType {
                    field: field.to_string(),
                    expected: declared.kind(),
                    actual: value.kind(),
                })
            } else {
                Err(DictionaryError::MaxWrongType {
                    field: field.to_string(),
                    expected: declared.kind(),
                    actual: value.kind(),
                })
            }
        }
    }
}

fn allowed_values(
    body: &Policy,
    field: &str,
    declared: DeclaredType,
) -> Result<Vec<Value>, DictionaryError> {
    let Some(entry) = body.entry(KEY_ALLOWED) else {
        return Ok(Vec::new());
    };
    for value in entry.values() {
        if !declared.orderable() || value.kind() != declared.kind() {
            return Err(DictionaryError::AllowedWrongType {
                field: field.to_string(),
                expected: declared.kind(),
                actual: value.kind(),
            });
        }
    }
    Ok(entry.values().to_vec())
}

fn sub_dictionary(
    body: &Policy,
    field: &str,
    declared: DeclaredType,
) -> Result<SubDictionary, DictionaryError> {
    let inline = body.entry(KEY_DICTIONARY);
    let file = body.entry(KEY_DICTIONARY_FILE);
    if inline.is_none() && file.is_none() {
        return Ok(SubDictionary::None);
    }
    if inline.is_some() && file.is_some() {
        return Err(DictionaryError::MalformedSubdictionary {
            field: field.to_string(),
            reason: "declares both dictionary and dictionaryFile".to_string(),
        });
    }
    if declared != DeclaredType::Policy {
        return Err(DictionaryError::MalformedSubdictionary {
            field: field.to_string(),
            reason: format!("sub-dictionary requires policy type, found {declared}"),
        });
    }
    if let Some(entry) = inline {
        return match entry {
            Entry::Scalar(Value::Policy(tree)) => Ok(SubDictionary::Resolved(Box::new(
                Dictionary::from_policy(tree.clone()),
            ))),
            other => Err(DictionaryError::MalformedSubdictionary {
                field: field.to_string(),
                reason: format!("dictionary is a {}, expected a policy", other.kind()),
            }),
        };
    }
    // dictionaryFile: unresolved reference until loaded, policy afterwards.
    match file {
        Some(Entry::Scalar(Value::File(reference))) => {
            Ok(SubDictionary::Pending(reference.path().to_path_buf()))
        }
        Some(Entry::Scalar(Value::Policy(tree))) => Ok(SubDictionary::Resolved(Box::new(
            Dictionary::from_policy(tree.clone()),
        ))),
        Some(other) => Err(DictionaryError::MalformedSubdictionary {
            field: field.to_string(),
            reason: format!(
                "dictionaryFile is a {}, expected a file reference",
                other.kind()
            ),
        }),
        None => Ok(SubDictionary::None),
    }
}
