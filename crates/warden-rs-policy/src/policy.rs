//! The hierarchical, dot-addressed policy tree.

use crate::error::PolicyError;
use crate::resolver::FragmentResolver;
use crate::value::{FileReference, Value, ValueKind};
use log::debug;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Reserved JSON key marking a file-reference leaf.
const FILE_KEY: &str = "$file";

/// Scalar or array storage for a single named field.
///
/// The distinction is observable: a schema may require array storage even
/// for a single value. Array elements always share one [`ValueKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A single value.
    Scalar(Value),
    /// An ordered array of values of one kind.
    Array(Vec<Value>),
}

impl Entry {
    /// Number of values stored.
    pub fn len(&self) -> usize {
        match self {
            Entry::Scalar(_) => 1,
            Entry::Array(values) => values.len(),
        }
    }

    /// True when no values are stored (only possible for arrays).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the field is stored as an array.
    pub fn is_array(&self) -> bool {
        matches!(self, Entry::Array(_))
    }

    /// The stored values, a scalar presented as a one-element slice.
    pub fn values(&self) -> &[Value] {
        match self {
            Entry::Scalar(value) => std::slice::from_ref(value),
            Entry::Array(values) => values,
        }
    }

    /// Kind shared by the stored values; `Undef` for an empty array.
    pub fn kind(&self) -> ValueKind {
        self.values()
            .first()
            .map(Value::kind)
            .unwrap_or(ValueKind::Undef)
    }
}

/// A hierarchical configuration tree keyed by dot-separated names.
///
/// Each leaf holds a scalar or an array of values of one kind; nested
/// trees are addressed with dotted paths (`server.limits.max_conns`).
/// Iteration order over names is deterministic (lexicographic).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Policy {
    entries: BTreeMap<String, Entry>,
}

impl Policy {
    /// Create an empty policy tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the tree holds no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-level field names, in deterministic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of top-level fields.
    pub fn name_count(&self) -> usize {
        self.entries.len()
    }

    /// The entry at a dotted path, if present.
    pub fn entry(&self, path: &str) -> Option<&Entry> {
        let segments = segments(path).ok()?;
        let (last, parents) = segments.split_last()?;
        let mut current = self;
        for segment in parents {
            match current.entries.get(*segment)? {
                Entry::Scalar(Value::Policy(sub)) => current = sub,
                _ => return None,
            }
        }
        current.entries.get(*last)
    }

    /// The values at a dotted path; empty when absent.
    pub fn values(&self, path: &str) -> &[Value] {
        self.entry(path).map(Entry::values).unwrap_or(&[])
    }

    /// Number of values stored at a dotted path (0 when absent).
    pub fn value_count(&self, path: &str) -> usize {
        self.entry(path).map(Entry::len).unwrap_or(0)
    }

    /// True when any entry exists at the dotted path.
    pub fn exists(&self, path: &str) -> bool {
        self.entry(path).is_some()
    }

    /// The most recently added value at a path.
    fn last_value(&self, path: &str) -> Result<&Value, PolicyError> {
        self.entry(path)
            .and_then(|entry| entry.values().last())
            .ok_or_else(|| PolicyError::NotFound(path.to_string()))
    }

    /// Boolean value at a path (the most recently added one for arrays).
    pub fn bool_value(&self, path: &str) -> Result<bool, PolicyError> {
        match self.last_value(path)? {
            Value::Bool(value) => Ok(*value),
            other => Err(mismatch(path, ValueKind::Bool, other)),
        }
    }

    /// Integer value at a path.
    pub fn int_value(&self, path: &str) -> Result<i64, PolicyError> {
        match self.last_value(path)? {
            Value::Int(value) => Ok(*value),
            other => Err(mismatch(path, ValueKind::Int, other)),
        }
    }

    /// Floating-point value at a path.
    pub fn double_value(&self, path: &str) -> Result<f64, PolicyError> {
        match self.last_value(path)? {
            Value::Double(value) => Ok(*value),
            other => Err(mismatch(path, ValueKind::Double, other)),
        }
    }

    /// String value at a path.
    pub fn string_value(&self, path: &str) -> Result<&str, PolicyError> {
        match self.last_value(path)? {
            Value::Str(value) => Ok(value),
            other => Err(mismatch(path, ValueKind::String, other)),
        }
    }

    /// Nested sub-tree at a path.
    pub fn policy_value(&self, path: &str) -> Result<&Policy, PolicyError> {
        match self.last_value(path)? {
            Value::Policy(value) => Ok(value),
            other => Err(mismatch(path, ValueKind::Policy, other)),
        }
    }

    /// Replace whatever is stored at `path` with a single scalar value.
    ///
    /// Intermediate sub-trees are created as needed; an intermediate
    /// segment already holding a non-tree value is a `TypeMismatch`.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), PolicyError> {
        let value = value.into();
        let (holder, last) = self.holder_mut(path)?;
        holder.entries.insert(last.to_string(), Entry::Scalar(value));
        Ok(())
    }

    /// Replace whatever is stored at `path` with array storage.
    pub fn set_array(
        &mut self,
        path: &str,
        values: Vec<Value>,
    ) -> Result<(), PolicyError> {
        if let Some(conflict) = mixed_kind(&values) {
            return Err(PolicyError::MixedArray {
                path: path.to_string(),
                existing: values[0].kind(),
                appended: conflict,
            });
        }
        let (holder, last) = self.holder_mut(path)?;
        holder.entries.insert(last.to_string(), Entry::Array(values));
        Ok(())
    }

    /// Append a value at `path`.
    ///
    /// An absent field becomes a scalar; a scalar promotes to a two-element
    /// array. Appending a value of a different kind than the stored ones is
    /// a `MixedArray` error and leaves the tree unchanged.
    pub fn add(&mut self, path: &str, value: impl Into<Value>) -> Result<(), PolicyError> {
        let value = value.into();
        let (holder, last) = self.holder_mut(path)?;
        match holder.entries.get_mut(last) {
            None => {
                holder.entries.insert(last.to_string(), Entry::Scalar(value));
            }
            Some(entry) => {
                if !entry.is_empty() && entry.kind() != value.kind() {
                    return Err(PolicyError::MixedArray {
                        path: path.to_string(),
                        existing: entry.kind(),
                        appended: value.kind(),
                    });
                }
                match entry {
                    Entry::Scalar(existing) => {
                        let first = existing.clone();
                        *entry = Entry::Array(vec![first, value]);
                    }
                    Entry::Array(values) => values.push(value),
                }
            }
        }
        Ok(())
    }

    /// Remove the entry at `path`; removing a missing path is a no-op.
    pub fn remove(&mut self, path: &str) {
        let Ok(segments) = segments(path) else {
            return;
        };
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut current = self;
        for segment in parents {
            match current.entries.get_mut(*segment) {
                Some(Entry::Scalar(Value::Policy(sub))) => current = sub,
                _ => return,
            }
        }
        current.entries.remove(*last);
    }

    /// Descend to the tree that holds the final path segment, creating
    /// intermediate sub-trees as needed.
    fn holder_mut<'a, 'p>(
        &'a mut self,
        path: &'p str,
    ) -> Result<(&'a mut Policy, &'p str), PolicyError> {
        let segments = segments(path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(PolicyError::InvalidPath(path.to_string()));
        };
        let mut current = self;
        let mut walked = String::new();
        for segment in parents {
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);
            let entry = current
                .entries
                .entry((*segment).to_string())
                .or_insert_with(|| Entry::Scalar(Value::Policy(Policy::new())));
            let kind = entry.kind();
            match entry {
                Entry::Scalar(Value::Policy(sub)) => current = sub,
                _ => {
                    return Err(PolicyError::TypeMismatch {
                        path: walked,
                        expected: ValueKind::Policy,
                        actual: kind,
                    });
                }
            }
        }
        Ok((current, last))
    }

    /// Build a policy tree from a JSON value.
    ///
    /// The top level must be an object. Integers map to `Int`, other
    /// numbers to `Double`; an object of the single key `"$file"` maps to
    /// an unresolved file reference; `null` and nested arrays are
    /// unsupported.
    pub fn from_json(value: &serde_json::Value) -> Result<Policy, PolicyError> {
        match value {
            serde_json::Value::Object(map) => policy_from_map(map, ""),
            _ => Err(PolicyError::Unsupported {
                path: String::new(),
                reason: "top level must be an object".to_string(),
            }),
        }
    }

    /// Render the tree back to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, entry) in &self.entries {
            let json = match entry {
                Entry::Scalar(value) => value_to_json(value),
                Entry::Array(values) => {
                    serde_json::Value::Array(values.iter().map(value_to_json).collect())
                }
            };
            map.insert(name.clone(), json);
        }
        serde_json::Value::Object(map)
    }

    /// Resolve every file-reference value in the tree, depth first.
    ///
    /// Each reference is loaded through `resolver` relative to `root` and
    /// replaced in place with the loaded sub-tree; references inside loaded
    /// fragments are resolved as well. Returns the number of fragments
    /// resolved. Reference cycles fail with `CircularReference`.
    pub fn load_references(
        &mut self,
        resolver: &dyn FragmentResolver,
        root: &Path,
    ) -> Result<usize, PolicyError> {
        let mut in_flight = Vec::new();
        self.load_references_inner(resolver, root, &mut in_flight)
    }

    fn load_references_inner(
        &mut self,
        resolver: &dyn FragmentResolver,
        root: &Path,
        in_flight: &mut Vec<PathBuf>,
    ) -> Result<usize, PolicyError> {
        let mut loaded = 0;
        for entry in self.entries.values_mut() {
            match entry {
                Entry::Scalar(value) => {
                    loaded += load_value(value, resolver, root, in_flight)?;
                }
                Entry::Array(values) => {
                    for value in values {
                        loaded += load_value(value, resolver, root, in_flight)?;
                    }
                }
            }
        }
        Ok(loaded)
    }
}

impl Serialize for Policy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Policy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Policy::from_json(&value).map_err(D::Error::custom)
    }
}

/// Split a dotted path into non-empty segments.
pub fn parse_path(path: &str) -> Result<Vec<&str>, PolicyError> {
    segments(path)
}

fn segments(path: &str) -> Result<Vec<&str>, PolicyError> {
    if path.is_empty() {
        return Err(PolicyError::InvalidPath(path.to_string()));
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(PolicyError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn mismatch(path: &str, expected: ValueKind, actual: &Value) -> PolicyError {
    PolicyError::TypeMismatch {
        path: path.to_string(),
        expected,
        actual: actual.kind(),
    }
}

/// First kind that conflicts with the leading element, if any.
fn mixed_kind(values: &[Value]) -> Option<ValueKind> {
    let first = values.first()?.kind();
    values
        .iter()
        .map(Value::kind)
        .find(|kind| *kind != first)
}

fn resolve_one(
    reference: &FileReference,
    resolver: &dyn FragmentResolver,
    root: &Path,
    in_flight: &mut Vec<PathBuf>,
) -> Result<(Policy, usize), PolicyError> {
    let joined = if reference.path().is_absolute() {
        reference.path().to_path_buf()
    } else {
        root.join(reference.path())
    };
    let identity = joined.canonicalize().unwrap_or(joined);
    if in_flight.contains(&identity) {
        return Err(PolicyError::CircularReference(
            identity.display().to_string(),
        ));
    }
    debug!("resolving policy fragment (path={})", identity.display());
    let mut fragment = resolver.resolve(root, reference.path())?;
    in_flight.push(identity);
    let nested = fragment.load_references_inner(resolver, root, in_flight)?;
    in_flight.pop();
    Ok((fragment, 1 + nested))
}

fn load_value(
    value: &mut Value,
    resolver: &dyn FragmentResolver,
    root: &Path,
    in_flight: &mut Vec<PathBuf>,
) -> Result<usize, PolicyError> {
    match value {
        Value::Policy(sub) => sub.load_references_inner(resolver, root, in_flight),
        Value::File(reference) => {
            let (fragment, loaded) = resolve_one(reference, resolver, root, in_flight)?;
            *value = Value::Policy(fragment);
            Ok(loaded)
        }
        _ => Ok(0),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn policy_from_map(
    map: &serde_json::Map<String, serde_json::Value>,
    prefix: &str,
) -> Result<Policy, PolicyError> {
    let mut policy = Policy::new();
    for (key, json) in map {
        let path = join_path(prefix, key);
        if key.is_empty() || key.contains('.') {
            return Err(PolicyError::InvalidPath(path));
        }
        let entry = match json {
            serde_json::Value::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for (index, element) in elements.iter().enumerate() {
                    values.push(value_from_json(element, &format!("{path}[{index}]"))?);
                }
                if let Some(conflict) = mixed_kind(&values) {
                    return Err(PolicyError::MixedArray {
                        path,
                        existing: values[0].kind(),
                        appended: conflict,
                    });
                }
                Entry::Array(values)
            }
            other => Entry::Scalar(value_from_json(other, &path)?),
        };
        policy.entries.insert(key.clone(), entry);
    }
    Ok(policy)
}

fn value_from_json(json: &serde_json::Value, path: &str) -> Result<Value, PolicyError> {
    match json {
        serde_json::Value::Bool(value) => Ok(Value::Bool(*value)),
        serde_json::Value::Number(number) => {
            if let Some(value) = number.as_i64() {
                Ok(Value::Int(value))
            } else if let Some(value) = number.as_f64() {
                Ok(Value::Double(value))
            } else {
                Err(PolicyError::Unsupported {
                    path: path.to_string(),
                    reason: format!("number {number} out of range"),
                })
            }
        }
        serde_json::Value::String(value) => Ok(Value::Str(value.clone())),
        serde_json::Value::Object(map) => {
            if map.len() == 1 {
                if let Some(serde_json::Value::String(file)) = map.get(FILE_KEY) {
                    return Ok(Value::File(FileReference::new(file)));
                }
            }
            Ok(Value::Policy(policy_from_map(map, path)?))
        }
        serde_json::Value::Array(_) => Err(PolicyError::Unsupported {
            path: path.to_string(),
            reason: "nested arrays are not representable".to_string(),
        }),
        serde_json::Value::Null => Err(PolicyError::Unsupported {
            path: path.to_string(),
            reason: "null is not representable".to_string(),
        }),
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(inner) => serde_json::Value::Bool(*inner),
        Value::Int(inner) => serde_json::Value::Number((*inner).into()),
        Value::Double(inner) => serde_json::Number::from_f64(*inner)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(inner) => serde_json::Value::String(inner.clone()),
        Value::Policy(inner) => inner.to_json(),
        Value::File(reference) => {
            let mut map = serde_json::Map::new();
            map.insert(
                FILE_KEY.to_string(),
                serde_json::Value::String(reference.path().display().to_string()),
            );
            serde_json::Value::Object(map)
        }
    }
}
