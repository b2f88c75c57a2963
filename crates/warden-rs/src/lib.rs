//! Public surface for warden.
//!
//! This crate re-exports the policy tree and dictionary building blocks
//! and provides a small initialization helper to keep consumer setup
//! consistent.

/// Re-export for convenience.
pub use warden_rs_dictionary as dictionary;
/// Re-export for convenience.
pub use warden_rs_policy as policy;

pub use warden_rs_dictionary::{
    BoundPolicy, DeclaredType, Definition, Dictionary, DictionaryError, ValidateError,
    ValidationFailure, ValidationReport, Violations,
};
pub use warden_rs_policy::{
    Entry, FileReference, FragmentResolver, FsResolver, Policy, PolicyError, Value, ValueKind,
};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled. Binaries are still
/// expected to call this early in startup to ensure log output is wired up.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Smallest end-to-end scenario through the facade.
    #[test]
    fn facade_round_trip() {
        let dictionary = Dictionary::from_json(&serde_json::json!({
            "definitions": {
                "height": { "type": "double", "minOccurs": 1 },
                "name": { "type": "string", "minOccurs": 1 },
            }
        }))
        .expect("dictionary");
        dictionary.check().expect("check");

        let mut policy = Policy::new();
        policy.set("height", 1.80).expect("set");
        policy.set("name", "joe").expect("set");

        let mut report = ValidationReport::new("lib.rs", 0, "facade_round_trip");
        dictionary.validate(&policy, &mut report).expect("validate");
        assert_eq!(report.errors(), Violations::OK);
        assert_eq!(report.field_count(), 0);
    }
}
