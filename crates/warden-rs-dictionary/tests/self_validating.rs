//! Incremental checking on dictionary-bound policies.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use warden_rs_dictionary::{
    BoundPolicy, Dictionary, DictionaryError, ValidateError, ValidationReport, Violations,
};
use warden_rs_policy::Policy;

fn policy(contents: &str) -> Policy {
    let json: serde_json::Value = json5::from_str(contents).expect("json5");
    Policy::from_json(&json).expect("policy")
}

fn dictionary(contents: &str) -> Arc<Dictionary> {
    Arc::new(Dictionary::from_policy(policy(contents)))
}

/// Unwrap the single-field report carried by a rejected edit.
fn rejected(err: ValidateError) -> ValidationReport {
    match err {
        ValidateError::Validation(failure) => failure.report,
        other => panic!("expected a validation failure, got {other}"),
    }
}

fn types_dictionary() -> Arc<Dictionary> {
    dictionary(
        r#"{
            definitions: {
                bool_type: { type: "bool" },
                int_type: { type: "int" },
            }
        }"#,
    )
}

#[test]
fn binding_enables_validation_without_running_it() {
    let mut bound = BoundPolicy::new(policy(r#"{ bool_type: "broken" }"#));
    assert!(!bound.can_validate());

    // Binding never validates, even over already-invalid data.
    bound.bind_dictionary(types_dictionary());
    assert!(bound.can_validate());

    let mut ve = ValidationReport::new("self_validating.rs", 0, "post-bind");
    bound.validate(&mut ve).expect("validate");
    assert_eq!(ve.errors_for("bool_type"), Violations::WRONG_TYPE);
    assert_eq!(ve.field_count(), 1);
}

#[test]
fn validate_without_binding_is_an_error() {
    let bound = BoundPolicy::new(Policy::new());
    let mut ve = ValidationReport::new("self_validating.rs", 0, "unbound");
    assert!(matches!(
        bound.validate(&mut ve),
        Err(DictionaryError::NoDictionary)
    ));
}

#[test]
fn set_rejects_wrong_types_atomically() {
    let mut bound = BoundPolicy::new(Policy::new());
    bound.bind_dictionary(types_dictionary());

    bound.set("bool_type", true).expect("set");
    let report = rejected(bound.set("bool_type", "a string").unwrap_err());
    assert_eq!(report.errors_for("bool_type"), Violations::WRONG_TYPE);
    assert_eq!(report.field_count(), 1);
    // The prior value is untouched.
    assert!(bound.policy().bool_value("bool_type").expect("bool"));
}

#[test]
fn set_and_add_check_range_and_enumeration() {
    let dict = dictionary(
        r#"{
            definitions: {
                int_range: { type: "int", min: -8, max: 8, minOccurs: 2, maxOccurs: 4 },
                bool_set: { type: "bool", allowed: [true] },
            }
        }"#,
    );
    let mut bound = BoundPolicy::new(Policy::new());
    bound.bind_dictionary(dict);

    bound.set("bool_set", true).expect("set");
    let report = rejected(bound.set("bool_set", false).unwrap_err());
    assert_eq!(report.errors_for("bool_set"), Violations::VALUE_DISALLOWED);
    assert!(bound.policy().bool_value("bool_set").expect("bool"));

    bound.set("int_range", -7i64).expect("set");
    let report = rejected(bound.add("int_range", 10i64).unwrap_err());
    assert_eq!(report.errors_for("int_range"), Violations::VALUE_OUT_OF_RANGE);
    assert_eq!(bound.policy().value_count("int_range"), 1);
}

#[test]
fn add_enforces_max_occurs_but_set_never_checks_min_occurs() {
    let dict = dictionary(
        r#"{
            definitions: {
                int_range: { type: "int", min: -8, max: 8, minOccurs: 2, maxOccurs: 2 },
                required: { type: "string", minOccurs: 1 },
            }
        }"#,
    );
    let mut bound = BoundPolicy::new(Policy::new());
    bound.bind_dictionary(dict);

    // Intermediate states short of minOccurs are legitimate while
    // building the value up.
    bound.set("int_range", -7i64).expect("set");

    // The deferred whole-tree pass still sees them.
    let err = bound.validate_strict().unwrap_err();
    let report = rejected(err);
    assert_eq!(
        report.errors_for("int_range"),
        Violations::NOT_AN_ARRAY | Violations::ARRAY_TOO_SHORT
    );
    assert_eq!(report.errors_for("required"), Violations::MISSING_REQUIRED);

    bound.add("int_range", -8i64).expect("add");
    bound.set("required", "present").expect("set");
    bound.validate_strict().expect("now valid");

    // A third value would exceed maxOccurs.
    let report = rejected(bound.add("int_range", 0i64).unwrap_err());
    assert_eq!(report.errors_for("int_range"), Violations::TOO_MANY_VALUES);
    assert_eq!(bound.policy().value_count("int_range"), 2);
}

#[test]
fn unknown_names_are_rejected_at_the_point_of_mutation() {
    let mut bound = BoundPolicy::new(Policy::new());
    bound.bind_dictionary(types_dictionary());

    let report = rejected(bound.set("mystery", 1i64).unwrap_err());
    assert_eq!(report.errors_for("mystery"), Violations::UNKNOWN_NAME);
    assert!(!bound.policy().exists("mystery"));
}

#[test]
fn wildcards_govern_edits_to_undeclared_names() {
    let dict = dictionary(
        r#"{
            definitions: {
                childDefinition: { type: "int", min: 0 },
            }
        }"#,
    );
    let mut bound = BoundPolicy::new(Policy::new());
    bound.bind_dictionary(dict);

    bound.set("anything", 3i64).expect("set");
    let report = rejected(bound.set("anything", -3i64).unwrap_err());
    assert_eq!(report.errors_for("anything"), Violations::VALUE_OUT_OF_RANGE);
}

#[test]
fn dotted_edits_descend_through_sub_dictionaries() {
    let dict = dictionary(
        r#"{
            definitions: {
                server: {
                    type: "policy",
                    dictionary: {
                        definitions: {
                            port: { type: "int", min: 1, max: 65535 },
                        },
                    },
                },
            }
        }"#,
    );
    let mut bound = BoundPolicy::new(Policy::new());
    bound.bind_dictionary(dict);

    bound.set("server.port", 8080i64).expect("set");
    assert_eq!(bound.policy().int_value("server.port").expect("int"), 8080);

    let report = rejected(bound.set("server.port", 0i64).unwrap_err());
    assert_eq!(
        report.errors_for("server.port"),
        Violations::VALUE_OUT_OF_RANGE
    );
    assert_eq!(bound.policy().int_value("server.port").expect("int"), 8080);

    let report = rejected(bound.set("server.unknown", 1i64).unwrap_err());
    assert_eq!(report.errors_for("server.unknown"), Violations::UNKNOWN_NAME);
}

#[test]
fn rebinding_switches_the_governing_dictionary() {
    let types = types_dictionary();
    let values = dictionary(
        r#"{
            definitions: {
                string_range: { type: "string", min: "m", max: "n" },
            }
        }"#,
    );

    let mut bound = BoundPolicy::new(Policy::new());
    bound.bind_dictionary(Arc::clone(&types));
    bound.set("bool_type", true).expect("set");
    bound.set("int_type", 1i64).expect("set");
    bound.validate_strict().expect("valid under types");

    // Rebinding does not re-validate existing data...
    bound.rebind_dictionary(Arc::clone(&values));
    // ...but the next full pass reports it against the new dictionary.
    let report = rejected(bound.validate_strict().unwrap_err());
    assert_eq!(report.errors_for("bool_type"), Violations::UNKNOWN_NAME);
    assert_eq!(report.errors_for("int_type"), Violations::UNKNOWN_NAME);

    bound.set("string_range", "moo").expect("set");
    let report = rejected(bound.set("string_range", "victor").unwrap_err());
    assert_eq!(
        report.errors_for("string_range"),
        Violations::VALUE_OUT_OF_RANGE
    );

    // Removal is unconditional; back under the first dictionary the tree
    // is clean again.
    bound.rebind_dictionary(types);
    bound.remove("string_range");
    bound.validate_strict().expect("valid again");
}

#[test]
fn unbound_policies_accept_any_edit() {
    let mut bound = BoundPolicy::new(Policy::new());
    bound.set("free", "form").expect("set");
    bound.add("free", "values").expect("add");
    assert_eq!(bound.policy().value_count("free"), 2);
}
