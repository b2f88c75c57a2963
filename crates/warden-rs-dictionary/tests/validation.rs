//! Whole-tree validation: cardinality, types, ranges, enumerations,
//! wildcards, and report accumulation.

use pretty_assertions::assert_eq;
use warden_rs_dictionary::{Dictionary, ValidateError, ValidationReport, Violations};
use warden_rs_policy::Policy;

fn policy(contents: &str) -> Policy {
    let json: serde_json::Value = json5::from_str(contents).expect("json5");
    Policy::from_json(&json).expect("policy")
}

fn dictionary(contents: &str) -> Dictionary {
    Dictionary::from_policy(policy(contents))
}

fn report(label: &str) -> ValidationReport {
    ValidationReport::new("validation.rs", 0, label)
}

fn types_dictionary() -> Dictionary {
    dictionary(
        r#"{
            definitions: {
                undef_type: {},
                bool_type: { type: "bool" },
                int_type: { type: "int" },
                double_type: { type: "double" },
                string_type: { type: "string" },
                policy_type: { type: "policy" },
            }
        }"#,
    )
}

#[test]
fn simple_validate_reports_nothing() {
    let dict = dictionary(
        r#"{
            definitions: {
                name: { type: "string", minOccurs: 1 },
                height: { type: "double", minOccurs: 1 },
            }
        }"#,
    );
    let instance = policy(r#"{ name: "joe", height: 1.75 }"#);
    let mut ve = report("simple");
    dict.validate(&instance, &mut ve).expect("validate");
    assert_eq!(ve.errors_for("name"), Violations::OK);
    assert_eq!(ve.errors_for("height"), Violations::OK);
    assert_eq!(ve.errors(), Violations::OK);
    assert_eq!(ve.field_count(), 0);
}

#[test]
fn every_kind_validates_against_its_own_type() {
    let dict = types_dictionary();
    let instance = policy(
        r#"{
            undef_type: "anything",
            bool_type: true,
            int_type: 7,
            double_type: 7.5,
            string_type: "seven",
            policy_type: { inner: 1 },
        }"#,
    );
    let mut ve = report("types");
    dict.validate(&instance, &mut ve).expect("validate");
    assert_eq!(ve.errors(), Violations::OK);
}

#[test]
fn unresolved_file_reference_reports_not_loaded_only() {
    let dict = types_dictionary();
    let instance = policy(
        r#"{
            bool_type: true,
            policy_type: { "$file": "fragment.json5" },
        }"#,
    );
    let mut ve = report("not-loaded");
    dict.validate(&instance, &mut ve).expect("validate");
    assert_eq!(ve.errors_for("policy_type"), Violations::NOT_LOADED);
    assert_eq!(ve.errors_for("bool_type"), Violations::OK);
    assert_eq!(ve.errors(), Violations::NOT_LOADED);
    assert_eq!(ve.field_count(), 1);
}

#[test]
fn kind_mismatches_report_wrong_type_per_field() {
    let dict = types_dictionary();
    // Everything shifted one kind over; ints never pass as doubles.
    let instance = policy(
        r#"{
            bool_type: 1,
            int_type: 1.5,
            double_type: 2,
            string_type: true,
            policy_type: "tree",
        }"#,
    );
    let mut ve = report("wrong-type");
    dict.validate(&instance, &mut ve).expect("validate");
    assert_eq!(ve.errors(), Violations::WRONG_TYPE);
    assert_eq!(ve.field_count(), 5);
    assert_eq!(ve.errors_for("double_type"), Violations::WRONG_TYPE);
}

#[test]
fn wrong_type_suppresses_range_and_enumeration() {
    let dict = dictionary(
        r#"{
            definitions: {
                level: { type: "int", min: 0, max: 10, allowed: [1, 2, 3] },
            }
        }"#,
    );
    let instance = policy(r#"{ level: "loud" }"#);
    let mut ve = report("suppress");
    dict.validate(&instance, &mut ve).expect("validate");
    // Never WRONG_TYPE and VALUE_OUT_OF_RANGE on the same scalar.
    assert_eq!(ve.errors_for("level"), Violations::WRONG_TYPE);
}

#[test]
fn cardinality_checks_fire_independently() {
    let dict = dictionary(
        r#"{
            definitions: {
                count: { type: "int", minOccurs: 2, maxOccurs: 3 },
            }
        }"#,
    );

    // One value, array-stored: short of the minimum.
    let mut ve = report("short");
    dict.validate(&policy("{ count: [1] }"), &mut ve).expect("validate");
    assert_eq!(ve.errors_for("count"), Violations::ARRAY_TOO_SHORT);

    // Four values: over the maximum.
    let mut ve = report("long");
    dict.validate(&policy("{ count: [1, 2, 3, 4] }"), &mut ve)
        .expect("validate");
    assert_eq!(ve.errors_for("count"), Violations::TOO_MANY_VALUES);

    // Absent entirely: required.
    let mut ve = report("missing");
    dict.validate(&policy("{}"), &mut ve).expect("validate");
    assert_eq!(ve.errors_for("count"), Violations::MISSING_REQUIRED);

    // Scalar storage on an array-capable definition, also short: both
    // bits accumulate on the one field.
    let mut ve = report("scalar");
    dict.validate(&policy("{ count: 1 }"), &mut ve).expect("validate");
    assert_eq!(
        ve.errors_for("count"),
        Violations::NOT_AN_ARRAY | Violations::ARRAY_TOO_SHORT
    );
}

#[test]
fn optional_fields_report_nothing_when_absent() {
    let dict = dictionary(
        r#"{ definitions: { maybe: { type: "int", minOccurs: 0, maxOccurs: 3 } } }"#,
    );
    let mut ve = report("optional");
    dict.validate(&policy("{}"), &mut ve).expect("validate");
    assert_eq!(ve.errors(), Violations::OK);
}

#[test]
fn unbounded_max_occurs_accepts_any_count() {
    let dict = dictionary(
        r#"{ definitions: { xs: { type: "int", minOccurs: 1, maxOccurs: 0 } } }"#,
    );
    let mut ve = report("unbounded");
    dict.validate(&policy("{ xs: [1, 2, 3, 4, 5, 6, 7, 8] }"), &mut ve)
        .expect("validate");
    assert_eq!(ve.errors(), Violations::OK);
}

#[test]
fn range_checks_use_natural_ordering_per_kind() {
    let dict = dictionary(
        r#"{
            definitions: {
                ratio: { type: "double", min: 0.0, max: 1.0 },
                word: { type: "string", min: "aa", max: "mm" },
            }
        }"#,
    );

    let mut ve = report("in-range");
    dict.validate(&policy(r#"{ ratio: 0.5, word: "abc" }"#), &mut ve)
        .expect("validate");
    assert_eq!(ve.errors(), Violations::OK);

    let mut ve = report("out-of-range");
    dict.validate(&policy(r#"{ ratio: 1.5, word: "zebra" }"#), &mut ve)
        .expect("validate");
    assert_eq!(ve.errors_for("ratio"), Violations::VALUE_OUT_OF_RANGE);
    assert_eq!(ve.errors_for("word"), Violations::VALUE_OUT_OF_RANGE);
    assert_eq!(ve.field_count(), 2);
}

#[test]
fn enumeration_and_range_violations_accumulate() {
    let dict = dictionary(
        r#"{
            definitions: {
                slot: { type: "int", min: 0, max: 10, allowed: [1, 2, 3] },
            }
        }"#,
    );
    // Out of range and not in the enumeration: both bits OR together.
    let mut ve = report("both");
    dict.validate(&policy("{ slot: 20 }"), &mut ve).expect("validate");
    assert_eq!(
        ve.errors_for("slot"),
        Violations::VALUE_DISALLOWED | Violations::VALUE_OUT_OF_RANGE
    );

    // In range but disallowed: only the enumeration bit.
    let mut ve = report("disallowed");
    dict.validate(&policy("{ slot: 7 }"), &mut ve).expect("validate");
    assert_eq!(ve.errors_for("slot"), Violations::VALUE_DISALLOWED);
}

#[test]
fn per_value_checks_cover_each_array_element() {
    let dict = dictionary(
        r#"{
            definitions: {
                xs: { type: "int", maxOccurs: 0, min: 0, max: 10 },
            }
        }"#,
    );
    let mut ve = report("elements");
    dict.validate(&policy("{ xs: [1, 50, 3] }"), &mut ve)
        .expect("validate");
    assert_eq!(ve.errors_for("xs"), Violations::VALUE_OUT_OF_RANGE);
}

#[test]
fn unknown_names_without_wildcard() {
    let dict = dictionary(r#"{ definitions: { known: { type: "int" } } }"#);
    let mut ve = report("unknown");
    dict.validate(&policy(r#"{ known: 1, mystery: "x" }"#), &mut ve)
        .expect("validate");
    assert_eq!(ve.errors_for("mystery"), Violations::UNKNOWN_NAME);
    assert_eq!(ve.errors_for("known"), Violations::OK);
    assert_eq!(ve.field_count(), 1);
}

#[test]
fn wildcard_governs_undeclared_names() {
    let dict = dictionary(
        r#"{
            definitions: {
                known: { type: "string" },
                childDefinition: { type: "int", min: 0 },
            }
        }"#,
    );
    let instance = policy(r#"{ known: "k", joe: 1, deb: "not an int", low: -4 }"#);
    let mut ve = report("wildcard");
    dict.validate(&instance, &mut ve).expect("validate");
    assert_eq!(ve.errors_for("joe"), Violations::OK);
    assert_eq!(ve.errors_for("deb"), Violations::WRONG_TYPE);
    assert_eq!(ve.errors_for("low"), Violations::VALUE_OUT_OF_RANGE);
    assert_eq!(ve.field_count(), 2);
}

#[test]
fn validation_is_deterministic_and_does_not_mutate() {
    let dict = dictionary(
        r#"{
            definitions: {
                a: { type: "int", minOccurs: 1 },
                b: { type: "string", allowed: ["x"] },
            }
        }"#,
    );
    let instance = policy(r#"{ b: "y", extra: 1 }"#);
    let before = instance.clone();

    let mut first = report("first");
    dict.validate(&instance, &mut first).expect("validate");
    let mut second = report("second");
    dict.validate(&instance, &mut second).expect("validate");

    assert_eq!(instance, before);
    assert_eq!(first.errors(), second.errors());
    assert_eq!(first.field_count(), second.field_count());
    let paths: Vec<&str> = first.paths().collect();
    assert_eq!(paths, second.paths().collect::<Vec<&str>>());
    for path in paths {
        assert_eq!(first.errors_for(path), second.errors_for(path));
    }
}

#[test]
fn strict_overload_raises_iff_report_is_non_empty() {
    let dict = dictionary(r#"{ definitions: { a: { type: "int", minOccurs: 1 } } }"#);

    dict.validate_strict(&policy("{ a: 1 }")).expect("valid");

    let err = dict.validate_strict(&policy("{}")).unwrap_err();
    match err {
        ValidateError::Validation(failure) => {
            assert_eq!(failure.report.errors_for("a"), Violations::MISSING_REQUIRED);
            assert_eq!(failure.report.field_count(), 1);
        }
        other => panic!("expected a validation failure, got {other}"),
    }
}

#[test]
fn schema_defects_raise_instead_of_reporting() {
    let dict = dictionary(r#"{ definitions: { a: { type: "NotAType" } } }"#);
    let err = dict.validate_strict(&policy("{ a: 1 }")).unwrap_err();
    assert!(matches!(err, ValidateError::Schema(_)), "{err}");
}
