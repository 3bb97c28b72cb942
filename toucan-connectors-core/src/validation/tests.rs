//! Tests for field validation and violation reporting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::schema::{DefaultValue, FieldSpec, Widget};
use crate::security::Secret;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct Sample {
    host: String,
    port: Option<i64>,
    password: Option<Secret>,
    charset: String,
    load: bool,
    query: Option<String>,
    table: Option<String>,
}

const SAMPLE_FIELDS: &[FieldSpec] = &[
    FieldSpec::string("host")
        .required()
        .constraints(&[Constraint::MinLength(1)]),
    FieldSpec::integer("port").constraints(&[Constraint::Minimum(1), Constraint::Maximum(65535)]),
    FieldSpec::secret("password").constraints(&[Constraint::MaxLength(8)]),
    FieldSpec::string("charset").default(DefaultValue::Str("utf8mb4")),
    FieldSpec::boolean("load").default(DefaultValue::Bool(true)),
    FieldSpec::string("query")
        .widget(Widget::Sql)
        .constraints(&[Constraint::MinLength(1)]),
    FieldSpec::string("table"),
    FieldSpec::string("type").constraints(&[Constraint::OneOf(&["MySQL"])]),
];

impl Model for Sample {
    const TITLE: &'static str = "Sample";

    fn fields() -> &'static [FieldSpec] {
        SAMPLE_FIELDS
    }

    fn rules() -> &'static [ModelRule] {
        &[ModelRule::AtLeastOneOf(&["query", "table"])]
    }
}

#[test]
fn test_valid_input_applies_defaults() {
    let sample = Sample::validate(&json!({"host": "db", "query": "SELECT 1"})).unwrap();

    assert_eq!(sample.host, "db");
    assert_eq!(sample.port, None);
    assert!(sample.password.is_none());
    assert_eq!(sample.charset, "utf8mb4");
    assert!(sample.load);
    assert_eq!(sample.query.as_deref(), Some("SELECT 1"));
    assert!(sample.table.is_none());
}

#[test]
fn test_explicit_values_win_over_defaults() {
    let sample = Sample::validate(&json!({
        "host": "db",
        "table": "users",
        "charset": "latin1",
        "load": false,
        "port": 3306,
    }))
    .unwrap();

    assert_eq!(sample.charset, "latin1");
    assert!(!sample.load);
    assert_eq!(sample.port, Some(3306));
}

#[test]
fn test_null_counts_as_absent() {
    let sample = Sample::validate(&json!({
        "host": "db",
        "query": "SELECT 1",
        "port": null,
        "load": null,
    }))
    .unwrap();
    assert_eq!(sample.port, None);
    assert!(sample.load);

    let error = Sample::validate(&json!({"host": null, "query": "q"})).unwrap_err();
    assert!(error.contains("host", ViolationKind::Missing));
}

#[test]
fn test_missing_required_field() {
    let error = Sample::validate(&json!({"query": "SELECT 1"})).unwrap_err();
    assert_eq!(error.len(), 1);
    assert!(error.contains("host", ViolationKind::Missing));
    assert_eq!(error.violations()[0].value, Value::Null);
}

#[test]
fn test_all_violations_are_reported() {
    let error = Sample::validate(&json!({
        "host": "",
        "port": 70000,
        "query": "",
        "type": "Postgres",
        "colour": "blue",
    }))
    .unwrap_err();

    assert!(error.contains("host", ViolationKind::MinLength));
    assert!(error.contains("port", ViolationKind::Maximum));
    assert!(error.contains("query", ViolationKind::MinLength));
    assert!(error.contains("type", ViolationKind::OneOf));
    assert!(error.contains("colour", ViolationKind::UnknownField));
    assert_eq!(error.len(), 5, "{error}");
}

#[test]
fn test_type_mismatch() {
    let error = Sample::validate(&json!({
        "host": 42,
        "port": "3306",
        "load": "yes",
        "query": "q",
    }))
    .unwrap_err();

    assert!(error.contains("host", ViolationKind::Type));
    assert!(error.contains("port", ViolationKind::Type));
    assert!(error.contains("load", ViolationKind::Type));
    assert_eq!(error.violations()[1].value, json!("3306"));
}

#[test]
fn test_fractional_port_is_a_type_error() {
    let error = Sample::validate(&json!({"host": "db", "query": "q", "port": 5432.5})).unwrap_err();
    assert!(error.contains("port", ViolationKind::Type));
}

#[test]
fn test_minimum_bound() {
    let error = Sample::validate(&json!({"host": "db", "query": "q", "port": 0})).unwrap_err();
    assert!(error.contains("port", ViolationKind::Minimum));
    assert_eq!(error.violations()[0].value, json!(0));
}

#[test]
fn test_at_least_one_of_rule() {
    let error = Sample::validate(&json!({"host": "db"})).unwrap_err();
    assert!(error.contains("query|table", ViolationKind::AtLeastOneOf));

    let error = Sample::validate(&json!({"host": "db", "query": null})).unwrap_err();
    assert!(error.contains("query|table", ViolationKind::AtLeastOneOf));
}

#[test]
fn test_secret_values_are_masked_in_violations() {
    let error = Sample::validate(&json!({
        "host": "db",
        "query": "q",
        "password": "much-too-long-password",
    }))
    .unwrap_err();

    assert!(error.contains("password", ViolationKind::MaxLength));
    assert_eq!(error.violations()[0].value, json!(SECRET_MASK));
    assert!(!error.to_string().contains("much-too-long-password"));

    let error = Sample::validate(&json!({"host": "db", "query": "q", "password": 1234})).unwrap_err();
    assert!(error.contains("password", ViolationKind::Type));
    assert!(!error.to_string().contains("1234"));
}

#[test]
fn test_not_an_object() {
    for raw in [json!([1, 2]), json!("host=db"), json!(null), json!(3)] {
        let error = Sample::validate(&raw).unwrap_err();
        assert_eq!(error.len(), 1);
        assert_eq!(error.violations()[0].kind, ViolationKind::NotAnObject);
    }
}

#[test]
fn test_prefixed_paths() {
    let error = Sample::validate(&json!({"host": "", "port": 0}))
        .unwrap_err()
        .prefixed("connectors[2]");

    assert!(error.contains("connectors[2].host", ViolationKind::MinLength));
    assert!(error.contains("connectors[2].port", ViolationKind::Minimum));

    let error = Sample::validate(&json!(1)).unwrap_err().prefixed("data_sources[0]");
    assert!(error.contains("data_sources[0]", ViolationKind::NotAnObject));
}

#[test]
fn test_validate_fields_returns_normalized_object() {
    let normalized =
        validate_fields(&json!({"host": "db", "table": "t", "port": null}), SAMPLE_FIELDS, &[])
            .unwrap();

    assert_eq!(
        Value::Object(normalized),
        json!({"host": "db", "charset": "utf8mb4", "load": true, "table": "t"})
    );
}

#[test]
fn test_display_lists_every_violation() {
    let error = Sample::validate(&json!({"port": 0})).unwrap_err();
    let message = error.to_string();

    assert!(message.starts_with("Validation failed with 3 error(s)"));
    assert!(message.contains("host: field required (missing)"));
    assert!(message.contains("port: must be >= 1 (minimum), got 0"));
}

#[test]
fn test_violations_serialize() {
    let error = Sample::validate(&json!({"query": "q"})).unwrap_err();
    let value = serde_json::to_value(&error).unwrap();

    assert_eq!(value["violations"][0]["field_path"], "host");
    assert_eq!(value["violations"][0]["kind"], "missing");
}
