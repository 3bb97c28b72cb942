//! Configuration validation integration tests.
//!
//! This test suite covers:
//! - Normalized connection parameters of validated records
//! - Reporting every violation of a record at once
//! - Secret masking in every error surface
//! - Exported JSON Schemas of the compiled-in backends

#![allow(clippy::unwrap_used, clippy::panic)]

use serde_json::{Value, json};
use toucan_connectors_core::schema::check_document;
use toucan_connectors_core::security::SECRET_MASK;
use toucan_connectors_core::{ConnectorsError, Registry, ViolationKind};

#[cfg(feature = "mssql")]
mod mssql {
    use serde_json::json;
    use toucan_connectors_core::connectors::mssql::{MssqlConnector, MssqlDataSource};
    use toucan_connectors_core::{Model, ToucanConnector, ViolationKind};

    #[test]
    fn test_mssql_params_leave_out_unset_values() {
        let connector = MssqlConnector::validate(&json!({
            "name": "erp",
            "host": "db.example.com",
            "user": "alice",
            "password": "secret",
        }))
        .unwrap();
        let data_source = MssqlDataSource::validate(&json!({
            "domain": "one",
            "name": "erp",
            "query": "SELECT 1",
        }))
        .unwrap();

        let params = connector.connection_params(&data_source);
        let mut keys = params.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["as_dict", "password", "server", "user"]);
        assert!(!params.contains_key("port"));
        assert!(!params.contains_key("login_timeout"));
        assert_eq!(params.flag("as_dict"), Some(true));
    }

    #[test]
    fn test_mssql_empty_query_is_min_length() {
        let error = MssqlDataSource::validate(&json!({
            "domain": "one",
            "name": "erp",
            "query": "",
        }))
        .unwrap_err();

        assert_eq!(error.len(), 1);
        assert!(error.contains("query", ViolationKind::MinLength));
    }
}

#[cfg(feature = "postgresql")]
mod postgres {
    use serde_json::json;
    use toucan_connectors_core::connectors::postgres::{PostgresConnector, PostgresDataSource};
    use toucan_connectors_core::{Model, ToucanConnector, ViolationKind};

    #[test]
    fn test_postgres_reports_every_violation() {
        let error = PostgresConnector::validate(&json!({
            "name": "",
            "port": 0,
            "password": 1234,
            "colour": "blue",
        }))
        .unwrap_err();

        assert!(error.contains("colour", ViolationKind::UnknownField));
        assert!(error.contains("name", ViolationKind::MinLength));
        assert!(error.contains("host", ViolationKind::Missing));
        assert!(error.contains("port", ViolationKind::Minimum));
        assert!(error.contains("user", ViolationKind::Missing));
        assert!(error.contains("password", ViolationKind::Type));
        assert_eq!(error.len(), 6);
    }

    #[test]
    fn test_postgres_params_use_data_source_database() {
        let connector = PostgresConnector::validate(&json!({
            "name": "warehouse",
            "host": "db.example.com",
            "user": "alice",
            "password": "secret",
        }))
        .unwrap();
        let data_source = PostgresDataSource::validate(&json!({
            "domain": "orders",
            "name": "warehouse",
            "database": "sales",
            "query": "SELECT 1",
        }))
        .unwrap();

        let params = connector.connection_params(&data_source);
        assert_eq!(params.keys(), vec!["host", "user", "password", "dbname"]);
        assert_eq!(params.text("dbname"), Some("sales"));
    }
}

fn registry() -> Registry {
    Registry::with_default_backends()
}

#[test]
fn test_secret_never_appears_in_reports() {
    let registry = registry();
    let Some(backend) = registry
        .backends()
        .into_iter()
        .find(|backend| {
            let schema = (registry.entry(backend).unwrap().connector_schema)();
            schema.field("password").is_some()
        })
    else {
        return;
    };

    let raw = json!({
        "type": backend,
        "name": "leaky",
        "password": "hunter2-super-secret",
        "port": -1,
        "unexpected": true,
    });
    let Err(ConnectorsError::Validation(error)) = registry.connector_from_json(&raw) else {
        panic!("expected a validation error");
    };

    assert!(!error.to_string().contains("hunter2"));
    assert!(!serde_json::to_string(&error).unwrap().contains("hunter2"));
    assert!(!format!("{error:?}").contains("hunter2"));

    let schema = (registry.entry(backend).unwrap().connector_schema)();
    let masked = schema.mask_secrets(&raw);
    assert_eq!(masked["password"], json!(SECRET_MASK));
    let messages = check_document(&schema.json_schema(), &masked).unwrap();
    assert!(!messages.is_empty());
    assert!(messages.iter().all(|m| !m.contains("hunter2")));
}

#[test]
fn test_exported_schemas_compile_and_describe_types() {
    let registry = registry();
    assert!(!registry.backends().is_empty());

    for backend in registry.backends() {
        let schema = registry.describe(backend).unwrap().json_schema();
        for record in ["connector", "data_source"] {
            let document = &schema[record];
            assert_eq!(document["type"], json!("object"));
            assert_eq!(document["additionalProperties"], json!(false));
            check_document(document, &json!({})).unwrap();
        }
    }
}

#[test]
fn test_exported_connector_schemas_require_name() {
    let registry = registry();
    for backend in registry.backends() {
        let description = registry.describe(backend).unwrap();
        let connector_schema = description.connector.json_schema();
        let required: Vec<&str> = connector_schema["required"]
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        assert!(required.contains(&"name"), "{} connector", description.backend);
    }
}

#[test]
fn test_unknown_backend_is_unsupported() {
    let error = registry()
        .connector_from_json(&json!({"type": "Oracle", "name": "x"}))
        .unwrap_err();

    match error {
        ConnectorsError::UnsupportedBackend { backend, hint } => {
            assert_eq!(backend, "Oracle");
            assert!(hint.starts_with("Available backends:"));
        }
        other => panic!("expected an unsupported backend error, got {other:?}"),
    }
}

#[test]
fn test_missing_type_is_reported() {
    let Err(ConnectorsError::Validation(error)) =
        registry().connector_from_json(&json!({"name": "x"}))
    else {
        panic!("expected a validation error");
    };
    assert!(error.contains("type", ViolationKind::Missing));
}

#[test]
fn test_catalog_reports_all_records() {
    let document = json!({
        "connectors": [
            {"type": "SQLite", "name": "local", "path": ""},
            {"type": "SQLite", "name": "other", "path": "b.db"},
            {"type": "SQLite", "name": "other", "path": "c.db"},
        ],
        "data_sources": [
            {"domain": "a", "name": "local", "query": "SELECT 1"},
            {"domain": "b", "name": "ghost", "query": "SELECT 1"},
            {"domain": "c", "name": "other", "query": ""},
        ],
    });

    if !registry().backends().contains(&"SQLite") {
        return;
    }
    let Err(ConnectorsError::Validation(error)) =
        toucan_connectors_core::Catalog::from_value(&registry(), &document)
    else {
        panic!("expected a validation error");
    };

    assert!(error.contains("connectors[0].path", ViolationKind::MinLength));
    assert!(error.contains("connectors[2].name", ViolationKind::Duplicate));
    assert!(error.contains("data_sources[1].name", ViolationKind::UnknownConnector));
    assert!(error.contains("data_sources[2].query", ViolationKind::MinLength));
    assert!(!error.contains("data_sources[0].name", ViolationKind::UnknownConnector));
}

#[test]
fn test_catalog_validates_sources_of_rejected_connectors() {
    if !registry().backends().contains(&"SQLite") {
        return;
    }
    let document = json!({
        "connectors": [{"type": "SQLite", "name": "local", "path": ""}],
        "data_sources": [{"domain": "d", "name": "local", "query": ""}],
    });

    let Err(ConnectorsError::Validation(error)) =
        toucan_connectors_core::Catalog::from_value(&registry(), &document)
    else {
        panic!("expected a validation error");
    };

    assert!(error.contains("connectors[0].path", ViolationKind::MinLength));
    assert!(error.contains("data_sources[0].query", ViolationKind::MinLength));
    assert_eq!(error.len(), 2);
}

#[test]
fn test_catalog_unknown_backend_keeps_other_violations() {
    if !registry().backends().contains(&"SQLite") {
        return;
    }
    let document = json!({
        "connectors": [
            {"type": "SQLite", "name": "local", "path": ""},
            {"type": "Oracle", "name": "legacy"},
        ],
    });

    let Err(ConnectorsError::Validation(error)) =
        toucan_connectors_core::Catalog::from_value(&registry(), &document)
    else {
        panic!("expected a validation error");
    };

    assert!(error.contains("connectors[0].path", ViolationKind::MinLength));
    assert!(error.contains("connectors[1].type", ViolationKind::OneOf));
    let unsupported = error
        .violations()
        .iter()
        .find(|v| v.field_path == "connectors[1].type")
        .unwrap();
    assert_eq!(unsupported.value, json!("Oracle"));
    assert!(unsupported.detail.contains("SQLite"));
}
