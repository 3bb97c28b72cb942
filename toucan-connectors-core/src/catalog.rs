//! Saved configuration documents.
//!
//! A catalog file binds data sources to the connectors they name:
//!
//! ```json
//! {
//!   "connectors": [{"type": "SQLite", "name": "local", "path": "app.db"}],
//!   "data_sources": [{"domain": "users", "name": "local", "query": "SELECT * FROM users"}]
//! }
//! ```
//!
//! Loading validates every record and reports all violations at once, with
//! paths such as `connectors[0].path` or `data_sources[2].query`.

use crate::connector::{AnyDataSource, DynConnector};
use crate::error::{ConnectorsError, Result};
use crate::models::{DataSlice, Table};
use crate::registry::Registry;
use crate::validation::{FieldViolation, ValidationError, ViolationKind};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const TOP_LEVEL_KEYS: &[&str] = &["connectors", "data_sources"];

/// Validated connectors and data sources of a catalog document.
#[derive(Debug, Default)]
pub struct Catalog {
    connectors: Vec<Arc<dyn DynConnector>>,
    data_sources: Vec<Box<dyn AnyDataSource>>,
}

/// Items of the `key` array, recording a violation when it is not an array.
fn records<'a>(
    object: &'a serde_json::Map<String, Value>,
    key: &str,
    errors: &mut ValidationError,
) -> &'a [Value] {
    match object.get(key) {
        None | Some(Value::Null) => &[],
        Some(Value::Array(items)) => items,
        Some(other) => {
            errors.push(FieldViolation::new(
                key,
                ViolationKind::Type,
                Value::from(type_label(other)),
                "expected an array",
            ));
            &[]
        }
    }
}

fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Splits a builder result into a value or collected violations.
///
/// An unknown or disabled backend is recorded at `<prefix>.type` with the
/// registry's hint.
fn collect<T>(result: Result<T>, prefix: &str, errors: &mut ValidationError) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ConnectorsError::Validation(violations)) => {
            errors.extend(violations.prefixed(prefix));
            Ok(None)
        }
        Err(ConnectorsError::UnsupportedBackend { backend, hint }) => {
            errors.push(FieldViolation::new(
                format!("{prefix}.type"),
                ViolationKind::OneOf,
                Value::from(backend),
                hint,
            ));
            Ok(None)
        }
        Err(other) => Err(other),
    }
}

impl Catalog {
    /// Validates a catalog document.
    ///
    /// # Errors
    /// Returns [`ConnectorsError::Validation`] with every violation of every
    /// record. A backend that is unknown or not compiled in is reported as a
    /// `one_of` violation on the record's `type`.
    pub fn from_value(registry: &Registry, raw: &Value) -> Result<Self> {
        let Some(object) = raw.as_object() else {
            return Err(ValidationError::single(FieldViolation::new(
                "",
                ViolationKind::NotAnObject,
                Value::from(type_label(raw)),
                "expected an object with `connectors` and `data_sources`",
            ))
            .into());
        };

        let mut errors = ValidationError::default();
        for key in object.keys().filter(|k| !TOP_LEVEL_KEYS.contains(&k.as_str())) {
            errors.push(FieldViolation::new(
                key.as_str(),
                ViolationKind::UnknownField,
                Value::Null,
                "extra fields not permitted",
            ));
        }

        let mut catalog = Catalog::default();
        let mut backends_by_name: HashMap<String, &'static str> = HashMap::new();

        let raw_connectors = records(object, "connectors", &mut errors);
        for (index, raw_connector) in raw_connectors.iter().enumerate() {
            let prefix = format!("connectors[{index}]");
            let built = collect(
                registry.connector_from_json(raw_connector),
                &prefix,
                &mut errors,
            )?;
            let Some(connector) = built else {
                continue;
            };

            if backends_by_name.contains_key(connector.name()) {
                errors.push(FieldViolation::new(
                    format!("{prefix}.name"),
                    ViolationKind::Duplicate,
                    Value::from(connector.name()),
                    "connector names must be unique",
                ));
                continue;
            }
            backends_by_name.insert(connector.name().to_string(), connector.backend());
            catalog.connectors.push(connector);
        }

        let mut domains: Vec<String> = Vec::new();
        let raw_sources = records(object, "data_sources", &mut errors);
        for (index, raw_source) in raw_sources.iter().enumerate() {
            let prefix = format!("data_sources[{index}]");
            let connector_name = raw_source.get("name").and_then(Value::as_str);
            let declared_backend = raw_source.get("type").and_then(Value::as_str);

            let referenced = connector_name.and_then(|name| backends_by_name.get(name).copied());
            let rejected = connector_name.and_then(|name| rejected_connector(object, name));
            if let Some(name) = connector_name
                && referenced.is_none()
                && rejected.is_none()
            {
                errors.push(FieldViolation::new(
                    format!("{prefix}.name"),
                    ViolationKind::UnknownConnector,
                    Value::from(name),
                    "no connector with this name is declared",
                ));
            }

            // The referenced connector decides the schema, even when it was
            // itself rejected; an explicit `type` that disagrees with it is
            // reported by that schema.
            let rejected_backend = rejected
                .and_then(|raw| raw.get("type"))
                .and_then(Value::as_str)
                .filter(|backend| registry.entry(backend).is_ok());
            let Some(backend) = referenced.or(rejected_backend).or(declared_backend) else {
                if connector_name.is_none() {
                    errors.extend(missing_name_or_invalid(raw_source).prefixed(&prefix));
                }
                continue;
            };

            let built = collect(
                registry.data_source_from_json(backend, raw_source),
                &prefix,
                &mut errors,
            )?;
            let Some(data_source) = built else {
                continue;
            };

            if domains.iter().any(|d| d == data_source.domain()) {
                errors.push(FieldViolation::new(
                    format!("{prefix}.domain"),
                    ViolationKind::Duplicate,
                    Value::from(data_source.domain()),
                    "data source domains must be unique",
                ));
                continue;
            }
            domains.push(data_source.domain().to_string());
            catalog.data_sources.push(data_source);
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!(
            connectors = catalog.connectors.len(),
            data_sources = catalog.data_sources.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    /// Parses and validates a catalog document.
    ///
    /// # Errors
    /// Returns a serialization error for malformed JSON, otherwise the
    /// errors of [`Catalog::from_value`].
    pub fn from_json_str(registry: &Registry, json: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(json)
            .map_err(|e| ConnectorsError::serialization("Failed to parse catalog document", e))?;
        Self::from_value(registry, &raw)
    }

    /// Reads, parses and validates a catalog file.
    ///
    /// # Errors
    /// Returns an I/O error when the file cannot be read, otherwise the
    /// errors of [`Catalog::from_json_str`].
    pub async fn load(registry: &Registry, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading catalog file");
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ConnectorsError::io(format!("Failed to read catalog file {}", path.display()), e)
        })?;
        Self::from_json_str(registry, &content)
    }

    /// Connectors in document order.
    pub fn connectors(&self) -> &[Arc<dyn DynConnector>] {
        &self.connectors
    }

    /// Data sources in document order.
    pub fn data_sources(&self) -> impl Iterator<Item = &dyn AnyDataSource> {
        self.data_sources.iter().map(AsRef::as_ref)
    }

    /// Data sources the platform preloads.
    pub fn loadable(&self) -> impl Iterator<Item = &dyn AnyDataSource> {
        self.data_sources().filter(|ds| ds.load())
    }

    /// Connector named `name`.
    pub fn connector(&self, name: &str) -> Option<&Arc<dyn DynConnector>> {
        self.connectors.iter().find(|c| c.name() == name)
    }

    /// Data source whose domain is `domain`.
    pub fn data_source(&self, domain: &str) -> Option<&dyn AnyDataSource> {
        self.data_sources().find(|ds| ds.domain() == domain)
    }

    fn resolve(&self, domain: &str) -> Result<(&Arc<dyn DynConnector>, &dyn AnyDataSource)> {
        let data_source = self.data_source(domain).ok_or_else(|| {
            ConnectorsError::configuration(format!("No data source with domain '{domain}'"))
        })?;
        let connector = self.connector(data_source.connector_name()).ok_or_else(|| {
            ConnectorsError::configuration(format!(
                "No connector named '{}'",
                data_source.connector_name()
            ))
        })?;
        Ok((connector, data_source))
    }

    /// Runs the data source with domain `domain` through its connector.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown domain, otherwise the
    /// errors of [`DynConnector::retrieve`].
    pub async fn retrieve(&self, domain: &str) -> Result<Table> {
        let (connector, data_source) = self.resolve(domain)?;
        connector.retrieve(data_source).await
    }

    /// Runs the data source with domain `domain` and keeps a window of rows.
    ///
    /// # Errors
    /// Same as [`Catalog::retrieve`].
    pub async fn retrieve_slice(
        &self,
        domain: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<DataSlice> {
        let (connector, data_source) = self.resolve(domain)?;
        connector.retrieve_slice(data_source, offset, limit).await
    }
}

/// Raw record of a connector named `name` that is declared but failed
/// validation; its own violations already explain the problem.
fn rejected_connector<'a>(
    object: &'a serde_json::Map<String, Value>,
    name: &str,
) -> Option<&'a Value> {
    object
        .get("connectors")
        .and_then(Value::as_array)?
        .iter()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(name))
}

/// Violation for a data source that names no connector.
fn missing_name_or_invalid(raw: &Value) -> ValidationError {
    if raw.is_object() {
        let value = raw.get("name").cloned().unwrap_or(Value::Null);
        let kind = if value.is_null() {
            ViolationKind::Missing
        } else {
            ViolationKind::Type
        };
        ValidationError::single(FieldViolation::new(
            "name",
            kind,
            value,
            "name of a declared connector required",
        ))
    } else {
        ValidationError::single(FieldViolation::new(
            "",
            ViolationKind::NotAnObject,
            Value::from(type_label(raw)),
            "expected an object",
        ))
    }
}
