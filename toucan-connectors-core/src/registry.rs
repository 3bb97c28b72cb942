//! Backend registry: routes saved configuration to the backend it names.
//!
//! Each backend registers under its stable identifier (`MSSQL`, `Postgres`,
//! `MySQL`, `SQLite`, `MongoDB`). Backends are cargo features; asking for a
//! known backend that was not compiled in yields
//! [`ConnectorsError::UnsupportedBackend`] with the feature to enable.

use crate::connector::{AnyDataSource, DynConnector, ToucanConnector};
use crate::error::{ConnectorsError, Result};
use crate::schema::{Model, ModelSchema};
use crate::validation::{FieldViolation, ValidationError, ViolationKind};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Every backend identifier with the cargo feature that provides it.
pub const KNOWN_BACKENDS: &[(&str, &str)] = &[
    ("MSSQL", "mssql"),
    ("Postgres", "postgresql"),
    ("MySQL", "mysql"),
    ("SQLite", "sqlite"),
    ("MongoDB", "mongodb"),
];

/// Constructors and schemas of one backend.
#[derive(Debug, Clone, Copy)]
pub struct BackendEntry {
    /// Stable backend identifier
    pub backend: &'static str,
    /// Field schema of the connector record
    pub connector_schema: fn() -> ModelSchema,
    /// Field schema of the data-source record
    pub data_source_schema: fn() -> ModelSchema,
    /// Validates raw configuration into a connector
    pub build_connector: fn(&Value) -> std::result::Result<Arc<dyn DynConnector>, ValidationError>,
    /// Validates raw configuration into a data source
    pub build_data_source:
        fn(&Value) -> std::result::Result<Box<dyn AnyDataSource>, ValidationError>,
}

fn build_connector<C: ToucanConnector>(
    raw: &Value,
) -> std::result::Result<Arc<dyn DynConnector>, ValidationError> {
    Ok(Arc::new(C::validate(raw)?))
}

fn build_data_source<C: ToucanConnector>(
    raw: &Value,
) -> std::result::Result<Box<dyn AnyDataSource>, ValidationError> {
    Ok(Box::new(<C::DataSource as Model>::validate(raw)?))
}

impl BackendEntry {
    /// Entry for connector type `C`.
    pub fn of<C: ToucanConnector>() -> Self {
        Self {
            backend: C::BACKEND,
            connector_schema: C::schema,
            data_source_schema: <C::DataSource as Model>::schema,
            build_connector: build_connector::<C>,
            build_data_source: build_data_source::<C>,
        }
    }
}

/// Connector and data-source schemas of a backend.
#[derive(Debug, Clone, Copy)]
pub struct BackendDescription {
    /// Stable backend identifier
    pub backend: &'static str,
    /// Connector record schema
    pub connector: ModelSchema,
    /// Data-source record schema
    pub data_source: ModelSchema,
}

impl BackendDescription {
    /// Both records as JSON Schema documents.
    pub fn json_schema(&self) -> Value {
        serde_json::json!({
            "backend": self.backend,
            "connector": self.connector.json_schema(),
            "data_source": self.data_source.json_schema(),
        })
    }
}

/// Registered backends, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<BackendEntry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every backend compiled into this build.
    pub fn with_default_backends() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "mssql")]
        registry.register::<crate::connectors::mssql::MssqlConnector>();
        #[cfg(feature = "postgresql")]
        registry.register::<crate::connectors::postgres::PostgresConnector>();
        #[cfg(feature = "mysql")]
        registry.register::<crate::connectors::mysql::MySqlConnector>();
        #[cfg(feature = "sqlite")]
        registry.register::<crate::connectors::sqlite::SqliteConnector>();
        #[cfg(feature = "mongodb")]
        registry.register::<crate::connectors::mongodb::MongoConnector>();

        registry
    }

    /// Registers connector type `C`, replacing a previous entry with the
    /// same identifier.
    pub fn register<C: ToucanConnector>(&mut self) {
        let entry = BackendEntry::of::<C>();
        debug!(backend = entry.backend, "Registering backend");
        match self.entries.iter_mut().find(|e| e.backend == entry.backend) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Registered identifiers in registration order.
    pub fn backends(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.backend).collect()
    }

    /// Entry of `backend`.
    ///
    /// # Errors
    /// Returns [`ConnectorsError::UnsupportedBackend`] for an unknown
    /// identifier or a backend whose feature is disabled.
    pub fn entry(&self, backend: &str) -> Result<&BackendEntry> {
        if let Some(entry) = self.entries.iter().find(|e| e.backend == backend) {
            return Ok(entry);
        }

        let hint = match KNOWN_BACKENDS.iter().find(|(id, _)| *id == backend) {
            Some((id, feature)) => {
                format!("Compile with --features {feature} to enable {id} support")
            }
            None => format!("Available backends: {}", self.backends().join(", ")),
        };
        Err(ConnectorsError::unsupported_backend(backend, hint))
    }

    /// Schemas of `backend`.
    ///
    /// # Errors
    /// Same as [`Registry::entry`].
    pub fn describe(&self, backend: &str) -> Result<BackendDescription> {
        let entry = self.entry(backend)?;
        Ok(BackendDescription {
            backend: entry.backend,
            connector: (entry.connector_schema)(),
            data_source: (entry.data_source_schema)(),
        })
    }

    /// Builds a connector from raw configuration routed by its `type` key.
    ///
    /// # Errors
    /// Returns a validation error when `type` is missing or invalid or the
    /// record violates its declarations, and an unsupported-backend error
    /// for an unknown identifier.
    pub fn connector_from_json(&self, raw: &Value) -> Result<Arc<dyn DynConnector>> {
        let backend = backend_of(raw)?;
        let entry = self.entry(backend)?;
        Ok((entry.build_connector)(raw)?)
    }

    /// Builds a data source of `backend`.
    ///
    /// # Errors
    /// Returns a validation error when the record violates its
    /// declarations, and an unsupported-backend error for an unknown
    /// identifier.
    pub fn data_source_from_json(
        &self,
        backend: &str,
        raw: &Value,
    ) -> Result<Box<dyn AnyDataSource>> {
        let entry = self.entry(backend)?;
        Ok((entry.build_data_source)(raw)?)
    }
}

/// Reads the `type` discriminator of a raw record.
fn backend_of(raw: &Value) -> std::result::Result<&str, ValidationError> {
    let Some(object) = raw.as_object() else {
        return Err(ValidationError::single(FieldViolation::new(
            "",
            ViolationKind::NotAnObject,
            raw.clone(),
            "expected an object",
        )));
    };

    match object.get("type") {
        None | Some(Value::Null) => Err(ValidationError::single(FieldViolation::new(
            "type",
            ViolationKind::Missing,
            Value::Null,
            "field required to select a backend",
        ))),
        Some(Value::String(backend)) => Ok(backend),
        Some(other) => Err(ValidationError::single(FieldViolation::new(
            "type",
            ViolationKind::Type,
            other.clone(),
            "expected string",
        ))),
    }
}
