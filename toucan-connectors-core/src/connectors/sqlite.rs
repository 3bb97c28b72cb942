//! SQLite connector.
//!
//! Databases are opened read-only; a missing file is a connection error
//! rather than a new empty database.
//!
//! # Example
//! ```rust,no_run
//! use serde_json::json;
//! use toucan_connectors_core::connector::ToucanConnector;
//! use toucan_connectors_core::connectors::sqlite::{SqliteConnector, SqliteDataSource};
//! use toucan_connectors_core::schema::Model;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = SqliteConnector::validate(&json!({"name": "local", "path": "app.db"}))?;
//! let data_source = SqliteDataSource::validate(&json!({
//!     "domain": "users",
//!     "name": "local",
//!     "query": "SELECT id, email FROM users",
//! }))?;
//!
//! let table = connector.retrieve(&data_source).await?;
//! println!("{} rows", table.num_rows());
//! # Ok(())
//! # }
//! ```

use super::{binary_cell, date_cell, float_cell, sql};
use crate::connector::base::{
    backend_type_field, connector_name_field, data_source_name_field, domain_field,
    live_data_field, load_field,
};
use crate::connector::{ConnectorBase, DataSourceBase, ToucanConnector, ToucanDataSource};
use crate::error::ConnectorError;
use crate::models::{Cell, Column, Table};
use crate::params::ConnectionParams;
use crate::schema::{Constraint, FieldSpec, Model, Widget};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as _, ConnectOptions, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::debug;

const BACKEND: &str = "SQLite";

/// Connection to a SQLite database file.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConnector {
    /// Shared connector fields
    #[serde(flatten)]
    pub base: ConnectorBase,
    /// Path of the database file
    pub path: String,
}

/// Query against a SQLite database.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteDataSource {
    /// Shared data-source fields
    #[serde(flatten)]
    pub base: DataSourceBase,
    /// SQL query
    pub query: String,
}

const CONNECTOR_FIELDS: &[FieldSpec] = &[
    connector_name_field(),
    backend_type_field(&[Constraint::OneOf(&["SQLite"])]),
    FieldSpec::string("path")
        .required()
        .description("Path of the database file")
        .constraints(&[Constraint::MinLength(1)]),
];

const DATA_SOURCE_FIELDS: &[FieldSpec] = &[
    domain_field(),
    data_source_name_field(),
    backend_type_field(&[Constraint::OneOf(&["SQLite"])]),
    load_field(),
    live_data_field(),
    FieldSpec::string("query")
        .required()
        .title("SQL query")
        .widget(Widget::Sql)
        .constraints(&[Constraint::MinLength(1)]),
];

impl Model for SqliteConnector {
    const TITLE: &'static str = "SQLite connector";
    const DESCRIPTION: &'static str = "Read-only access to a SQLite database file";

    fn fields() -> &'static [FieldSpec] {
        CONNECTOR_FIELDS
    }
}

impl Model for SqliteDataSource {
    const TITLE: &'static str = "SQLite data source";

    fn fields() -> &'static [FieldSpec] {
        DATA_SOURCE_FIELDS
    }
}

impl ToucanDataSource for SqliteDataSource {
    const BACKEND: &'static str = BACKEND;

    fn base(&self) -> &DataSourceBase {
        &self.base
    }
}

/// Decodes one value. The declared column type wins; expressions without
/// one fall back to the storage class of the value.
fn cell_at(row: &SqliteRow, index: usize, declared: &str) -> Cell {
    let Ok(raw) = row.try_get_raw(index) else {
        return Cell::Null;
    };
    if raw.is_null() {
        return Cell::Null;
    }
    let type_name = if declared.is_empty() || declared == "NULL" {
        raw.type_info().name().to_ascii_uppercase()
    } else {
        declared.to_ascii_uppercase()
    };

    let decoded = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Cell::Boolean),
        "INTEGER" => row.try_get::<i64, _>(index).map(Cell::Integer),
        "REAL" => row.try_get::<f64, _>(index).map(float_cell),
        "DATETIME" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(Cell::Timestamp),
        "DATE" => row.try_get::<chrono::NaiveDate, _>(index).map(date_cell),
        "BLOB" => row.try_get::<Vec<u8>, _>(index).map(|bytes| binary_cell(&bytes)),
        _ => return sql::fallback_cell(row, index),
    };
    decoded.unwrap_or_else(|_| sql::fallback_cell(row, index))
}

#[async_trait]
impl ToucanConnector for SqliteConnector {
    const BACKEND: &'static str = BACKEND;

    type DataSource = SqliteDataSource;
    type Connection = SqliteConnection;

    fn base(&self) -> &ConnectorBase {
        &self.base
    }

    fn connection_params(&self, _data_source: &SqliteDataSource) -> ConnectionParams {
        ConnectionParams::new()
            .with("path", Some(self.path.as_str()))
            .with("read_only", Some(true))
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<SqliteConnection, ConnectorError> {
        let path = params.text("path").unwrap_or_default();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(params.flag("read_only").unwrap_or(true))
            .create_if_missing(false);

        debug!(backend = BACKEND, path, "Opening database");
        options.connect().await.map_err(|e| {
            ConnectorError::connection(BACKEND, format!("Failed to open database '{path}'"), e)
        })
    }

    async fn execute(
        &self,
        connection: &mut SqliteConnection,
        data_source: &SqliteDataSource,
    ) -> Result<Table, ConnectorError> {
        let query = data_source.query.as_str();
        let statement = connection
            .prepare(query)
            .await
            .map_err(|e| ConnectorError::query(BACKEND, "Failed to prepare query", e))?;
        let declared: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.type_info().name().to_string())
            .collect();
        let columns: Vec<Column> = statement
            .columns()
            .iter()
            .zip(&declared)
            .map(|(c, type_name)| Column::new(c.name(), sql::exchange_type_for(type_name)))
            .collect();

        let rows = sqlx::query(query)
            .fetch_all(&mut *connection)
            .await
            .map_err(|e| ConnectorError::query(BACKEND, "Failed to execute query", e))?;

        let cells = rows
            .iter()
            .map(|row| {
                declared
                    .iter()
                    .enumerate()
                    .map(|(index, type_name)| cell_at(row, index, type_name))
                    .collect()
            })
            .collect();
        sql::build_table(BACKEND, columns, cells)
    }

    async fn release(&self, connection: SqliteConnection) -> Result<(), ConnectorError> {
        connection
            .close()
            .await
            .map_err(|e| ConnectorError::connection(BACKEND, "Failed to close database", e))
    }
}
