//! PostgreSQL connector.
//!
//! The database is chosen per data source, so one saved connection can
//! serve every database on a server.

use super::{binary_cell, date_cell, float_cell, sql};
use crate::connector::base::{
    backend_type_field, connector_name_field, data_source_name_field, domain_field,
    live_data_field, load_field,
};
use crate::connector::{
    ConnectorBase, DataSourceBase, ToucanConnector, ToucanDataSource, timeout_from_secs,
};
use crate::error::ConnectorError;
use crate::models::{Cell, Column, Table};
use crate::params::ConnectionParams;
use crate::schema::{Constraint, FieldSpec, Model, Widget};
use crate::security::Secret;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column as _, ConnectOptions, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::debug;

const BACKEND: &str = "Postgres";
const DEFAULT_PORT: u16 = 5432;

/// Connection to a PostgreSQL server.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConnector {
    /// Shared connector fields
    #[serde(flatten)]
    pub base: ConnectorBase,
    /// Server host name or address
    pub host: String,
    /// Server port, 5432 when unset
    pub port: Option<u16>,
    /// Login user
    pub user: String,
    /// Login password
    pub password: Option<Secret>,
    /// Connect timeout in seconds
    pub connect_timeout: Option<u64>,
}

/// Query against a PostgreSQL database.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresDataSource {
    /// Shared data-source fields
    #[serde(flatten)]
    pub base: DataSourceBase,
    /// Database the query runs in
    pub database: String,
    /// SQL query
    pub query: String,
}

const CONNECTOR_FIELDS: &[FieldSpec] = &[
    connector_name_field(),
    backend_type_field(&[Constraint::OneOf(&["Postgres"])]),
    FieldSpec::string("host")
        .required()
        .description("Server host name or IP address")
        .constraints(&[Constraint::MinLength(1)]),
    FieldSpec::integer("port")
        .description("Server port")
        .constraints(&[Constraint::Minimum(1), Constraint::Maximum(65535)]),
    FieldSpec::string("user").required(),
    FieldSpec::secret("password"),
    FieldSpec::integer("connect_timeout")
        .title("Connection timeout")
        .description("Seconds to wait while opening a connection")
        .constraints(&[Constraint::Minimum(1)]),
];

const DATA_SOURCE_FIELDS: &[FieldSpec] = &[
    domain_field(),
    data_source_name_field(),
    backend_type_field(&[Constraint::OneOf(&["Postgres"])]),
    load_field(),
    live_data_field(),
    FieldSpec::string("database")
        .required()
        .description("Name of the database")
        .constraints(&[Constraint::MinLength(1)]),
    FieldSpec::string("query")
        .required()
        .title("SQL query")
        .widget(Widget::Sql)
        .constraints(&[Constraint::MinLength(1)]),
];

impl Model for PostgresConnector {
    const TITLE: &'static str = "PostgreSQL connector";

    fn fields() -> &'static [FieldSpec] {
        CONNECTOR_FIELDS
    }
}

impl Model for PostgresDataSource {
    const TITLE: &'static str = "PostgreSQL data source";

    fn fields() -> &'static [FieldSpec] {
        DATA_SOURCE_FIELDS
    }
}

impl ToucanDataSource for PostgresDataSource {
    const BACKEND: &'static str = BACKEND;

    fn base(&self) -> &DataSourceBase {
        &self.base
    }
}

fn cell_at(row: &PgRow, index: usize) -> Cell {
    let Ok(raw) = row.try_get_raw(index) else {
        return Cell::Null;
    };
    if raw.is_null() {
        return Cell::Null;
    }
    let type_name = raw.type_info().name().to_string();

    let decoded = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index).map(Cell::Boolean),
        "INT2" => row.try_get::<i16, _>(index).map(|v| Cell::Integer(i64::from(v))),
        "INT4" => row.try_get::<i32, _>(index).map(|v| Cell::Integer(i64::from(v))),
        "INT8" => row.try_get::<i64, _>(index).map(Cell::Integer),
        "FLOAT4" => row.try_get::<f32, _>(index).map(|v| float_cell(f64::from(v))),
        "FLOAT8" => row.try_get::<f64, _>(index).map(float_cell),
        "NUMERIC" => row
            .try_get::<Decimal, _>(index)
            .map(|v| v.to_f64().map_or(Cell::Null, float_cell)),
        "UUID" => row
            .try_get::<Uuid, _>(index)
            .map(|v| Cell::String(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(Cell::Timestamp),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|v| Cell::Timestamp(v.and_utc())),
        "DATE" => row.try_get::<chrono::NaiveDate, _>(index).map(date_cell),
        "JSON" | "JSONB" => row
            .try_get::<JsonValue, _>(index)
            .map(|v| Cell::String(v.to_string())),
        "BYTEA" => row.try_get::<Vec<u8>, _>(index).map(|bytes| binary_cell(&bytes)),
        _ => row.try_get::<String, _>(index).map(Cell::String),
    };
    decoded.unwrap_or_else(|_| sql::fallback_cell(row, index))
}

#[async_trait]
impl ToucanConnector for PostgresConnector {
    const BACKEND: &'static str = BACKEND;

    type DataSource = PostgresDataSource;
    type Connection = PgConnection;

    fn base(&self) -> &ConnectorBase {
        &self.base
    }

    fn connect_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.connect_timeout)
    }

    fn connection_params(&self, data_source: &PostgresDataSource) -> ConnectionParams {
        ConnectionParams::new()
            .with("host", Some(&self.host))
            .with("user", Some(&self.user))
            .with("password", self.password.as_ref())
            .with("dbname", Some(&data_source.database))
            .with("port", self.port)
            .with("connect_timeout", self.connect_timeout)
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<PgConnection, ConnectorError> {
        let host = params.text("host").unwrap_or_default();
        let port = params
            .integer("port")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);
        let dbname = params.text("dbname").unwrap_or_default();

        let mut options = PgConnectOptions::new()
            .host(host)
            .port(port)
            .username(params.text("user").unwrap_or_default())
            .database(dbname)
            .application_name("toucan-connectors");
        if let Some(password) = params.secret("password") {
            options = options.password(password.expose_secret());
        }

        debug!(backend = BACKEND, host, port, dbname, "Connecting");
        options
            .connect()
            .await
            .map_err(|e| sql::connect_error(BACKEND, format!("{host}:{port}/{dbname}"), e))
    }

    async fn execute(
        &self,
        connection: &mut PgConnection,
        data_source: &PostgresDataSource,
    ) -> Result<Table, ConnectorError> {
        let query = data_source.query.as_str();
        let statement = connection
            .prepare(query)
            .await
            .map_err(|e| ConnectorError::query(BACKEND, "Failed to prepare query", e))?;
        let columns: Vec<Column> = statement
            .columns()
            .iter()
            .map(|c| Column::new(c.name(), sql::exchange_type_for(c.type_info().name())))
            .collect();

        let rows = sqlx::query(query)
            .fetch_all(&mut *connection)
            .await
            .map_err(|e| ConnectorError::query(BACKEND, "Failed to execute query", e))?;

        let cells = rows
            .iter()
            .map(|row| (0..row.len()).map(|index| cell_at(row, index)).collect())
            .collect();
        sql::build_table(BACKEND, columns, cells)
    }

    async fn release(&self, connection: PgConnection) -> Result<(), ConnectorError> {
        connection
            .close()
            .await
            .map_err(|e| ConnectorError::connection(BACKEND, "Failed to close connection", e))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::security::SECRET_MASK;
    use crate::validation::ViolationKind;
    use serde_json::json;

    fn data_source() -> PostgresDataSource {
        PostgresDataSource::validate(&json!({
            "domain": "orders",
            "name": "warehouse",
            "database": "sales",
            "query": "SELECT * FROM orders",
        }))
        .unwrap()
    }

    #[test]
    fn test_connection_params_full() {
        let connector = PostgresConnector::validate(&json!({
            "name": "warehouse",
            "host": "db.internal",
            "port": 6543,
            "user": "reader",
            "password": "s3cr3t",
            "connect_timeout": 5,
        }))
        .unwrap();

        let params = ToucanConnector::connection_params(&connector, &data_source());
        assert_eq!(
            params.keys(),
            vec!["host", "user", "password", "dbname", "port", "connect_timeout"]
        );
        assert_eq!(params.text("dbname"), Some("sales"));
        assert_eq!(params.integer("port"), Some(6543));
        assert_eq!(params.secret("password").unwrap().expose_secret(), "s3cr3t");
        assert_eq!(
            ToucanConnector::connect_timeout(&connector),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_connection_params_drop_unset_fields() {
        let connector = PostgresConnector::validate(&json!({
            "name": "warehouse",
            "host": "localhost",
            "user": "reader",
        }))
        .unwrap();

        let params = ToucanConnector::connection_params(&connector, &data_source());
        assert_eq!(params.keys(), vec!["host", "user", "dbname"]);
        assert!(ToucanConnector::connect_timeout(&connector).is_none());
    }

    #[test]
    fn test_port_out_of_range() {
        let error = PostgresConnector::validate(&json!({
            "name": "warehouse",
            "host": "localhost",
            "user": "reader",
            "port": 70000,
        }))
        .unwrap_err();
        assert!(error.contains("port", ViolationKind::Maximum));
    }

    #[test]
    fn test_password_never_in_debug() {
        let connector = PostgresConnector::validate(&json!({
            "name": "warehouse",
            "host": "localhost",
            "user": "reader",
            "password": "hunter2",
        }))
        .unwrap();

        let debug = format!("{connector:?}");
        assert!(!debug.contains("hunter2"));

        let params = ToucanConnector::connection_params(&connector, &data_source());
        let debug = format!("{params:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains(SECRET_MASK));
    }

    #[test]
    fn test_database_is_required() {
        let error = PostgresDataSource::validate(&json!({
            "domain": "orders",
            "name": "warehouse",
            "query": "SELECT 1",
        }))
        .unwrap_err();
        assert!(error.contains("database", ViolationKind::Missing));
    }
}
