//! MySQL connector.
//!
//! A data source either runs a query or reads a whole table. When both are
//! set the query wins.

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
use crate::schema::{Constraint, DefaultValue, FieldSpec, Model, ModelRule, Widget};
use crate::security::Secret;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::types::{Decimal, JsonValue};
use sqlx::{Column as _, ConnectOptions, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use std::borrow::Cow;
use std::time::Duration;
use tracing::debug;

const BACKEND: &str = "MySQL";
const DEFAULT_PORT: u16 = 3306;

/// Connection to a MySQL server.
#[derive(Debug, Clone, Deserialize)]
pub struct MySqlConnector {
    /// Shared connector fields
    #[serde(flatten)]
    pub base: ConnectorBase,
    /// Server host name or address
    pub host: String,
    /// Server port, 3306 when unset
    pub port: Option<u16>,
    /// Login user
    pub user: String,
    /// Login password
    pub password: Option<Secret>,
    /// Connection character set
    pub charset: String,
    /// Connect timeout in seconds
    pub connect_timeout: Option<u64>,
}

/// Query or table read against a MySQL database.
#[derive(Debug, Clone, Deserialize)]
pub struct MySqlDataSource {
    /// Shared data-source fields
    #[serde(flatten)]
    pub base: DataSourceBase,
    /// Database the query runs in
    pub database: String,
    /// SQL query
    pub query: Option<String>,
    /// Table read in full when no query is set
    pub table: Option<String>,
}

impl MySqlDataSource {
    /// Statement run for this data source.
    pub fn statement(&self) -> Option<Cow<'_, str>> {
        match (&self.query, &self.table) {
            (Some(query), _) => Some(Cow::Borrowed(query.as_str())),
            (None, Some(table)) => Some(Cow::Owned(format!("SELECT * FROM {}", quote_identifier(table)))),
            (None, None) => None,
        }
    }
}

/// Backtick-quotes an identifier, doubling embedded backticks.
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

const CONNECTOR_FIELDS: &[FieldSpec] = &[
    connector_name_field(),
    backend_type_field(&[Constraint::OneOf(&["MySQL"])]),
    FieldSpec::string("host")
        .required()
        .description("Server host name or IP address")
        .constraints(&[Constraint::MinLength(1)]),
    FieldSpec::integer("port")
        .description("Server port")
        .constraints(&[Constraint::Minimum(1), Constraint::Maximum(65535)]),
    FieldSpec::string("user").required(),
    FieldSpec::secret("password"),
    FieldSpec::string("charset")
        .default(DefaultValue::Str("utf8mb4"))
        .description("Character set of the connection"),
    FieldSpec::integer("connect_timeout")
        .title("Connection timeout")
        .description("Seconds to wait while opening a connection")
        .constraints(&[Constraint::Minimum(1)]),
];

const DATA_SOURCE_FIELDS: &[FieldSpec] = &[
    domain_field(),
    data_source_name_field(),
    backend_type_field(&[Constraint::OneOf(&["MySQL"])]),
    load_field(),
    live_data_field(),
    FieldSpec::string("database")
        .required()
        .description("Name of the database")
        .constraints(&[Constraint::MinLength(1)]),
    FieldSpec::string("query")
        .title("SQL query")
        .widget(Widget::Sql)
        .constraints(&[Constraint::MinLength(1)]),
    FieldSpec::string("table")
        .description("Table read in full when no query is set")
        .constraints(&[Constraint::MinLength(1)]),
];

const DATA_SOURCE_RULES: &[ModelRule] = &[ModelRule::AtLeastOneOf(&["query", "table"])];

impl Model for MySqlConnector {
    const TITLE: &'static str = "MySQL connector";

    fn fields() -> &'static [FieldSpec] {
        CONNECTOR_FIELDS
    }
}

impl Model for MySqlDataSource {
    const TITLE: &'static str = "MySQL data source";

    fn fields() -> &'static [FieldSpec] {
        DATA_SOURCE_FIELDS
    }

    fn rules() -> &'static [ModelRule] {
        DATA_SOURCE_RULES
    }
}

impl ToucanDataSource for MySqlDataSource {
    const BACKEND: &'static str = BACKEND;

    fn base(&self) -> &DataSourceBase {
        &self.base
    }
}

#[allow(clippy::cast_precision_loss)]
fn unsigned_cell(value: u64) -> Cell {
    i64::try_from(value).map_or(Cell::Float(value as f64), Cell::Integer)
}

fn cell_at(row: &MySqlRow, index: usize) -> Cell {
    let Ok(raw) = row.try_get_raw(index) else {
        return Cell::Null;
    };
    if raw.is_null() {
        return Cell::Null;
    }
    let type_name = raw.type_info().name().to_string();

    if type_name.contains("UNSIGNED") {
        return row
            .try_get::<u64, _>(index)
            .map_or_else(|_| sql::fallback_cell(row, index), unsigned_cell);
    }

    let decoded = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Cell::Boolean),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(index).map(Cell::Integer)
        }
        "FLOAT" => row.try_get::<f32, _>(index).map(|v| float_cell(f64::from(v))),
        "DOUBLE" => row.try_get::<f64, _>(index).map(float_cell),
        "DECIMAL" => row
            .try_get::<Decimal, _>(index)
            .map(|v| v.to_f64().map_or(Cell::Null, float_cell)),
        "DATETIME" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|v| Cell::Timestamp(v.and_utc())),
        "TIMESTAMP" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(Cell::Timestamp),
        "DATE" => row.try_get::<chrono::NaiveDate, _>(index).map(date_cell),
        "JSON" => row
            .try_get::<JsonValue, _>(index)
            .map(|v| Cell::String(v.to_string())),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| binary_cell(&bytes)),
        _ => row.try_get::<String, _>(index).map(Cell::String),
    };
    decoded.unwrap_or_else(|_| sql::fallback_cell(row, index))
}

#[async_trait]
impl ToucanConnector for MySqlConnector {
    const BACKEND: &'static str = BACKEND;

    type DataSource = MySqlDataSource;
    type Connection = MySqlConnection;

    fn base(&self) -> &ConnectorBase {
        &self.base
    }

    fn connect_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.connect_timeout)
    }

    fn connection_params(&self, data_source: &MySqlDataSource) -> ConnectionParams {
        ConnectionParams::new()
            .with("host", Some(&self.host))
            .with("user", Some(&self.user))
            .with("password", self.password.as_ref())
            .with("database", Some(&data_source.database))
            .with("port", self.port)
            .with("charset", Some(&self.charset))
            .with("connect_timeout", self.connect_timeout)
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<MySqlConnection, ConnectorError> {
        let host = params.text("host").unwrap_or_default();
        let port = params
            .integer("port")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);
        let database = params.text("database").unwrap_or_default();

        let mut options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(params.text("user").unwrap_or_default())
            .database(database)
            .charset(params.text("charset").unwrap_or("utf8mb4"));
        if let Some(password) = params.secret("password") {
            options = options.password(password.expose_secret());
        }

        debug!(backend = BACKEND, host, port, database, "Connecting");
        options
            .connect()
            .await
            .map_err(|e| sql::connect_error(BACKEND, format!("{host}:{port}/{database}"), e))
    }

    async fn execute(
        &self,
        connection: &mut MySqlConnection,
        data_source: &MySqlDataSource,
    ) -> Result<Table, ConnectorError> {
        let statement_text = data_source
            .statement()
            .ok_or_else(|| ConnectorError::query_message(BACKEND, "Neither query nor table is set"))?;
        let query = statement_text.as_ref();

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

    async fn release(&self, connection: MySqlConnection) -> Result<(), ConnectorError> {
        connection
            .close()
            .await
            .map_err(|e| ConnectorError::connection(BACKEND, "Failed to close connection", e))
    }
}
