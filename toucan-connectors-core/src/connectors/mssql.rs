//! Microsoft SQL Server connector.
//!
//! Uses SQL Server authentication over TDS 7.3. When a data source leaves
//! `database` unset the server picks the login's default database.
//!
//! # Example
//! ```rust,no_run
//! use serde_json::json;
//! use toucan_connectors_core::connector::ToucanConnector;
//! use toucan_connectors_core::connectors::mssql::{MssqlConnector, MssqlDataSource};
//! use toucan_connectors_core::schema::Model;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = MssqlConnector::validate(&json!({
//!     "name": "erp",
//!     "host": "db.example.com",
//!     "user": "alice",
//!     "password": "secret",
//! }))?;
//! let data_source = MssqlDataSource::validate(&json!({
//!     "domain": "invoices",
//!     "name": "erp",
//!     "query": "SELECT TOP 10 * FROM invoices",
//! }))?;
//!
//! let table = connector.retrieve(&data_source).await?;
//! # Ok(())
//! # }
//! ```

use super::{binary_cell, date_cell, float_cell};
use crate::connector::base::{
    backend_type_field, connector_name_field, data_source_name_field, domain_field,
    live_data_field, load_field,
};
use crate::connector::{
    ConnectorBase, DataSourceBase, ToucanConnector, ToucanDataSource, timeout_from_secs,
};
use crate::error::ConnectorError;
use crate::models::{Cell, Column, ExchangeType, Table};
use crate::params::ConnectionParams;
use crate::schema::{Constraint, FieldSpec, Model, Widget};
use crate::security::Secret;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tiberius::{AuthMethod, Client, ColumnData, ColumnType, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

const BACKEND: &str = "MSSQL";
const DEFAULT_PORT: u16 = 1433;

/// Server error number for a rejected login.
const LOGIN_FAILED: u32 = 18456;

type MssqlClient = Client<Compat<TcpStream>>;

/// Open client plus the row shape requested by the connection parameters.
pub struct MssqlConnection {
    client: MssqlClient,
    as_dict: bool,
}

/// Connection to a SQL Server instance.
#[derive(Debug, Clone, Deserialize)]
pub struct MssqlConnector {
    /// Shared connector fields
    #[serde(flatten)]
    pub base: ConnectorBase,
    /// Server host name or address
    pub host: String,
    /// Listening port, 1433 when unset
    pub port: Option<u16>,
    /// Login user
    pub user: String,
    /// Login password
    pub password: Option<Secret>,
    /// Login timeout in seconds
    pub connect_timeout: Option<u64>,
}

/// Query against a SQL Server database.
#[derive(Debug, Clone, Deserialize)]
pub struct MssqlDataSource {
    /// Shared data-source fields
    #[serde(flatten)]
    pub base: DataSourceBase,
    /// Database to query, the login's default when unset
    pub database: Option<String>,
    /// SQL query
    pub query: String,
}

const CONNECTOR_FIELDS: &[FieldSpec] = &[
    connector_name_field(),
    backend_type_field(&[Constraint::OneOf(&["MSSQL"])]),
    FieldSpec::string("host")
        .required()
        .description(
            "The domain name (preferred option as more dynamic) or the hardcoded IP address of your database server",
        )
        .constraints(&[Constraint::MinLength(1)]),
    FieldSpec::integer("port")
        .description("The listening port of your database server")
        .constraints(&[Constraint::Minimum(1), Constraint::Maximum(65535)]),
    FieldSpec::string("user")
        .required()
        .description("Your login username"),
    FieldSpec::secret("password").description("Your login password"),
    FieldSpec::integer("connect_timeout")
        .title("Connection timeout")
        .description(
            "Maximum number of seconds to wait for the server to respond while connecting",
        )
        .constraints(&[Constraint::Minimum(1)]),
];

const DATA_SOURCE_FIELDS: &[FieldSpec] = &[
    domain_field(),
    data_source_name_field(),
    backend_type_field(&[Constraint::OneOf(&["MSSQL"])]),
    load_field(),
    live_data_field(),
    FieldSpec::string("database").description(
        "The name of the database you want to query. By default SQL Server selects the user's default database",
    ),
    FieldSpec::string("query")
        .required()
        .description("You can write your SQL query here")
        .widget(Widget::Sql)
        .constraints(&[Constraint::MinLength(1)]),
];

impl Model for MssqlConnector {
    const TITLE: &'static str = "Microsoft SQL Server connector";
    const DESCRIPTION: &'static str = "Import data from Microsoft SQL Server.";

    fn fields() -> &'static [FieldSpec] {
        CONNECTOR_FIELDS
    }
}

impl Model for MssqlDataSource {
    const TITLE: &'static str = "Microsoft SQL Server data source";

    fn fields() -> &'static [FieldSpec] {
        DATA_SOURCE_FIELDS
    }
}

impl ToucanDataSource for MssqlDataSource {
    const BACKEND: &'static str = BACKEND;

    fn base(&self) -> &DataSourceBase {
        &self.base
    }
}

fn exchange_type_for(column_type: ColumnType) -> ExchangeType {
    match column_type {
        ColumnType::Bit | ColumnType::Bitn => ExchangeType::Boolean,
        ColumnType::Int1
        | ColumnType::Int2
        | ColumnType::Int4
        | ColumnType::Int8
        | ColumnType::Intn
        | ColumnType::Float4
        | ColumnType::Float8
        | ColumnType::Floatn
        | ColumnType::Money
        | ColumnType::Money4
        | ColumnType::Decimaln
        | ColumnType::Numericn => ExchangeType::Number,
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2
        | ColumnType::DatetimeOffsetn
        | ColumnType::Daten => ExchangeType::Timestamp,
        ColumnType::Null => ExchangeType::Null,
        _ => ExchangeType::String,
    }
}

#[allow(clippy::cast_precision_loss)]
fn numeric_cell(value: i128, scale: u8) -> Cell {
    float_cell(value as f64 / 10_f64.powi(i32::from(scale)))
}

/// Converts one TDS value.
fn cell_from(data: ColumnData<'static>) -> Result<Cell, tiberius::error::Error> {
    let cell = match &data {
        ColumnData::U8(v) => v.map_or(Cell::Null, |v| Cell::Integer(i64::from(v))),
        ColumnData::I16(v) => v.map_or(Cell::Null, |v| Cell::Integer(i64::from(v))),
        ColumnData::I32(v) => v.map_or(Cell::Null, |v| Cell::Integer(i64::from(v))),
        ColumnData::I64(v) => v.map_or(Cell::Null, Cell::Integer),
        ColumnData::F32(v) => v.map_or(Cell::Null, |v| float_cell(f64::from(v))),
        ColumnData::F64(v) => v.map_or(Cell::Null, float_cell),
        ColumnData::Bit(v) => v.map_or(Cell::Null, Cell::Boolean),
        ColumnData::String(v) => v
            .as_ref()
            .map_or(Cell::Null, |s| Cell::String(s.to_string())),
        ColumnData::Guid(v) => v.map_or(Cell::Null, |g| Cell::String(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map_or(Cell::Null, |b| binary_cell(b)),
        ColumnData::Numeric(v) => v.map_or(Cell::Null, |n| numeric_cell(n.value(), n.scale())),
        ColumnData::Xml(v) => v
            .as_ref()
            .map_or(Cell::Null, |x| Cell::String((**x).clone().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            chrono::NaiveDateTime::from_sql(&data)?
                .map_or(Cell::Null, |v| Cell::Timestamp(v.and_utc()))
        }
        ColumnData::DateTimeOffset(_) => {
            chrono::DateTime::<chrono::Utc>::from_sql(&data)?.map_or(Cell::Null, Cell::Timestamp)
        }
        ColumnData::Date(_) => chrono::NaiveDate::from_sql(&data)?.map_or(Cell::Null, date_cell),
        ColumnData::Time(_) => chrono::NaiveTime::from_sql(&data)?
            .map_or(Cell::Null, |v| Cell::String(v.to_string())),
    };
    Ok(cell)
}

/// Column name as exposed in the result.
///
/// With `as_dict` the server's names are used; otherwise, and for unnamed
/// expressions, columns are named by position.
fn column_name(name: &str, index: usize, as_dict: bool) -> String {
    if as_dict && !name.is_empty() {
        name.to_string()
    } else {
        index.to_string()
    }
}

/// Whether rows are keyed by column name. Dictionary mode unless the
/// parameters turn it off.
fn dictionary_mode(params: &ConnectionParams) -> bool {
    params.flag("as_dict").unwrap_or(true)
}

fn connect_error(context: String, error: tiberius::error::Error) -> ConnectorError {
    match &error {
        tiberius::error::Error::Server(token) if token.code() == LOGIN_FAILED => {
            ConnectorError::authentication(BACKEND, context, error)
        }
        _ => ConnectorError::connection(BACKEND, context, error),
    }
}

#[async_trait]
impl ToucanConnector for MssqlConnector {
    const BACKEND: &'static str = BACKEND;

    type DataSource = MssqlDataSource;
    type Connection = MssqlConnection;

    fn base(&self) -> &ConnectorBase {
        &self.base
    }

    fn connect_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.connect_timeout)
    }

    fn connection_params(&self, data_source: &MssqlDataSource) -> ConnectionParams {
        ConnectionParams::new()
            .with("server", Some(&self.host))
            .with("user", Some(&self.user))
            .with("password", self.password.as_ref())
            .with("database", data_source.database.as_ref())
            .with("port", self.port)
            .with("login_timeout", self.connect_timeout)
            .with("as_dict", Some(true))
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<MssqlConnection, ConnectorError> {
        let server = params.text("server").unwrap_or_default();
        let port = params
            .integer("port")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);

        let mut config = Config::new();
        config.host(server);
        config.port(port);
        config.authentication(AuthMethod::sql_server(
            params.text("user").unwrap_or_default(),
            params.secret("password").map_or("", Secret::expose_secret),
        ));
        if let Some(database) = params.text("database") {
            config.database(database);
        }
        config.trust_cert();

        let context = format!("{server}:{port}");
        debug!(backend = BACKEND, server, port, "Connecting");

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| ConnectorError::connection(BACKEND, context.clone(), e))?;
        tcp.set_nodelay(true)
            .map_err(|e| ConnectorError::connection(BACKEND, context.clone(), e))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| connect_error(context, e))?;
        Ok(MssqlConnection {
            client,
            as_dict: dictionary_mode(params),
        })
    }

    async fn execute(
        &self,
        connection: &mut MssqlConnection,
        data_source: &MssqlDataSource,
    ) -> Result<Table, ConnectorError> {
        let as_dict = connection.as_dict;
        let mut stream = connection
            .client
            .query(data_source.query.as_str(), &[])
            .await
            .map_err(|e| ConnectorError::query(BACKEND, "Failed to execute query", e))?;

        let columns: Vec<Column> = stream
            .columns()
            .await
            .map_err(|e| ConnectorError::query(BACKEND, "Failed to read result metadata", e))?
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(index, column)| {
                Column::new(
                    column_name(column.name(), index, as_dict),
                    exchange_type_for(column.column_type()),
                )
            })
            .collect();

        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| ConnectorError::query(BACKEND, "Failed to read result rows", e))?;

        let mut cells = Vec::with_capacity(rows.len());
        for row in rows {
            let values = row
                .into_iter()
                .map(cell_from)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ConnectorError::query(BACKEND, "Failed to convert result value", e))?;
            cells.push(values);
        }

        Table::with_observed_types(columns, cells)
            .map_err(|e| ConnectorError::query(BACKEND, "Result rows do not match result columns", e))
    }

    async fn release(&self, connection: MssqlConnection) -> Result<(), ConnectorError> {
        connection
            .client
            .close()
            .await
            .map_err(|e| ConnectorError::connection(BACKEND, "Failed to close connection", e))
    }
}
