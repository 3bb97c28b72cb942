//! Helpers shared by the sqlx-based connectors.

use super::{binary_cell, float_cell};
use crate::error::ConnectorError;
use crate::models::{Cell, Column, ExchangeType, Table};
use sqlx::{ColumnIndex, Decode, Row, Type};

/// Exchange type of a native column type name, `Null` when unknown.
///
/// Names are matched case-insensitively on their first word, so
/// `VARCHAR(255)` and `INT UNSIGNED` are recognized.
pub(crate) fn exchange_type_for(type_name: &str) -> ExchangeType {
    let upper = type_name.to_ascii_uppercase();
    let base = upper.split(['(', ' ']).next().unwrap_or_default();
    match base {
        "BOOL" | "BOOLEAN" => ExchangeType::Boolean,
        "INT2" | "INT4" | "INT8" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER"
        | "BIGINT" | "FLOAT4" | "FLOAT8" | "FLOAT" | "REAL" | "DOUBLE" | "NUMERIC"
        | "DECIMAL" | "OID" | "YEAR" => ExchangeType::Number,
        "DATE" | "DATETIME" | "TIMESTAMP" | "TIMESTAMPTZ" => ExchangeType::Timestamp,
        "" | "NULL" | "VOID" => ExchangeType::Null,
        _ => ExchangeType::String,
    }
}

/// Decodes a value whose native type is not handled explicitly, trying the
/// common representations in order.
pub(crate) fn fallback_cell<R>(row: &R, index: usize) -> Cell
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(Cell::Null, Cell::String);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(Cell::Null, Cell::Integer);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(Cell::Null, float_cell);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map_or(Cell::Null, Cell::Boolean);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map_or(Cell::Null, |bytes| binary_cell(&bytes));
    }

    Cell::Null
}

/// Assembles the result table, reconciling declared and observed types.
pub(crate) fn build_table(
    backend: &'static str,
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
) -> Result<Table, ConnectorError> {
    Table::with_observed_types(columns, rows)
        .map_err(|e| ConnectorError::query(backend, "Result rows do not match result columns", e))
}

/// Whether a driver error reports rejected credentials (SQLSTATE class 28).
pub(crate) fn is_auth_failure(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .is_some_and(|code| code.starts_with("28"))
}

/// Maps a connect failure to a connector error.
pub(crate) fn connect_error(
    backend: &'static str,
    context: String,
    error: sqlx::Error,
) -> ConnectorError {
    if is_auth_failure(&error) {
        ConnectorError::authentication(backend, context, error)
    } else {
        ConnectorError::connection(backend, context, error)
    }
}
