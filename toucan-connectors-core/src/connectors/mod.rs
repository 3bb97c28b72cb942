//! Backend connectors.
//!
//! Each backend lives behind its cargo feature:
//! - `mssql`: Microsoft SQL Server through tiberius
//! - `postgresql`, `mysql`, `sqlite`: through sqlx
//! - `mongodb`: through the official MongoDB driver
//!
//! Values outside the exchange set are rendered as strings: UUIDs and
//! object ids in their canonical text form, JSON as compact JSON text and
//! binary data as `base64:`-prefixed strings. Dates become midnight UTC
//! timestamps.

use crate::models::Cell;

#[cfg(any(feature = "postgresql", feature = "mysql", feature = "sqlite"))]
pub(crate) mod sql;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mongodb")]
pub mod mongodb;

/// Renders binary data as a `base64:`-prefixed string cell.
#[allow(dead_code)]
pub(crate) fn binary_cell(bytes: &[u8]) -> Cell {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Cell::String(format!("base64:{encoded}"))
}

/// Converts a date to a midnight UTC timestamp cell.
#[allow(dead_code)]
pub(crate) fn date_cell(date: chrono::NaiveDate) -> Cell {
    Cell::Timestamp(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Converts a float to a cell, mapping NaN and infinities to null.
#[allow(dead_code)]
pub(crate) fn float_cell(value: f64) -> Cell {
    if value.is_finite() {
        Cell::Float(value)
    } else {
        Cell::Null
    }
}
