//! Tabular result model shared by every connector.
//!
//! A [`Table`] holds ordered columns, each tagged with an [`ExchangeType`],
//! and ordered rows of [`Cell`] values. It serializes as
//! `{"columns":[{"name":..,"type":..}],"rows":[{column: value}]}` with
//! timestamps in RFC 3339.

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use thiserror::Error;

/// Value type exchanged with the analytics platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    /// Text, and any value without a closer exchange type
    String,
    /// Integer or floating point number
    Number,
    /// True or false
    Boolean,
    /// Point in time, serialized as RFC 3339
    Timestamp,
    /// Type unknown because every value is null
    Null,
}

impl ExchangeType {
    /// Common type of two observations of the same column.
    ///
    /// `Null` yields to anything; mismatching non-null types widen to
    /// `String`.
    #[must_use]
    pub fn unify(self, other: Self) -> Self {
        match (self, other) {
            (Self::Null, other) => other,
            (this, Self::Null) => this,
            (this, other) if this == other => this,
            _ => Self::String,
        }
    }
}

impl std::fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeType::String => write!(f, "string"),
            ExchangeType::Number => write!(f, "number"),
            ExchangeType::Boolean => write!(f, "boolean"),
            ExchangeType::Timestamp => write!(f, "timestamp"),
            ExchangeType::Null => write!(f, "null"),
        }
    }
}

/// Result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within a table
    pub name: String,
    /// Exchange type, serialized as `type`
    #[serde(rename = "type")]
    pub exchange_type: ExchangeType,
}

impl Column {
    /// Creates a column.
    pub fn new(name: impl Into<String>, exchange_type: ExchangeType) -> Self {
        Self {
            name: name.into(),
            exchange_type,
        }
    }
}

/// Single value of a result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    /// SQL `NULL` or a missing document field
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integral number
    Integer(i64),
    /// Floating point number, also used for decimals
    Float(f64),
    /// Text, or the rendering of a value outside the exchange types
    String(String),
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
}

impl Cell {
    /// Exchange type of this value.
    pub fn exchange_type(&self) -> ExchangeType {
        match self {
            Cell::Null => ExchangeType::Null,
            Cell::Boolean(_) => ExchangeType::Boolean,
            Cell::Integer(_) | Cell::Float(_) => ExchangeType::Number,
            Cell::String(_) => ExchangeType::String,
            Cell::Timestamp(_) => ExchangeType::Timestamp,
        }
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl From<Option<Cell>> for Cell {
    fn from(value: Option<Cell>) -> Self {
        value.unwrap_or(Cell::Null)
    }
}

/// A row whose width does not match the table's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Row {row} has {found} values, expected {expected}")]
pub struct RowWidthError {
    /// Position of the offending row
    pub row: usize,
    /// Column count of the table
    pub expected: usize,
    /// Value count of the row
    pub found: usize,
}

/// Ordered columns and rows returned by `retrieve`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Creates an empty table with the given columns.
    ///
    /// Rows serialize as name-keyed objects, so repeated column names are
    /// suffixed in result order: `a, a` becomes `a, a_1`.
    pub fn new(mut columns: Vec<Column>) -> Self {
        dedupe_names(&mut columns);
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table, checking that every row matches the column count.
    ///
    /// # Errors
    /// Returns the first row whose width differs from the column count.
    pub fn from_parts(
        columns: Vec<Column>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self, RowWidthError> {
        let mut table = Self::new(columns);
        table.rows.reserve(rows.len());
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Builds a table whose column types are reconciled with the values.
    ///
    /// A column declared `Null` (type unknown) takes the type of its values;
    /// a declared type contradicted by a value widens to `String`.
    ///
    /// # Errors
    /// Returns the first row whose width differs from the column count.
    pub fn with_observed_types(
        mut columns: Vec<Column>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self, RowWidthError> {
        for row in &rows {
            for (column, cell) in columns.iter_mut().zip(row) {
                column.exchange_type = column.exchange_type.unify(cell.exchange_type());
            }
        }
        Self::from_parts(columns, rows)
    }

    /// Builds a table from column names alone, typing each column from its
    /// values.
    ///
    /// # Errors
    /// Returns the first row whose width differs from the name count.
    pub fn infer(names: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, RowWidthError> {
        let columns = names
            .into_iter()
            .map(|name| Column::new(name, ExchangeType::Null))
            .collect();
        Self::with_observed_types(columns, rows)
    }

    /// Appends a row.
    ///
    /// # Errors
    /// Returns an error if the row width differs from the column count.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), RowWidthError> {
        if row.len() != self.columns.len() {
            return Err(RowWidthError {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Columns in result order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in result order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at position `index`.
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|cells| Row {
            columns: &self.columns,
            cells,
        })
    }

    /// Rows in result order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row {
            columns: &self.columns,
            cells,
        })
    }

    /// Window of `limit` rows starting at `offset`, with the total row count.
    ///
    /// `limit = None` keeps every row after `offset`.
    #[must_use]
    pub fn into_slice(self, offset: usize, limit: Option<usize>) -> DataSlice {
        let total_count = self.rows.len();
        let rows = self
            .rows
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        DataSlice {
            table: Table {
                columns: self.columns,
                rows,
            },
            total_count,
        }
    }
}

fn dedupe_names(columns: &mut [Column]) {
    let mut taken: HashSet<String> = HashSet::with_capacity(columns.len());
    for column in columns.iter_mut() {
        if taken.insert(column.name.clone()) {
            continue;
        }
        let mut suffix = 1;
        let mut candidate = format!("{}_{suffix}", column.name);
        while taken.contains(&candidate) {
            suffix += 1;
            candidate = format!("{}_{suffix}", column.name);
        }
        taken.insert(candidate.clone());
        column.name = candidate;
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<Row<'_>> = self.rows().collect();
        let mut state = serializer.serialize_struct("Table", 2)?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("rows", &rows)?;
        state.end()
    }
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [Column],
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    /// Value of the column named `name`.
    pub fn get(&self, name: &str) -> Option<&'a Cell> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .and_then(|index| self.cells.get(index))
    }

    /// Values in column order.
    pub fn cells(&self) -> &'a [Cell] {
        self.cells
    }

    /// `(column name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Cell)> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(self.cells.iter())
    }
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, cell) in self.iter() {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

/// Window of a result table plus the row count of the full result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSlice {
    /// Rows inside the requested window
    pub table: Table,
    /// Row count of the full result
    pub total_count: usize,
}
