//! Connector contract and backend adapters for Toucan data sources.
//!
//! A connector describes how to reach a backend, a data source describes
//! one query against it. Both are validated from JSON configuration against
//! declarative field schemas before any I/O happens, and a validated pair
//! retrieves a [`Table`] whose columns carry exchange types.
//!
//! # Security Guarantees
//! - Passwords are held in [`security::Secret`], zeroized on drop and
//!   masked in `Debug`, `Display`, serialization and validation reports
//! - Connection errors never include credentials
//! - Every retrieval opens and closes its own connection
//!
//! # Architecture
//! - [`schema`] and [`validation`]: field declarations and the validator
//! - [`connector`]: the `ToucanConnector` / `ToucanDataSource` contract
//! - [`connectors`]: one module per backend, each behind a cargo feature
//! - [`registry`] and [`catalog`]: backend lookup and saved configurations

pub mod catalog;
pub mod connector;
pub mod connectors;
pub mod error;
pub mod logging;
pub mod models;
pub mod params;
pub mod registry;
pub mod schema;
pub mod security;
pub mod validation;

// Re-export commonly used types
pub use catalog::Catalog;
pub use connector::{AnyDataSource, DynConnector, Phase, ToucanConnector, ToucanDataSource};
pub use error::{ConnectorError, ConnectorsError, Result, TypeConsistencyError};
pub use models::{Cell, Column, DataSlice, ExchangeType, Table};
pub use params::{ConnectionParams, ParamValue};
pub use registry::Registry;
pub use schema::{FieldSpec, Model, ModelSchema};
pub use security::Secret;
pub use validation::{FieldViolation, ValidationError, ViolationKind};
