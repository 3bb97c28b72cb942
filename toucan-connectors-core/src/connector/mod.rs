//! The connector contract implemented by every backend.
//!
//! A backend supplies two validated records: a connector (how to connect)
//! implementing [`ToucanConnector`] and a data source (what to fetch)
//! implementing [`ToucanDataSource`]. The provided
//! [`ToucanConnector::retrieve`] drives the three backend stages `connect`,
//! `execute` and `release` for one call.
//!
//! # Module Structure
//! - `base`: fields shared by every connector and data source
//! - `lifecycle`: per-call phase tracking and the `retrieve` driver
//! - `dynamic`: object-safe companions used by the registry and catalog
//!
//! # Concurrency
//! Connectors are immutable and `Send + Sync`. Each call opens its own
//! connection and closes it before returning; nothing is pooled, shared or
//! cached between calls.

use crate::error::{ConnectorError, Result};
use crate::models::{DataSlice, Table};
use crate::params::ConnectionParams;
use crate::schema::Model;
use async_trait::async_trait;
use std::time::Duration;

pub mod base;
pub mod dynamic;
pub mod lifecycle;

pub use base::{ConnectorBase, DataSourceBase};
pub use dynamic::{AnyDataSource, DynConnector};
pub use lifecycle::Phase;

/// Query-level configuration of a backend.
///
/// A data source carries no credentials.
pub trait ToucanDataSource: Model + Clone {
    /// Identifier of the backend this data source runs on
    const BACKEND: &'static str;

    /// Shared data-source fields.
    fn base(&self) -> &DataSourceBase;
}

/// Connection-level configuration of a backend, plus its fetch stages.
///
/// # Security
/// - Secrets are held as [`crate::security::Secret`] and only exposed
///   when handed to the driver
/// - Error contexts never include credentials
#[async_trait]
pub trait ToucanConnector: Model {
    /// Stable backend identifier, e.g. `"MSSQL"`
    const BACKEND: &'static str;

    /// Data-source record accepted by this connector.
    type DataSource: ToucanDataSource;

    /// Live backend connection, owned by a single call.
    type Connection: Send;

    /// Shared connector fields.
    fn base(&self) -> &ConnectorBase;

    /// Upper bound of the connect step. `None` leaves it to the driver.
    fn connect_timeout(&self) -> Option<Duration> {
        None
    }

    /// Builds the parameter set handed to the driver. Unset optional
    /// fields are left out.
    fn connection_params(&self, data_source: &Self::DataSource) -> ConnectionParams;

    /// Opens a connection.
    ///
    /// # Errors
    /// Returns a connection or authentication error.
    async fn connect(&self, params: &ConnectionParams)
    -> std::result::Result<Self::Connection, ConnectorError>;

    /// Runs the data source's query on an open connection.
    ///
    /// # Errors
    /// Returns a query error if the backend rejects the query or its result
    /// cannot be converted.
    async fn execute(
        &self,
        connection: &mut Self::Connection,
        data_source: &Self::DataSource,
    ) -> std::result::Result<Table, ConnectorError>;

    /// Closes a connection.
    ///
    /// # Errors
    /// Returns the driver's close error; callers log it.
    async fn release(
        &self,
        connection: Self::Connection,
    ) -> std::result::Result<(), ConnectorError>;

    /// Fetches the data described by `data_source`.
    ///
    /// Opens a connection (bounded by [`ToucanConnector::connect_timeout`]),
    /// runs the query and always releases the connection once it exists.
    ///
    /// # Errors
    /// Returns [`crate::ConnectorsError::Connector`] for connect, timeout
    /// and query failures. No retry is attempted.
    async fn retrieve(&self, data_source: &Self::DataSource) -> Result<Table> {
        lifecycle::drive(self, data_source).await
    }

    /// Fetches `limit` rows starting at `offset`, with the total row count.
    ///
    /// # Errors
    /// Same as [`ToucanConnector::retrieve`].
    async fn retrieve_slice(
        &self,
        data_source: &Self::DataSource,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<DataSlice> {
        let table = lifecycle::drive(self, data_source).await?;
        Ok(table.into_slice(offset, limit))
    }
}

/// Seconds from a validated `connect_timeout` field.
pub(crate) fn timeout_from_secs(seconds: Option<u64>) -> Option<Duration> {
    seconds.map(Duration::from_secs)
}
