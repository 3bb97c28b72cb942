//! Object-safe companions of the connector traits.
//!
//! Every [`ToucanConnector`] is a [`DynConnector`] and every
//! [`ToucanDataSource`] is an [`AnyDataSource`] through blanket impls, so the
//! registry and catalog can hold `Arc<dyn DynConnector>` and
//! `Box<dyn AnyDataSource>` side by side for different backends.

use super::{ToucanConnector, ToucanDataSource};
use crate::error::{Result, TypeConsistencyError};
use crate::models::{DataSlice, Table};
use crate::params::ConnectionParams;
use async_trait::async_trait;
use std::any::Any;
use std::fmt::Debug;

/// Data source of any backend.
pub trait AnyDataSource: Debug + Send + Sync + 'static {
    /// Identifier of the backend this data source runs on.
    fn backend(&self) -> &'static str;

    /// Name of the resulting dataset.
    fn domain(&self) -> &str;

    /// Name of the connector this data source runs against.
    fn connector_name(&self) -> &str;

    /// Whether the platform preloads the dataset.
    fn load(&self) -> bool;

    /// Whether the dataset is fetched on demand.
    fn live_data(&self) -> bool;

    /// Rust type name of the concrete record, used in error messages.
    fn type_name(&self) -> &'static str;

    /// Access to the concrete record.
    fn as_any(&self) -> &dyn Any;
}

impl<T: ToucanDataSource> AnyDataSource for T {
    fn backend(&self) -> &'static str {
        T::BACKEND
    }

    fn domain(&self) -> &str {
        &self.base().domain
    }

    fn connector_name(&self) -> &str {
        &self.base().name
    }

    fn load(&self) -> bool {
        self.base().load
    }

    fn live_data(&self) -> bool {
        self.base().live_data
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Connector of any backend.
///
/// Calls check the concrete data-source type before any I/O and fail with
/// [`TypeConsistencyError`] on mismatch.
#[async_trait]
pub trait DynConnector: Debug + Send + Sync {
    /// Stable backend identifier.
    fn backend(&self) -> &'static str;

    /// Name of the saved connection.
    fn name(&self) -> &str;

    /// Normalized driver parameters for `data_source`.
    ///
    /// # Errors
    /// Returns a type consistency error for a data source of another backend.
    fn connection_params(&self, data_source: &dyn AnyDataSource) -> Result<ConnectionParams>;

    /// See [`ToucanConnector::retrieve`].
    ///
    /// # Errors
    /// Returns a type consistency error for a data source of another
    /// backend, otherwise the errors of the typed call.
    async fn retrieve(&self, data_source: &dyn AnyDataSource) -> Result<Table>;

    /// See [`ToucanConnector::retrieve_slice`].
    ///
    /// # Errors
    /// Same as [`DynConnector::retrieve`].
    async fn retrieve_slice(
        &self,
        data_source: &dyn AnyDataSource,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<DataSlice>;
}

fn downcast<C: ToucanConnector>(
    data_source: &dyn AnyDataSource,
) -> std::result::Result<&C::DataSource, TypeConsistencyError> {
    data_source
        .as_any()
        .downcast_ref::<C::DataSource>()
        .ok_or_else(|| TypeConsistencyError {
            backend: C::BACKEND,
            expected: std::any::type_name::<C::DataSource>(),
            found: data_source.type_name(),
        })
}

#[async_trait]
impl<C: ToucanConnector> DynConnector for C {
    fn backend(&self) -> &'static str {
        C::BACKEND
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    fn connection_params(&self, data_source: &dyn AnyDataSource) -> Result<ConnectionParams> {
        let data_source = downcast::<C>(data_source)?;
        Ok(ToucanConnector::connection_params(self, data_source))
    }

    async fn retrieve(&self, data_source: &dyn AnyDataSource) -> Result<Table> {
        let data_source = downcast::<C>(data_source)?;
        ToucanConnector::retrieve(self, data_source).await
    }

    async fn retrieve_slice(
        &self,
        data_source: &dyn AnyDataSource,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<DataSlice> {
        let data_source = downcast::<C>(data_source)?;
        ToucanConnector::retrieve_slice(self, data_source, offset, limit).await
    }
}
