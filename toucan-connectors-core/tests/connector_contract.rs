//! Fetch contract tests against an in-process connector.
//!
//! This test suite covers:
//! - Connection parameter hand-off and release on every path
//! - Type consistency checks before any I/O
//! - Connect timeouts
//! - Concurrent calls on one connector
//! - Slicing

#![allow(clippy::unwrap_used, clippy::panic)]

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use toucan_connectors_core::connector::base::{
    backend_type_field, connector_name_field, data_source_name_field, domain_field,
    live_data_field, load_field,
};
use toucan_connectors_core::connector::{ConnectorBase, DataSourceBase};
use toucan_connectors_core::schema::{Constraint, DefaultValue, FieldSpec};
use toucan_connectors_core::{
    AnyDataSource, Cell, Column, ConnectionParams, ConnectorError, ConnectorsError, DynConnector,
    ExchangeType, Model, Table, ToucanConnector, ToucanDataSource,
};

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    releases: AtomicUsize,
    open: AtomicUsize,
    max_open: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct CountingConnector {
    #[serde(flatten)]
    base: ConnectorBase,
    fail_connect: bool,
    fail_query: bool,
    connect_delay_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    #[serde(skip)]
    counters: Arc<Counters>,
}

#[derive(Debug, Clone, Deserialize)]
struct CountingDataSource {
    #[serde(flatten)]
    base: DataSourceBase,
    rows: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct OtherDataSource {
    #[serde(flatten)]
    base: DataSourceBase,
}

const CONNECTOR_FIELDS: &[FieldSpec] = &[
    connector_name_field(),
    backend_type_field(&[Constraint::OneOf(&["Counting"])]),
    FieldSpec::boolean("fail_connect").default(DefaultValue::Bool(false)),
    FieldSpec::boolean("fail_query").default(DefaultValue::Bool(false)),
    FieldSpec::integer("connect_delay_ms"),
    FieldSpec::integer("connect_timeout_ms"),
];

const DATA_SOURCE_FIELDS: &[FieldSpec] = &[
    domain_field(),
    data_source_name_field(),
    backend_type_field(&[Constraint::OneOf(&["Counting"])]),
    load_field(),
    live_data_field(),
    FieldSpec::integer("rows")
        .required()
        .constraints(&[Constraint::Minimum(0)]),
];

const OTHER_FIELDS: &[FieldSpec] = &[
    domain_field(),
    data_source_name_field(),
    backend_type_field(&[Constraint::OneOf(&["Other"])]),
    load_field(),
    live_data_field(),
];

impl Model for CountingConnector {
    const TITLE: &'static str = "Counting connector";

    fn fields() -> &'static [FieldSpec] {
        CONNECTOR_FIELDS
    }
}

impl Model for CountingDataSource {
    const TITLE: &'static str = "Counting data source";

    fn fields() -> &'static [FieldSpec] {
        DATA_SOURCE_FIELDS
    }
}

impl Model for OtherDataSource {
    const TITLE: &'static str = "Other data source";

    fn fields() -> &'static [FieldSpec] {
        OTHER_FIELDS
    }
}

impl ToucanDataSource for CountingDataSource {
    const BACKEND: &'static str = "Counting";

    fn base(&self) -> &DataSourceBase {
        &self.base
    }
}

impl ToucanDataSource for OtherDataSource {
    const BACKEND: &'static str = "Other";

    fn base(&self) -> &DataSourceBase {
        &self.base
    }
}

#[derive(Debug)]
struct CountingConnection {
    rows: i64,
}

#[async_trait]
impl ToucanConnector for CountingConnector {
    const BACKEND: &'static str = "Counting";

    type DataSource = CountingDataSource;
    type Connection = CountingConnection;

    fn base(&self) -> &ConnectorBase {
        &self.base
    }

    fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    fn connection_params(&self, data_source: &CountingDataSource) -> ConnectionParams {
        ConnectionParams::new()
            .with("name", Some(&self.base.name))
            .with("rows", Some(data_source.rows))
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<CountingConnection, ConnectorError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(ConnectorError::connection(
                "Counting",
                "counting.invalid:0",
                "connection refused",
            ));
        }
        let open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_open.fetch_max(open, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay_ms {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(CountingConnection {
            rows: params.integer("rows").unwrap_or_default(),
        })
    }

    async fn execute(
        &self,
        connection: &mut CountingConnection,
        _data_source: &CountingDataSource,
    ) -> Result<Table, ConnectorError> {
        tokio::task::yield_now().await;
        if self.fail_query {
            return Err(ConnectorError::query_message("Counting", "syntax error"));
        }
        let rows = (0..connection.rows)
            .map(|i| vec![Cell::Integer(i), Cell::String(format!("row-{i}"))])
            .collect();
        Table::from_parts(
            vec![
                Column::new("n", ExchangeType::Number),
                Column::new("label", ExchangeType::String),
            ],
            rows,
        )
        .map_err(|e| ConnectorError::query("Counting", "bad rows", e))
    }

    async fn release(&self, _connection: CountingConnection) -> Result<(), ConnectorError> {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.counters.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn connector(overrides: serde_json::Value) -> CountingConnector {
    let mut raw = json!({"name": "counting"});
    if let (Some(target), Some(extra)) = (raw.as_object_mut(), overrides.as_object()) {
        target.extend(extra.clone());
    }
    CountingConnector::validate(&raw).unwrap()
}

fn data_source(rows: i64) -> CountingDataSource {
    CountingDataSource::validate(&json!({
        "domain": "numbers",
        "name": "counting",
        "rows": rows,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_retrieve_opens_and_releases_once() {
    let connector = connector(json!({}));
    let table = ToucanConnector::retrieve(&connector, &data_source(3)).await.unwrap();

    assert_eq!(table.column_names(), vec!["n", "label"]);
    assert_eq!(table.num_rows(), 3);
    assert_eq!(connector.counters.connects.load(Ordering::SeqCst), 1);
    assert_eq!(connector.counters.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let connector = connector(json!({}));
    let table = ToucanConnector::retrieve(&connector, &data_source(0)).await.unwrap();

    assert!(table.is_empty());
    assert_eq!(table.column_names(), vec!["n", "label"]);
}

#[tokio::test]
async fn test_query_failure_still_releases() {
    let connector = connector(json!({"fail_query": true}));
    let error = ToucanConnector::retrieve(&connector, &data_source(3))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ConnectorsError::Connector(ConnectorError::Query {
            backend: "Counting",
            ..
        })
    ));
    assert_eq!(connector.counters.connects.load(Ordering::SeqCst), 1);
    assert_eq!(connector.counters.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connect_failure_releases_nothing() {
    let connector = connector(json!({"fail_connect": true}));
    let error = ToucanConnector::retrieve(&connector, &data_source(3))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ConnectorsError::Connector(ConnectorError::Connection { .. })
    ));
    assert_eq!(connector.counters.releases.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connect_timeout() {
    let connector = connector(json!({"connect_delay_ms": 5_000, "connect_timeout_ms": 20}));
    let error = ToucanConnector::retrieve(&connector, &data_source(1))
        .await
        .unwrap_err();

    match error {
        ConnectorsError::Connector(ConnectorError::ConnectTimeout { backend, timeout }) => {
            assert_eq!(backend, "Counting");
            assert_eq!(timeout, Duration::from_millis(20));
        }
        other => panic!("expected a connect timeout, got {other:?}"),
    }
    assert_eq!(connector.counters.releases.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wrong_data_source_fails_before_io() {
    let connector = connector(json!({}));
    let other: Box<dyn AnyDataSource> = Box::new(
        OtherDataSource::validate(&json!({"domain": "d", "name": "counting"})).unwrap(),
    );

    let error = DynConnector::retrieve(&connector, other.as_ref())
        .await
        .unwrap_err();
    match error {
        ConnectorsError::TypeConsistency(mismatch) => {
            assert_eq!(mismatch.backend, "Counting");
            assert!(mismatch.found.ends_with("OtherDataSource"));
        }
        other => panic!("expected a type consistency error, got {other:?}"),
    }
    assert_eq!(connector.counters.connects.load(Ordering::SeqCst), 0);

    assert!(DynConnector::connection_params(&connector, other.as_ref()).is_err());
}

#[tokio::test]
async fn test_dynamic_dispatch_matches_typed_call() {
    let connector: Arc<dyn DynConnector> = Arc::new(connector(json!({})));
    let source: Box<dyn AnyDataSource> = Box::new(data_source(2));

    assert_eq!(connector.backend(), "Counting");
    assert_eq!(connector.name(), "counting");

    let params = connector.connection_params(source.as_ref()).unwrap();
    assert_eq!(params.keys(), vec!["name", "rows"]);

    let table = connector.retrieve(source.as_ref()).await.unwrap();
    assert_eq!(table.num_rows(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_use_separate_connections() {
    let connector = Arc::new(connector(json!({"connect_delay_ms": 20})));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let connector = Arc::clone(&connector);
            tokio::spawn(async move {
                ToucanConnector::retrieve(connector.as_ref(), &data_source(i))
                    .await
                    .map(|table| table.num_rows())
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), i);
    }
    assert_eq!(connector.counters.connects.load(Ordering::SeqCst), 8);
    assert_eq!(connector.counters.releases.load(Ordering::SeqCst), 8);
    assert_eq!(connector.counters.open.load(Ordering::SeqCst), 0);
    assert!(connector.counters.max_open.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_retrieve_slice_reports_total() {
    let connector = connector(json!({}));
    let slice = ToucanConnector::retrieve_slice(&connector, &data_source(10), 4, Some(3))
        .await
        .unwrap();

    assert_eq!(slice.total_count, 10);
    assert_eq!(slice.table.num_rows(), 3);
    assert_eq!(
        slice.table.row(0).unwrap().get("n"),
        Some(&Cell::Integer(4))
    );
}
