//! Per-call connection lifecycle.
//!
//! Every `retrieve` walks `Configured → Connecting → Querying → Releasing →
//! Done`. `Failed` is reachable from `Connecting` and `Querying`; once a
//! connection exists, `Releasing` always follows, so the connection is
//! closed on every exit path.

use super::{ToucanConnector, ToucanDataSource};
use crate::error::{ConnectorError, Result};
use crate::models::Table;
use tracing::{debug, warn};

/// Stage of a single `retrieve` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Validated configuration, nothing opened yet
    Configured,
    /// Opening the backend connection
    Connecting,
    /// Running the query
    Querying,
    /// Closing the connection
    Releasing,
    /// Call finished, connection closed
    Done,
    /// Connect or query step failed
    Failed,
}

impl Phase {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Configured, Phase::Connecting)
                | (Phase::Connecting, Phase::Querying)
                | (Phase::Connecting, Phase::Failed)
                | (Phase::Querying, Phase::Releasing)
                | (Phase::Querying, Phase::Failed)
                | (Phase::Failed, Phase::Releasing)
                | (Phase::Releasing, Phase::Done)
        )
    }
}

/// Phase tracker for one call, logging each transition.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    backend: &'static str,
    phase: Phase,
}

impl Lifecycle {
    pub(crate) fn new(backend: &'static str) -> Self {
        Self {
            backend,
            phase: Phase::Configured,
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: Phase) {
        if self.phase.can_transition_to(next) {
            debug!(
                backend = self.backend,
                from = ?self.phase,
                to = ?next,
                "Connector phase transition"
            );
        } else {
            warn!(
                backend = self.backend,
                from = ?self.phase,
                to = ?next,
                "Unexpected connector phase transition"
            );
        }
        self.phase = next;
    }
}

/// Drives connect, execute and release for one call.
///
/// Release errors are logged and never replace the call's result.
pub(crate) async fn drive<C: ToucanConnector>(
    connector: &C,
    data_source: &C::DataSource,
) -> Result<Table> {
    let mut lifecycle = Lifecycle::new(C::BACKEND);
    let params = connector.connection_params(data_source);

    lifecycle.advance(Phase::Connecting);
    let connecting = connector.connect(&params);
    let connected = match connector.connect_timeout() {
        Some(timeout) => tokio::time::timeout(timeout, connecting)
            .await
            .unwrap_or(Err(ConnectorError::ConnectTimeout {
                backend: C::BACKEND,
                timeout,
            })),
        None => connecting.await,
    };
    drop(params);

    let mut connection = match connected {
        Ok(connection) => connection,
        Err(error) => {
            lifecycle.advance(Phase::Failed);
            return Err(error.into());
        }
    };

    lifecycle.advance(Phase::Querying);
    let result = connector.execute(&mut connection, data_source).await;
    if result.is_err() {
        lifecycle.advance(Phase::Failed);
    }

    lifecycle.advance(Phase::Releasing);
    if let Err(error) = connector.release(connection).await {
        warn!(backend = C::BACKEND, error = %error, "Failed to release connection");
    }
    lifecycle.advance(Phase::Done);

    let table = result?;
    debug!(
        backend = C::BACKEND,
        domain = %data_source.base().domain,
        rows = table.num_rows(),
        columns = table.columns().len(),
        "Retrieved data"
    );
    Ok(table)
}
