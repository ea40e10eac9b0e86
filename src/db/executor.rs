//! Statement execution engine.
//!
//! Every statement runs on exactly one leased connection under the
//! per-statement timeout:
//! - Reads run inside a transaction that is always rolled back, with the
//!   session forced read-only. Rows beyond the row cap are counted, not
//!   decoded.
//! - Confirmed writes run inside a single transaction that commits on
//!   success and rolls back on any error.
//!
//! A connection whose statement timed out or faulted is discarded instead
//! of being returned to the pool.
//!
//! # Architecture
//!
//! Backend-specific implementations live in the `postgres` and `sqlite`
//! submodules; their structure is kept parallel.

use crate::db::macros::with_connection;
use crate::db::pool::{ConnectionHandle, ConnectionPool};
use crate::db::types::RowToJson;
use crate::error::{GatewayError, GatewayResult};
use crate::models::RowSet;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use std::time::{Duration, Instant};
use tokio::time::error::Elapsed;
use tracing::{debug, warn};

/// Executes free-text and synthesized statements against the pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a query on the read-only path and return at most `row_cap` rows.
    pub async fn fetch_read_only(
        &self,
        pool: &ConnectionPool,
        sql: &str,
        row_cap: u32,
    ) -> GatewayResult<RowSet> {
        let start = Instant::now();
        debug!(sql = %sql, row_cap, timeout_secs = self.timeout.as_secs(), "Executing read");

        let rows = with_connection!(pool, self.timeout, "query execution", {
            Postgres(conn) => postgres::fetch_read_only(conn, sql, row_cap).await,
            Sqlite(conn) => sqlite::fetch_read_only(conn, sql, row_cap).await,
        })?;
        debug!(
            rows = rows.rows.len(),
            omitted = rows.omitted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Read completed"
        );
        Ok(rows)
    }

    /// Execute one statement in its own transaction and return the affected row count.
    pub async fn execute_write(&self, pool: &ConnectionPool, sql: &str) -> GatewayResult<u64> {
        debug!(sql = %sql, timeout_secs = self.timeout.as_secs(), "Executing write");

        with_connection!(pool, self.timeout, "write operation", {
            Postgres(conn) => postgres::execute_write(conn, sql).await,
            Sqlite(conn) => sqlite::execute_write(conn, sql).await,
        })
    }
}

/// Decide the fate of a leased connection once its statement finished.
///
/// Success and ordinary database errors hand the connection back to the pool;
/// timeouts and connection faults discard it.
pub(crate) fn settle<T>(
    handle: ConnectionHandle,
    outcome: Result<GatewayResult<T>, Elapsed>,
    operation: &str,
    limit: Duration,
) -> GatewayResult<T> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) if err.is_connection_fault() => {
            warn!(error = %err, "Connection fault during {}, discarding connection", operation);
            handle.discard();
            Err(err)
        }
        Ok(Err(err)) => Err(err),
        Err(_) => {
            warn!(
                timeout_secs = limit.as_secs(),
                "{} timed out, discarding connection", operation
            );
            handle.discard();
            Err(GatewayError::timeout(operation, limit))
        }
    }
}

/// Drain a row stream, keeping the first `row_cap` rows and counting the rest.
async fn collect_capped<R: RowToJson>(
    mut stream: BoxStream<'_, Result<R, sqlx::Error>>,
    row_cap: u32,
) -> GatewayResult<RowSet> {
    let cap = row_cap as usize;
    let mut rows = RowSet::default();

    while let Some(row) = stream.try_next().await? {
        if rows.columns.is_empty() {
            rows.columns = row.column_names();
        }
        if rows.rows.len() < cap {
            rows.rows.push(row.to_json_values());
        } else {
            rows.omitted += 1;
        }
    }

    if rows.omitted > 0 {
        debug!(shown = rows.rows.len(), omitted = rows.omitted, "Result truncated at row cap");
    }
    Ok(rows)
}

/// Combine a statement outcome with the rollback that followed it.
/// The statement's own error wins.
fn after_rollback<T>(outcome: GatewayResult<T>, rollback: Result<(), sqlx::Error>) -> GatewayResult<T> {
    match (outcome, rollback) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(e)) => {
            warn!(error = %e, "Rollback failed after statement error");
            Err(err)
        }
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{Connection, Executor, PgConnection};

    pub async fn fetch_read_only(
        conn: &mut PgConnection,
        sql: &str,
        row_cap: u32,
    ) -> GatewayResult<RowSet> {
        let mut tx = conn.begin().await?;
        (&mut *tx).execute("SET TRANSACTION READ ONLY").await?;

        // A raw &str goes over the simple query protocol, so every value
        // arrives in text format.
        let outcome = collect_capped((&mut *tx).fetch(sql), row_cap).await;
        let rollback = tx.rollback().await;
        after_rollback(outcome, rollback)
    }

    pub async fn execute_write(conn: &mut PgConnection, sql: &str) -> GatewayResult<u64> {
        let mut tx = conn.begin().await?;
        match (&mut *tx).execute(sql).await {
            Ok(done) => {
                tx.commit().await?;
                Ok(done.rows_affected())
            }
            Err(e) => {
                let rollback = tx.rollback().await;
                after_rollback(Err(e.into()), rollback)
            }
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Connection, Executor, SqliteConnection};

    pub async fn fetch_read_only(
        conn: &mut SqliteConnection,
        sql: &str,
        row_cap: u32,
    ) -> GatewayResult<RowSet> {
        (&mut *conn).execute("PRAGMA query_only = ON").await?;

        let outcome = async {
            let mut tx = conn.begin().await?;
            let outcome = collect_capped((&mut *tx).fetch(sql), row_cap).await;
            let rollback = tx.rollback().await;
            after_rollback(outcome, rollback)
        }
        .await;

        let reset = (&mut *conn).execute("PRAGMA query_only = OFF").await;
        after_reset(outcome, reset.map(|_| ()))
    }

    /// A connection still in `query_only` mode must not go back to the pool,
    /// so a failed reset becomes a connection fault whatever the statement did.
    pub(super) fn after_reset<T>(
        outcome: GatewayResult<T>,
        reset: Result<(), sqlx::Error>,
    ) -> GatewayResult<T> {
        match reset {
            Ok(()) => outcome,
            Err(e) => {
                if let Err(err) = &outcome {
                    warn!(error = %err, "Read failed before query_only reset");
                }
                warn!(error = %e, "Failed to reset PRAGMA query_only");
                Err(GatewayError::connection(
                    format!("failed to restore writable mode: {}", e),
                    "The connection was discarded; retry the call",
                ))
            }
        }
    }

    pub async fn execute_write(conn: &mut SqliteConnection, sql: &str) -> GatewayResult<u64> {
        let mut tx = conn.begin().await?;
        match (&mut *tx).execute(sql).await {
            Ok(done) => {
                tx.commit().await?;
                Ok(done.rows_affected())
            }
            Err(e) => {
                let rollback = tx.rollback().await;
                after_rollback(Err(e.into()), rollback)
            }
        }
    }
}
