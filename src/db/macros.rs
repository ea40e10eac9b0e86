//! Connection dispatch macro for reducing code duplication.
//!
//! Every statement the gateway runs follows the same shape: lease one
//! connection, run a backend-specific body under the statement timeout, then
//! return the connection to the pool or discard it. The macro expands that
//! shape at compile time so each call site only spells out the per-backend
//! bodies.

/// Run backend-specific bodies on one leased connection under a timeout.
///
/// Evaluates to `GatewayResult<T>`. Must be used inside an async fn that
/// returns `GatewayResult<_>` (acquire failures propagate with `?`).
///
/// # Example
///
/// ```ignore
/// with_connection!(pool, timeout, "list_schemas", {
///     Postgres(conn) => postgres::list_schemas(conn).await,
///     Sqlite(conn) => sqlite::list_schemas(conn).await,
/// })
/// ```
macro_rules! with_connection {
    ($pool:expr, $limit:expr, $operation:expr, { $($variant:ident($conn:ident) => $body:expr),+ $(,)? }) => {{
        let limit: ::std::time::Duration = $limit;
        let mut handle = $pool.acquire().await?;
        let outcome = ::tokio::time::timeout(limit, async {
            match &mut handle {
                $(
                    $crate::db::pool::ConnectionHandle::$variant(pooled) => {
                        let $conn = &mut **pooled;
                        $body
                    }
                )+
            }
        })
        .await;
        $crate::db::executor::settle(handle, outcome, $operation, limit)
    }};
}

pub(crate) use with_connection;
