//! Connection pool management.
//!
//! One `ConnectionPool` is built per process and shared through an `Arc`.
//! It wraps a backend-specific sqlx pool (PgPool, SqlitePool) sized to
//! `pool_size + max_overflow`, with pre-ping, recycling and idle reaping
//! delegated to the sqlx pool options.

use crate::config::{DatabaseTarget, PoolConfig};
use crate::error::{GatewayError, GatewayResult};
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Connection, PgPool, Postgres, Sqlite, SqlitePool};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Database backend behind the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    /// Schema used when a tool call does not name one.
    pub fn default_schema(&self) -> &'static str {
        match self {
            Self::Postgres => "public",
            Self::Sqlite => "main",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Database-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    pub fn backend(&self) -> Backend {
        match self {
            DbPool::Postgres(_) => Backend::Postgres,
            DbPool::Sqlite(_) => Backend::Sqlite,
        }
    }
}

/// A connection leased from the pool for one statement.
///
/// Dropping the handle returns the connection to the pool. A handle whose
/// connection faulted or timed out must be `discard`ed instead.
#[derive(Debug)]
pub enum ConnectionHandle {
    Postgres(PoolConnection<Postgres>),
    Sqlite(PoolConnection<Sqlite>),
}

impl ConnectionHandle {
    pub fn backend(&self) -> Backend {
        match self {
            Self::Postgres(_) => Backend::Postgres,
            Self::Sqlite(_) => Backend::Sqlite,
        }
    }

    /// Lightweight liveness probe.
    pub async fn ping(&mut self) -> GatewayResult<()> {
        match self {
            Self::Postgres(conn) => conn.ping().await?,
            Self::Sqlite(conn) => conn.ping().await?,
        }
        Ok(())
    }

    /// Remove the connection from the pool and close it.
    ///
    /// The pool opens a replacement on demand, so an aborted statement can
    /// never leave an indeterminate session behind for the next caller.
    pub fn discard(self) {
        match self {
            Self::Postgres(conn) => drop(conn.detach()),
            Self::Sqlite(conn) => drop(conn.detach()),
        }
        debug!("Discarded pooled connection");
    }
}

/// Snapshot reported by `health_check` and `status`.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub backend: Backend,
    pub target: String,
    /// Open connections (idle + in use)
    pub size: u32,
    pub idle: usize,
    pub max_connections: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_ms: Option<u64>,
}

#[derive(Debug)]
pub struct ConnectionPool {
    pool: DbPool,
    config: PoolConfig,
}

impl ConnectionPool {
    /// Create the pool and open the first connection.
    ///
    /// Fails with `Connection` when the database cannot be reached or the
    /// credentials are rejected.
    pub async fn connect(config: PoolConfig) -> GatewayResult<Self> {
        let target = config.target().describe();
        info!(
            target = %target,
            pool_size = config.pool_size(),
            max_overflow = config.max_overflow(),
            pre_ping = config.pre_ping(),
            "Connecting to database"
        );

        let pool = match config.target() {
            DatabaseTarget::Postgres { options, .. } => {
                let pool = PgPoolOptions::new()
                    .min_connections(config.pool_size())
                    .max_connections(config.max_connections())
                    .acquire_timeout(config.acquire_timeout())
                    .idle_timeout(Some(config.idle_timeout()))
                    .max_lifetime(Some(config.recycle()))
                    .test_before_acquire(config.pre_ping())
                    .connect_with(options.clone())
                    .await
                    .map_err(|e| {
                        GatewayError::connection(
                            format!("Failed to connect: {}", e),
                            connection_suggestion(Backend::Postgres, &e),
                        )
                    })?;
                DbPool::Postgres(pool)
            }
            DatabaseTarget::Sqlite { path } => {
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .foreign_keys(true);

                let pool = SqlitePoolOptions::new()
                    .min_connections(config.pool_size())
                    .max_connections(config.max_connections())
                    .acquire_timeout(config.acquire_timeout())
                    .idle_timeout(Some(config.idle_timeout()))
                    .max_lifetime(Some(config.recycle()))
                    .test_before_acquire(config.pre_ping())
                    .connect_with(options)
                    .await
                    .map_err(|e| {
                        GatewayError::connection(
                            format!("Failed to open database: {}", e),
                            connection_suggestion(Backend::Sqlite, &e),
                        )
                    })?;
                DbPool::Sqlite(pool)
            }
        };

        info!(target = %target, backend = %pool.backend(), "Connected successfully");
        Ok(Self { pool, config })
    }

    pub fn backend(&self) -> Backend {
        self.pool.backend()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Lease a connection for one statement.
    ///
    /// Waits up to the acquire timeout when `pool_size + max_overflow`
    /// connections are already in use, then fails with `PoolExhausted`.
    pub async fn acquire(&self) -> GatewayResult<ConnectionHandle> {
        let result = match &self.pool {
            DbPool::Postgres(p) => p.acquire().await.map(ConnectionHandle::Postgres),
            DbPool::Sqlite(p) => p.acquire().await.map(ConnectionHandle::Sqlite),
        };

        result.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => {
                warn!(
                    waited_secs = self.config.acquire_timeout().as_secs(),
                    max_connections = self.config.max_connections(),
                    "Connection pool exhausted"
                );
                GatewayError::pool_exhausted(self.config.acquire_timeout())
            }
            other => GatewayError::from(other),
        })
    }

    /// Acquire a connection, ping it and report pool status.
    pub async fn health_check(&self) -> GatewayResult<PoolStatus> {
        let mut handle = self.acquire().await?;
        let start = Instant::now();
        if let Err(e) = handle.ping().await {
            handle.discard();
            return Err(e);
        }
        let ping_ms = start.elapsed().as_millis() as u64;
        let server_version = server_version(&mut handle).await;
        drop(handle);

        Ok(PoolStatus {
            ping_ms: Some(ping_ms),
            server_version,
            ..self.status()
        })
    }

    /// Current pool occupancy, without touching the database.
    pub fn status(&self) -> PoolStatus {
        let (size, idle) = match &self.pool {
            DbPool::Postgres(p) => (p.size(), p.num_idle()),
            DbPool::Sqlite(p) => (p.size(), p.num_idle()),
        };
        PoolStatus {
            backend: self.backend(),
            target: self.config.target().describe(),
            size,
            idle,
            max_connections: self.config.max_connections(),
            server_version: None,
            ping_ms: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.pool {
            DbPool::Postgres(p) => p.is_closed(),
            DbPool::Sqlite(p) => p.is_closed(),
        }
    }

    /// Close every connection. Later acquires fail.
    pub async fn close(&self) {
        match &self.pool {
            DbPool::Postgres(p) => p.close().await,
            DbPool::Sqlite(p) => p.close().await,
        }
        info!("Connection pool closed");
    }
}

async fn server_version(handle: &mut ConnectionHandle) -> Option<String> {
    let result = match handle {
        ConnectionHandle::Postgres(conn) => {
            sqlx::query_scalar::<_, String>("SELECT version()")
                .fetch_one(&mut **conn)
                .await
        }
        ConnectionHandle::Sqlite(conn) => {
            sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                .fetch_one(&mut **conn)
                .await
        }
    };
    match result {
        Ok(version) => Some(version),
        Err(e) => {
            warn!(error = %e, "Failed to get server version");
            None
        }
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(backend: Backend, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!("Check that the {} server is running and accessible", backend);
    }
    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify DB_USER and DB_PASSWORD".to_string();
    }
    if error_str.contains("does not exist") {
        return "Check that DB_NAME names an existing database".to_string();
    }
    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check DB_SSLMODE or build with a TLS feature (tls-native / tls-rustls)".to_string();
    }

    match backend {
        Backend::Postgres => "Verify DB_HOST and DB_PORT (default 5432)".to_string(),
        Backend::Sqlite => "Verify the file path exists and is writable".to_string(),
    }
}
