//! Error types for the SQL gateway.
//!
//! Every failure a tool call can produce is a `GatewayError` variant. Variants
//! carry enough context (matched keyword, retry hint, SQLSTATE) for an AI
//! assistant to decide whether retrying makes sense.

use std::time::Duration;
use thiserror::Error;

/// Acquire timeout assumed when sqlx reports a pool timeout without context.
const FALLBACK_ACQUIRE_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Connection pool exhausted: no connection became available within {waited_secs}s")]
    PoolExhausted { waited_secs: u64 },

    #[error("Query blocked: contains forbidden keyword '{keyword}'")]
    BlockedQuery { keyword: String },

    #[error("Rate limit exceeded for caller '{caller}': retry after {retry_after_secs}s")]
    RateLimitExceeded {
        caller: String,
        retry_after_secs: u64,
    },

    #[error("Query execution failed: {message}")]
    QueryExecution {
        message: String,
        /// e.g. "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Table '{schema}.{table}' not found")]
    TableNotFound { schema: String, table: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn pool_exhausted(waited: Duration) -> Self {
        Self::PoolExhausted {
            waited_secs: waited.as_secs(),
        }
    }

    pub fn blocked(keyword: impl Into<String>) -> Self {
        Self::BlockedQuery {
            keyword: keyword.into(),
        }
    }

    pub fn rate_limited(caller: impl Into<String>, retry_after: Duration) -> Self {
        // Round up so a hint of "0s" is never handed out while still limited.
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        Self::RateLimitExceeded {
            caller: caller.into(),
            retry_after_secs: secs.max(1),
        }
    }

    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::QueryExecution {
            message: message.into(),
            sql_state,
        }
    }

    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs: limit.as_secs(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn table_not_found(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self::TableNotFound {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => {
                Some("All pooled connections are busy. Retry shortly or raise the pool size")
            }
            Self::BlockedQuery { .. } => {
                Some("This statement is forbidden by the gateway policy and cannot be executed")
            }
            Self::RateLimitExceeded { .. } => Some("Wait for the retry interval before resubmitting"),
            Self::QueryExecution { .. } => Some("Check the SQL syntax and referenced objects"),
            Self::Timeout { .. } => {
                Some("Narrow the query (filters, LIMIT) or raise the query timeout")
            }
            Self::TableNotFound { .. } => {
                Some("Call list_tables to see the tables available in the schema")
            }
            _ => None,
        }
    }

    /// Check if this error is transient and the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::PoolExhausted { .. }
                | Self::RateLimitExceeded { .. }
                | Self::Timeout { .. }
        )
    }

    /// Retry hint carried by rate-limit failures.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded {
                retry_after_secs, ..
            } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }

    /// True when the underlying connection can no longer be trusted.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to GatewayError.
impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => GatewayError::config(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                GatewayError::execution(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => GatewayError::execution("No rows returned", None),
            sqlx::Error::PoolTimedOut => {
                GatewayError::pool_exhausted(Duration::from_secs(FALLBACK_ACQUIRE_SECS))
            }
            sqlx::Error::PoolClosed => GatewayError::connection(
                "Connection pool is closed",
                "The server is shutting down; reconnect once it is back",
            ),
            sqlx::Error::Io(io_err) => GatewayError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => GatewayError::connection(
                format!("TLS error: {}", tls_err),
                "Verify the sslmode setting and server certificates",
            ),
            sqlx::Error::Protocol(msg) => GatewayError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                GatewayError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                GatewayError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => GatewayError::connection(
                "Database worker crashed",
                "Retry the call; the connection will be replaced",
            ),
            _ => GatewayError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Build suggestion data as JSON value.
fn suggestion_data(err: &GatewayError) -> Option<serde_json::Value> {
    let mut data = serde_json::Map::new();
    if let Some(s) = err.suggestion() {
        data.insert("suggestion".into(), s.into());
    }
    if let Some(retry) = err.retry_after() {
        data.insert("retry_after_secs".into(), retry.as_secs().into());
    }
    if err.is_retryable() {
        data.insert("retryable".into(), true.into());
    }
    (!data.is_empty()).then_some(serde_json::Value::Object(data))
}

/// Convert GatewayError to MCP ErrorData.
/// Caller mistakes map to invalid_params, missing objects to resource_not_found,
/// and environment failures to internal_error.
impl From<GatewayError> for rmcp::ErrorData {
    fn from(err: GatewayError) -> Self {
        let data = suggestion_data(&err);
        match &err {
            GatewayError::InvalidInput { .. } | GatewayError::BlockedQuery { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }

            GatewayError::QueryExecution { message, sql_state } => {
                let msg = match sql_state {
                    Some(code) => format!("Query execution failed: {} (SQLSTATE: {})", message, code),
                    None => err.to_string(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            GatewayError::TableNotFound { .. } => {
                rmcp::ErrorData::resource_not_found(err.to_string(), data)
            }

            GatewayError::Config { .. }
            | GatewayError::Connection { .. }
            | GatewayError::PoolExhausted { .. }
            | GatewayError::RateLimitExceeded { .. }
            | GatewayError::Timeout { .. }
            | GatewayError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}
