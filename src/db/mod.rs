//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Statement execution (read-only path and transactional writes)
//! - Catalog introspection
//! - Value decoding
//! - The connection dispatch macro shared by the above

pub mod macros;

pub mod executor;
pub mod pool;
pub mod schema;
pub mod types;

pub use executor::QueryExecutor;
pub use pool::{Backend, ConnectionHandle, ConnectionPool, DbPool, PoolStatus};
pub use schema::CatalogInspector;
