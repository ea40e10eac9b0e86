//! Data models for the SQL gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod query;
pub mod schema;

// Re-export commonly used types
pub use query::{CallerId, Query, QueryKind, RowSet, WriteOutcome};
pub use schema::{ColumnDescriptor, ColumnReference, ForeignKey, TableDescription};
