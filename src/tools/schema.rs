//! Schema introspection tools.
//!
//! This module implements `list_schemas`, `list_tables` and `describe_table`.
//! None of them accept SQL; identifiers travel as bind parameters.

use crate::config::QueryLimits;
use crate::db::{CatalogInspector, ConnectionPool};
use crate::error::{GatewayError, GatewayResult};
use crate::tools::format::ResultFormatter;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

/// Input for the list_schemas tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListSchemasInput {}

/// Input for the list_tables tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Schema to list (default: "public" on PostgreSQL, "main" on SQLite)
    #[serde(default, alias = "schema_name")]
    pub schema: Option<String>,
}

/// Input for the describe_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    /// Name of the table to describe
    #[serde(alias = "table_name")]
    pub table: String,
    /// Schema of the table (default: "public" on PostgreSQL, "main" on SQLite)
    #[serde(default, alias = "schema_name")]
    pub schema: Option<String>,
}

pub struct SchemaToolHandler {
    pool: Arc<ConnectionPool>,
    inspector: CatalogInspector,
    formatter: ResultFormatter,
}

impl SchemaToolHandler {
    pub fn new(pool: Arc<ConnectionPool>, limits: QueryLimits) -> Self {
        Self {
            pool,
            inspector: CatalogInspector::new(limits.query_timeout),
            formatter: ResultFormatter::new(limits.row_cap),
        }
    }

    fn resolve_schema(&self, schema: Option<String>) -> String {
        schema
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.pool.backend().default_schema().to_string())
    }

    pub async fn list_schemas(&self, _input: ListSchemasInput) -> GatewayResult<String> {
        let schemas = self.inspector.list_schemas(&self.pool).await?;
        Ok(self.formatter.format_schemas(&schemas))
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> GatewayResult<String> {
        let schema = self.resolve_schema(input.schema);
        let tables = self.inspector.list_tables(&self.pool, &schema).await?;
        Ok(self.formatter.format_tables(&schema, &tables))
    }

    pub async fn describe_table(&self, input: DescribeTableInput) -> GatewayResult<String> {
        let table = input.table.trim();
        if table.is_empty() {
            return Err(GatewayError::invalid_input("table must not be empty"));
        }
        let schema = self.resolve_schema(input.schema);
        let description = self
            .inspector
            .describe_table(&self.pool, &schema, table)
            .await?;
        Ok(self.formatter.format_description(&description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_tables_input_defaults() {
        let input: ListTablesInput = serde_json::from_str("{}").unwrap();
        assert!(input.schema.is_none());

        let input: ListTablesInput =
            serde_json::from_str(r#"{"schema_name": "analytics"}"#).unwrap();
        assert_eq!(input.schema.as_deref(), Some("analytics"));
    }

    #[test]
    fn test_describe_table_input_requires_table() {
        assert!(serde_json::from_str::<DescribeTableInput>("{}").is_err());

        let input: DescribeTableInput =
            serde_json::from_str(r#"{"table": "users"}"#).unwrap();
        assert_eq!(input.table, "users");
        assert!(input.schema.is_none());
    }
}
