//! Read tools.
//!
//! `execute_select_query` runs caller-supplied DQL through the classifier and
//! the safety policy. `get_sample_data` builds its own bounded SELECT from
//! quoted identifiers and skips both.

use crate::config::QueryLimits;
use crate::db::{ConnectionPool, QueryExecutor};
use crate::error::{GatewayError, GatewayResult};
use crate::models::{CallerId, Query};
use crate::tools::classifier::QueryClassifier;
use crate::tools::format::ResultFormatter;
use crate::tools::guard::SafetyPolicy;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// SQLSTATE for undefined_table.
const PG_UNDEFINED_TABLE: &str = "42P01";

/// Input for the execute_select_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SelectQueryInput {
    /// The SELECT (or WITH ... SELECT) statement to execute. Exactly one statement.
    #[serde(alias = "sql_query")]
    pub sql: String,
}

/// Input for the get_sample_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SampleDataInput {
    /// Name of the table
    #[serde(alias = "table_name")]
    pub table: String,
    /// Schema of the table (default: "public" on PostgreSQL, "main" on SQLite)
    #[serde(default, alias = "schema_name")]
    pub schema: Option<String>,
    /// Number of rows to return (default: 5, capped at the configured row limit)
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn wrong_kind_message(kind: impl std::fmt::Display) -> String {
    format!(
        "This tool only executes SELECT queries. Query type detected: {}. Use execute_write_query for modifications.",
        kind
    )
}

pub struct QueryToolHandler {
    pool: Arc<ConnectionPool>,
    policy: Arc<SafetyPolicy>,
    classifier: QueryClassifier,
    executor: QueryExecutor,
    formatter: ResultFormatter,
    limits: QueryLimits,
}

impl QueryToolHandler {
    pub fn new(pool: Arc<ConnectionPool>, policy: Arc<SafetyPolicy>, limits: QueryLimits) -> Self {
        let classifier = QueryClassifier::new(pool.backend());
        Self {
            pool,
            policy,
            classifier,
            executor: QueryExecutor::new(limits.query_timeout),
            formatter: ResultFormatter::new(limits.row_cap),
            limits,
        }
    }

    /// Handle the execute_select_query tool call.
    ///
    /// Anything the classifier does not report as DQL is refused before the
    /// policy runs, so a refused statement costs the caller nothing.
    pub async fn execute_select_query(
        &self,
        caller: &CallerId,
        input: SelectQueryInput,
    ) -> GatewayResult<String> {
        let query = Query::new(input.sql, caller.clone());
        let kind = self.classifier.classify(query.sql())?;
        if !kind.is_read_only() {
            return Err(GatewayError::invalid_input(wrong_kind_message(kind)));
        }

        self.policy.admit(&query).await?;

        let rows = self
            .executor
            .fetch_read_only(&self.pool, query.sql(), self.limits.row_cap)
            .await?;

        info!(
            caller = %caller,
            kind = %kind,
            rows = rows.total_rows(),
            "Select query executed"
        );
        Ok(self.formatter.format_rows(&rows))
    }

    /// Handle the get_sample_data tool call.
    pub async fn get_sample_data(&self, input: SampleDataInput) -> GatewayResult<String> {
        if input.table.trim().is_empty() {
            return Err(GatewayError::invalid_input("table must not be empty"));
        }
        let schema = input
            .schema
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.pool.backend().default_schema().to_string());
        let limit = self.sample_limit(input.limit)?;

        let sql = format!(
            "SELECT * FROM {}.{} LIMIT {}",
            quote_identifier(&schema),
            quote_identifier(&input.table),
            limit
        );
        debug!(sql = %sql, "Fetching sample rows");

        // Rows past the cap are counted, not dropped, so the marker shows them.
        let rows = self
            .executor
            .fetch_read_only(&self.pool, &sql, self.limits.row_cap)
            .await
            .map_err(|e| missing_table(e, &schema, &input.table))?;
        Ok(self.formatter.format_rows(&rows))
    }

    /// SQL `LIMIT` for a sample. Rendering is still capped at the row cap.
    fn sample_limit(&self, requested: Option<u32>) -> GatewayResult<u32> {
        match requested {
            Some(0) => Err(GatewayError::invalid_input(
                "limit must be a positive integer",
            )),
            Some(n) => Ok(n),
            None => Ok(self.limits.sample_limit.min(self.limits.row_cap)),
        }
    }
}

/// Map "relation does not exist" failures to `TableNotFound`.
fn missing_table(err: GatewayError, schema: &str, table: &str) -> GatewayError {
    match &err {
        GatewayError::QueryExecution { message, sql_state }
            if sql_state.as_deref() == Some(PG_UNDEFINED_TABLE)
                || message.starts_with("no such table") =>
        {
            GatewayError::table_not_found(schema, table)
        }
        _ => err,
    }
}
