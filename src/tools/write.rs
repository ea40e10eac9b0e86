//! Write operation tool.
//!
//! This module implements the `execute_write_query` MCP tool. Every call goes
//! through the confirmation gate: the first call only echoes the classified
//! statement back, and the statement runs only when resubmitted with
//! `confirmed = true`.

use crate::config::QueryLimits;
use crate::db::{ConnectionPool, QueryExecutor};
use crate::error::GatewayResult;
use crate::models::{CallerId, Query};
use crate::tools::confirmation::ConfirmationGate;
use crate::tools::format::ResultFormatter;
use crate::tools::guard::SafetyPolicy;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

/// Input for the execute_write_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WriteQueryInput {
    /// Statement to execute (INSERT, UPDATE, DELETE, or DDL like CREATE/ALTER/DROP/TRUNCATE). Exactly one statement.
    #[serde(alias = "sql_query")]
    pub sql: String,
    /// Set to true only after the user approved the statement returned by the CONFIRMATION_REQUIRED response. Default: false
    #[serde(default)]
    pub confirmed: bool,
}

pub struct WriteToolHandler {
    gate: ConfirmationGate,
    formatter: ResultFormatter,
}

impl WriteToolHandler {
    pub fn new(pool: Arc<ConnectionPool>, policy: Arc<SafetyPolicy>, limits: QueryLimits) -> Self {
        Self {
            gate: ConfirmationGate::new(pool, policy, QueryExecutor::new(limits.query_timeout)),
            formatter: ResultFormatter::new(limits.row_cap),
        }
    }

    pub async fn execute_write_query(
        &self,
        caller: &CallerId,
        input: WriteQueryInput,
    ) -> GatewayResult<String> {
        let query = Query::new(input.sql, caller.clone());
        let outcome = self.gate.submit(query, input.confirmed).await?;
        Ok(self.formatter.format_write_outcome(&outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_input_defaults_to_unconfirmed() {
        let input: WriteQueryInput =
            serde_json::from_str(r#"{"sql": "DELETE FROM t WHERE id = 1"}"#).unwrap();
        assert!(!input.confirmed);
    }

    #[test]
    fn test_write_input_aliases() {
        let input: WriteQueryInput = serde_json::from_str(
            r#"{"sql_query": "TRUNCATE t", "confirmed": true}"#,
        )
        .unwrap();
        assert_eq!(input.sql, "TRUNCATE t");
        assert!(input.confirmed);
    }
}
