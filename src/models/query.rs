//! Query-related data models.
//!
//! A `Query` is the immutable record of one free-text SQL submission. Its
//! `QueryKind` is always derived by the classifier, never supplied by callers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Statement category derived from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryKind {
    /// SELECT / WITH
    Dql,
    /// INSERT / UPDATE / DELETE
    Dml,
    /// CREATE / ALTER / DROP / TRUNCATE
    Ddl,
    Unknown,
}

impl QueryKind {
    /// Only DQL may run on the read path.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Dql)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dql => "DQL",
            Self::Dml => "DML",
            Self::Ddl => "DDL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity a rate-limit window is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallerId(String);

impl CallerId {
    const STDIO: &'static str = "stdio";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The single local peer of the stdio transport.
    pub fn stdio() -> Self {
        Self(Self::STDIO.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One submitted SQL statement. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct Query {
    sql: String,
    caller: CallerId,
    submitted_at: DateTime<Utc>,
}

impl Query {
    pub fn new(sql: impl Into<String>, caller: CallerId) -> Self {
        Self {
            sql: sql.into(),
            caller,
            submitted_at: Utc::now(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// Rows fetched for rendering.
///
/// Holds at most the row cap of decoded rows; `omitted` counts the rows the
/// database produced beyond that.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
    pub omitted: u64,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self {
            columns,
            rows,
            omitted: 0,
        }
    }

    /// Rows the statement returned, shown or not.
    pub fn total_rows(&self) -> u64 {
        self.rows.len() as u64 + self.omitted
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }
}

/// Result of a write-tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Proposed statement; nothing was executed.
    ConfirmationRequired { kind: QueryKind, sql: String },
    /// Confirmed statement committed.
    Executed {
        kind: QueryKind,
        rows_affected: u64,
        elapsed: Duration,
    },
}

impl WriteOutcome {
    pub fn is_confirmation_required(&self) -> bool {
        matches!(self, Self::ConfirmationRequired { .. })
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Executed { rows_affected, .. } => Some(*rows_affected),
            Self::ConfirmationRequired { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_kind_display() {
        assert_eq!(QueryKind::Dql.to_string(), "DQL");
        assert_eq!(QueryKind::Unknown.to_string(), "UNKNOWN");
        assert_eq!(serde_json::to_string(&QueryKind::Ddl).unwrap(), "\"DDL\"");
    }

    #[test]
    fn test_only_dql_is_read_only() {
        assert!(QueryKind::Dql.is_read_only());
        assert!(!QueryKind::Dml.is_read_only());
        assert!(!QueryKind::Ddl.is_read_only());
        assert!(!QueryKind::Unknown.is_read_only());
    }

    #[test]
    fn test_query_records_caller_and_time() {
        let before = Utc::now();
        let query = Query::new("SELECT 1", CallerId::new("session-a"));
        assert_eq!(query.sql(), "SELECT 1");
        assert_eq!(query.caller().as_str(), "session-a");
        assert!(query.submitted_at() >= before);
    }

    #[test]
    fn test_row_set_totals() {
        let mut rows = RowSet::new(vec!["id".into()], vec![vec![1.into()], vec![2.into()]]);
        rows.omitted = 3;
        assert_eq!(rows.total_rows(), 5);
        assert!(!rows.is_empty());
        assert!(RowSet::default().is_empty());
    }
}
