//! Two-phase confirmation for mutating statements.
//!
//! A write-tool call is handled in one of three ways:
//! - proposed (`confirmed = false`): keyword-screened, then echoed back as a
//!   confirmation request with no database contact and no rate charge
//! - confirmed (`confirmed = true`): full safety policy, then one transaction
//! - rejected: the policy refused it at either stage
//!
//! Nothing is kept between calls. A proposal is discarded once returned and
//! the caller resubmits the statement with `confirmed = true`.

use crate::db::{ConnectionPool, QueryExecutor};
use crate::error::{GatewayError, GatewayResult};
use crate::models::{Query, QueryKind, WriteOutcome};
use crate::tools::classifier::QueryClassifier;
use crate::tools::guard::SafetyPolicy;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub(crate) const READ_ON_WRITE_PATH: &str =
    "SELECT queries should use execute_select_query tool instead.";

/// One write-tool invocation: the statement, its derived kind and the flag.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    query: Query,
    kind: QueryKind,
    confirmed: bool,
}

impl ConfirmationRequest {
    pub fn new(query: Query, kind: QueryKind, confirmed: bool) -> Self {
        Self {
            query,
            kind,
            confirmed,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }
}

pub struct ConfirmationGate {
    pool: Arc<ConnectionPool>,
    policy: Arc<SafetyPolicy>,
    classifier: QueryClassifier,
    executor: QueryExecutor,
}

impl ConfirmationGate {
    pub fn new(
        pool: Arc<ConnectionPool>,
        policy: Arc<SafetyPolicy>,
        executor: QueryExecutor,
    ) -> Self {
        let classifier = QueryClassifier::new(pool.backend());
        Self {
            pool,
            policy,
            classifier,
            executor,
        }
    }

    /// Classify `query` into a request. DQL is refused here.
    pub fn request(&self, query: Query, confirmed: bool) -> GatewayResult<ConfirmationRequest> {
        let kind = self.classifier.classify(query.sql())?;
        if kind.is_read_only() {
            return Err(GatewayError::invalid_input(READ_ON_WRITE_PATH));
        }
        Ok(ConfirmationRequest::new(query, kind, confirmed))
    }

    /// Classify and process one write-tool call.
    pub async fn submit(&self, query: Query, confirmed: bool) -> GatewayResult<WriteOutcome> {
        let request = self.request(query, confirmed)?;
        self.process(request).await
    }

    pub async fn process(&self, request: ConfirmationRequest) -> GatewayResult<WriteOutcome> {
        let ConfirmationRequest {
            query,
            kind,
            confirmed,
        } = request;

        if !confirmed {
            self.policy.screen(&query)?;
            debug!(caller = %query.caller(), kind = %kind, "Write proposed; awaiting confirmation");
            return Ok(WriteOutcome::ConfirmationRequired {
                kind,
                sql: query.sql().to_string(),
            });
        }

        self.policy.admit(&query).await?;

        let start = Instant::now();
        let rows_affected = self
            .executor
            .execute_write(&self.pool, query.sql())
            .await
            .inspect_err(|e| {
                warn!(caller = %query.caller(), kind = %kind, error = %e, "Write rolled back");
            })?;
        let elapsed = start.elapsed();

        info!(
            caller = %query.caller(),
            kind = %kind,
            rows_affected,
            elapsed_ms = elapsed.as_millis() as u64,
            "Write committed"
        );

        Ok(WriteOutcome::Executed {
            kind,
            rows_affected,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::models::CallerId;
    use crate::tools::guard::KeywordFilter;
    use crate::tools::rate_limit::RateLimiter;
    use std::time::Duration;
    use tempfile::TempPath;

    async fn gate(rate_limit: u32) -> (ConfirmationGate, Arc<ConnectionPool>, TempPath) {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let config = PoolConfig::sqlite(path.to_path_buf()).validated().unwrap();
        let pool = Arc::new(ConnectionPool::connect(config).await.unwrap());
        let policy = Arc::new(SafetyPolicy::new(
            KeywordFilter::new(["DROP DATABASE"]),
            RateLimiter::per_minute(rate_limit),
        ));
        let gate = ConfirmationGate::new(
            pool.clone(),
            policy,
            QueryExecutor::new(Duration::from_secs(5)),
        );
        (gate, pool, path)
    }

    fn query(sql: &str) -> Query {
        Query::new(sql, CallerId::new("gate-test"))
    }

    async fn count_rows(gate: &ConfirmationGate, pool: &ConnectionPool) -> serde_json::Value {
        let rows = gate
            .executor
            .fetch_read_only(pool, "SELECT COUNT(*) AS n FROM t", 10)
            .await
            .unwrap();
        rows.rows[0][0].clone()
    }

    #[tokio::test]
    async fn test_unconfirmed_write_has_no_effect() {
        let (gate, pool, _path) = gate(0).await;
        gate.submit(query("CREATE TABLE t (id INTEGER PRIMARY KEY)"), true)
            .await
            .unwrap();
        gate.submit(query("INSERT INTO t (id) VALUES (1)"), true)
            .await
            .unwrap();

        let outcome = gate
            .submit(query("DELETE FROM t WHERE id = 1"), false)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::ConfirmationRequired {
                kind: QueryKind::Dml,
                sql: "DELETE FROM t WHERE id = 1".to_string(),
            }
        );
        assert_eq!(count_rows(&gate, &pool).await, serde_json::json!(1));

        let outcome = gate
            .submit(query("DELETE FROM t WHERE id = 1"), true)
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected(), Some(1));
        assert_eq!(count_rows(&gate, &pool).await, serde_json::json!(0));
    }

    #[tokio::test]
    async fn test_select_refused_on_write_path() {
        let (gate, _pool, _path) = gate(0).await;
        let err = gate.submit(query("SELECT 1"), true).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput { .. }));
        assert!(err.to_string().contains("execute_select_query"));
    }

    #[tokio::test]
    async fn test_blocked_even_when_unconfirmed() {
        let (gate, _pool, _path) = gate(0).await;
        let err = gate
            .submit(query("drop   database prod"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BlockedQuery { .. }));
    }

    #[tokio::test]
    async fn test_proposals_are_not_charged() {
        let (gate, _pool, _path) = gate(1).await;
        for _ in 0..3 {
            let outcome = gate
                .submit(query("CREATE TABLE t (id INTEGER)"), false)
                .await
                .unwrap();
            assert!(outcome.is_confirmation_required());
        }
        gate.submit(query("CREATE TABLE t (id INTEGER)"), true)
            .await
            .unwrap();
        let err = gate
            .submit(query("DROP TABLE t"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_unknown_kind_requires_confirmation() {
        let (gate, _pool, _path) = gate(0).await;
        let outcome = gate.submit(query("VACUUM"), false).await.unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::ConfirmationRequired {
                kind: QueryKind::Unknown,
                sql: "VACUUM".to_string(),
            }
        );
    }
}
