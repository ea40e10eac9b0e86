//! Shared setup for the SQLite-backed integration tests.

#![allow(dead_code)]

use sql_gateway_mcp::config::{PoolConfig, QueryLimits};
use sql_gateway_mcp::db::ConnectionPool;
use sql_gateway_mcp::models::CallerId;
use sql_gateway_mcp::tools::write::WriteQueryInput;
use sql_gateway_mcp::tools::{GatewayTools, KeywordFilter, RateLimiter, SafetyPolicy};
use std::sync::Arc;
use tempfile::{NamedTempFile, TempPath};

pub const BLOCKED: &[&str] = &["DROP DATABASE", "DROP SCHEMA"];

/// A gateway over a fresh SQLite file. The file lives as long as this value.
pub struct TestGateway {
    pub tools: Arc<GatewayTools>,
    _path: TempPath,
}

impl TestGateway {
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        self.tools.pool()
    }
}

pub struct GatewayBuilder {
    rate_limit: u32,
    blocked: Vec<String>,
    limits: QueryLimits,
    pool_size: u32,
    max_overflow: u32,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self {
            rate_limit: 0,
            blocked: BLOCKED.iter().map(|s| s.to_string()).collect(),
            limits: QueryLimits::default(),
            pool_size: 2,
            max_overflow: 2,
        }
    }
}

impl GatewayBuilder {
    pub fn rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit = per_minute;
        self
    }

    pub fn blocked(mut self, keywords: &[&str]) -> Self {
        self.blocked = keywords.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn row_cap(mut self, row_cap: u32) -> Self {
        self.limits.row_cap = row_cap;
        self
    }

    pub async fn build(self) -> TestGateway {
        let path = NamedTempFile::new().unwrap().into_temp_path();
        let config = PoolConfig::sqlite(path.to_path_buf())
            .with_size(self.pool_size, self.max_overflow)
            .validated()
            .unwrap();
        let pool = Arc::new(ConnectionPool::connect(config).await.unwrap());
        let policy = Arc::new(SafetyPolicy::new(
            KeywordFilter::new(&self.blocked),
            RateLimiter::per_minute(self.rate_limit),
        ));
        TestGateway {
            tools: Arc::new(GatewayTools::new(pool, policy, self.limits)),
            _path: path,
        }
    }
}

pub async fn gateway() -> TestGateway {
    GatewayBuilder::default().build().await
}

pub fn caller(id: &str) -> CallerId {
    CallerId::new(id)
}

/// Run confirmed writes as a setup caller.
pub async fn seed(gateway: &TestGateway, statements: &[&str]) {
    let setup = caller("setup");
    for sql in statements {
        gateway
            .tools
            .execute_write_query(
                &setup,
                WriteQueryInput {
                    sql: sql.to_string(),
                    confirmed: true,
                },
            )
            .await
            .unwrap_or_else(|e| panic!("seeding `{sql}` failed: {e}"));
    }
}

pub const USERS_SCHEMA: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, nickname VARCHAR(30), active BOOLEAN DEFAULT 1)",
    "INSERT INTO users (id, email, nickname, active) VALUES (1, 'ada@example.com', 'ada', 1), (2, 'bob@example.com', NULL, 0)",
];

/// Cells of the first ASCII table in `text`, header row excluded.
pub fn table_rows(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .skip_while(|l| !l.starts_with('+'))
        .take_while(|l| l.starts_with('+') || l.starts_with('|'))
        .filter(|l| l.starts_with('|'))
        .skip(1)
        .map(|l| {
            l.trim_matches('|')
                .split('|')
                .map(|cell| cell.trim().to_string())
                .collect()
        })
        .collect()
}
