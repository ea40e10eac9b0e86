//! Startup health check (`--health-check`).
//!
//! Validates configuration, connects and pings the database, then runs the
//! read-only tools once against it. The binary exits non-zero when any check
//! fails.

use crate::config::Config;
use crate::db::ConnectionPool;
use crate::models::CallerId;
use crate::tools::query::SelectQueryInput;
use crate::tools::schema::ListTablesInput;
use crate::tools::{GatewayTools, KeywordFilter, RateLimiter, SafetyPolicy};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Characters of tool output kept as a preview.
const PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    pub fn passed(&self) -> bool {
        !self.checks.is_empty() && self.checks.iter().all(|c| c.passed)
    }

    fn push(&mut self, check: CheckResult) {
        self.checks.push(check);
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SQL GATEWAY HEALTH CHECK")?;
        writeln!(f, "{}", "=".repeat(60))?;
        for check in &self.checks {
            let mark = if check.passed { "PASS" } else { "FAIL" };
            writeln!(f, "[{}] {}: {}", mark, check.name, check.detail)?;
        }
        writeln!(f, "{}", "=".repeat(60))?;
        if self.passed() {
            write!(f, "ALL CHECKS PASSED")
        } else {
            write!(f, "SOME CHECKS FAILED")
        }
    }
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

/// Run every check. Later checks are skipped once one they depend on fails.
pub async fn run_health_check(config: &Config) -> HealthReport {
    let mut report = HealthReport::default();

    let pool_config = match config.pool_config() {
        Ok(pool_config) => {
            report.push(CheckResult::pass(
                "Configuration",
                pool_config.target().describe(),
            ));
            pool_config
        }
        Err(e) => {
            report.push(CheckResult::fail("Configuration", e.to_string()));
            return report;
        }
    };

    let pool = match ConnectionPool::connect(pool_config).await {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            report.push(CheckResult::fail("Database connection", e.to_string()));
            return report;
        }
    };

    match pool.health_check().await {
        Ok(status) => report.push(CheckResult::pass(
            "Database connection",
            format!(
                "{} ({}), ping {} ms",
                status.backend,
                status.server_version.as_deref().unwrap_or("unknown version"),
                status.ping_ms.unwrap_or_default()
            ),
        )),
        Err(e) => {
            report.push(CheckResult::fail("Database connection", e.to_string()));
            pool.close().await;
            return report;
        }
    }

    // The smoke test must not consume a real caller's budget.
    let policy = Arc::new(SafetyPolicy::new(
        KeywordFilter::new(&config.blocked_keywords),
        RateLimiter::disabled(),
    ));
    let tools = GatewayTools::new(pool.clone(), policy, config.query_limits());
    let caller = CallerId::new("health-check");

    let results = [
        ("list_schemas", tools.list_schemas().await),
        (
            "list_tables",
            tools.list_tables(ListTablesInput::default()).await,
        ),
        (
            "execute_select_query",
            tools
                .execute_select_query(
                    &caller,
                    SelectQueryInput {
                        sql: "SELECT 1 AS test".to_string(),
                    },
                )
                .await,
        ),
    ];
    for (name, result) in results {
        report.push(match result {
            Ok(text) => CheckResult::pass(name, preview(&text)),
            Err(e) => CheckResult::fail(name, e.to_string()),
        });
    }

    pool.close().await;
    info!(passed = report.passed(), "Health check finished");
    report
}
