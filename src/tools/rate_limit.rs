//! Per-caller rate limiting.
//!
//! Fixed one-minute windows keyed by caller identity. The window table is
//! shared by every clone of the limiter and updated under a single mutex, so
//! a burst of concurrent calls from one caller can never be undercounted.

use crate::error::{GatewayError, GatewayResult};
use crate::models::CallerId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Length of one counting window.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Interval between sweeps of expired windows.
const CLEANUP_INTERVAL_SECS: u64 = 300;

/// Calls counted for one caller in the current window.
#[derive(Debug, Clone, Copy)]
struct RateLimitWindow {
    count: u32,
    started: Instant,
}

impl RateLimitWindow {
    fn fresh(now: Instant) -> Self {
        Self {
            count: 0,
            started: now,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.started) >= window
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<CallerId, RateLimitWindow>>>,
}

impl RateLimiter {
    /// Limit each caller to `max_per_minute` calls. Zero disables limiting.
    pub fn per_minute(max_per_minute: u32) -> Self {
        Self {
            max_per_window: max_per_minute,
            window: RATE_LIMIT_WINDOW,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn disabled() -> Self {
        Self::per_minute(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_per_window > 0
    }

    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    /// Count one call for `caller`.
    ///
    /// Fails with `RateLimitExceeded` once the caller has used up the current
    /// window; the rejected call is not counted. The retry hint is the time
    /// left until the window resets.
    pub async fn check(&self, caller: &CallerId) -> GatewayResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let entry = windows
            .entry(caller.clone())
            .or_insert_with(|| RateLimitWindow::fresh(now));

        if entry.is_expired(now, self.window) {
            *entry = RateLimitWindow::fresh(now);
        }

        if entry.count >= self.max_per_window {
            let retry_after = self.window.saturating_sub(now.duration_since(entry.started));
            warn!(
                caller = %caller,
                limit = self.max_per_window,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            return Err(GatewayError::rate_limited(caller.as_str(), retry_after));
        }

        entry.count += 1;
        debug!(caller = %caller, count = entry.count, limit = self.max_per_window, "Rate limit charged");
        Ok(())
    }

    /// Calls left for `caller` in its current window.
    pub async fn remaining(&self, caller: &CallerId) -> u32 {
        if !self.is_enabled() {
            return u32::MAX;
        }
        let now = Instant::now();
        let windows = self.windows.lock().await;
        match windows.get(caller) {
            Some(w) if !w.is_expired(now, self.window) => {
                self.max_per_window.saturating_sub(w.count)
            }
            _ => self.max_per_window,
        }
    }

    /// Drop windows that have elapsed. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| !w.is_expired(now, self.window));
        before - windows.len()
    }

    /// Start background task to sweep expired windows.
    pub fn start_cleanup_task(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                let removed = limiter.prune().await;
                if removed > 0 {
                    debug!(removed, "Pruned expired rate-limit windows");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn caller(id: &str) -> CallerId {
        CallerId::new(id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_over_limit_rejected_until_window_resets() {
        let limiter = RateLimiter::per_minute(3);
        let a = caller("a");

        for _ in 0..3 {
            assert_ok!(limiter.check(&a).await);
        }
        let err = limiter.check(&a).await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(45)).await;
        let err = limiter.check(&a).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(15)));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_ok!(limiter.check(&a).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callers_are_counted_separately() {
        let limiter = RateLimiter::per_minute(1);
        assert_ok!(limiter.check(&caller("a")).await);
        assert_err!(limiter.check(&caller("a")).await);
        assert_ok!(limiter.check(&caller("b")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_calls_are_not_counted() {
        let limiter = RateLimiter::per_minute(2);
        let a = caller("a");
        assert_ok!(limiter.check(&a).await);
        assert_ok!(limiter.check(&a).await);
        for _ in 0..5 {
            assert_err!(limiter.check(&a).await);
        }
        assert_eq!(limiter.remaining(&a).await, 0);

        tokio::time::advance(RATE_LIMIT_WINDOW).await;
        assert_eq!(limiter.remaining(&a).await, 2);
    }

    #[tokio::test]
    async fn test_zero_disables_limiting() {
        let limiter = RateLimiter::disabled();
        for _ in 0..1000 {
            assert_ok!(limiter.check(&caller("a")).await);
        }
    }

    #[tokio::test]
    async fn test_concurrent_burst_is_not_undercounted() {
        let limiter = RateLimiter::per_minute(10);
        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.check(&CallerId::new("burst")).await.is_ok()
            }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_removes_expired_windows() {
        let limiter = RateLimiter::per_minute(5);
        assert_ok!(limiter.check(&caller("a")).await);
        assert_ok!(limiter.check(&caller("b")).await);
        assert_eq!(limiter.prune().await, 0);

        tokio::time::advance(RATE_LIMIT_WINDOW).await;
        assert_eq!(limiter.prune().await, 2);
    }
}
