//! Safety policy for the free-text SQL tools.
//!
//! Two gates run before any statement reaches the pool:
//! - `KeywordFilter`: a configured blocklist matched case-insensitively
//! - `RateLimiter`: per-caller call budget (see `rate_limit`)
//!
//! The keyword filter runs first. A blocked statement never charges the
//! caller's budget.

use crate::error::{GatewayError, GatewayResult};
use crate::models::Query;
use crate::tools::rate_limit::RateLimiter;
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::warn;

/// Collapse runs of whitespace into one space and uppercase the result.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Tokens joined by single spaces with comments dropped, uppercased.
///
/// Both backends read a comment as whitespace, so `DROP/**/TABLE` must
/// match `DROP TABLE`. `None` when the text does not tokenize.
fn strip_comments(text: &str) -> Option<String> {
    let tokens = Tokenizer::new(&GenericDialect {}, text).tokenize().ok()?;
    let words: Vec<String> = tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
        .map(|t| t.to_string())
        .collect();
    Some(words.join(" ").to_uppercase())
}

/// Rejects statements containing a blocklisted term.
///
/// Matching is a plain substring test on normalized text, so a blocked term
/// inside a comment or string literal still blocks the statement.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    /// (as configured, normalized)
    terms: Vec<(String, String)>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = keywords
            .into_iter()
            .filter_map(|k| {
                let original = k.as_ref().trim();
                let normalized = normalize(original);
                (!normalized.is_empty()).then(|| (original.to_string(), normalized))
            })
            .collect();
        Self { terms }
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|(original, _)| original.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Return the first configured term found in `sql`, either in the raw
    /// text or in its comment-free token form.
    pub fn find_match(&self, sql: &str) -> Option<&str> {
        if self.terms.is_empty() {
            return None;
        }
        let raw = normalize(sql);
        let tokens = strip_comments(sql);
        self.terms
            .iter()
            .find(|(_, needle)| {
                raw.contains(needle.as_str())
                    || tokens
                        .as_deref()
                        .is_some_and(|t| t.contains(needle.as_str()))
            })
            .map(|(original, _)| original.as_str())
    }

    pub fn check(&self, sql: &str) -> GatewayResult<()> {
        match self.find_match(sql) {
            Some(keyword) => Err(GatewayError::blocked(keyword)),
            None => Ok(()),
        }
    }
}

/// Keyword filter and rate limiter, applied in that order.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    filter: KeywordFilter,
    limiter: RateLimiter,
}

impl SafetyPolicy {
    pub fn new(filter: KeywordFilter, limiter: RateLimiter) -> Self {
        Self { filter, limiter }
    }

    pub fn filter(&self) -> &KeywordFilter {
        &self.filter
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Keyword gate only. Used for write proposals, which are never charged.
    pub fn screen(&self, query: &Query) -> GatewayResult<()> {
        self.filter.check(query.sql()).inspect_err(|e| {
            warn!(caller = %query.caller(), error = %e, "Statement blocked by keyword filter");
        })
    }

    /// Both gates. Charges the caller once the keyword gate passes.
    pub async fn admit(&self, query: &Query) -> GatewayResult<()> {
        self.screen(query)?;
        self.limiter.check(query.caller()).await
    }
}
