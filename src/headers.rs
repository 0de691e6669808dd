//! HTTP headers for communicating rate limit status.
//!
//! Adapters translate a [`Decision`](crate::decision::Decision) into the
//! conventional `X-RateLimit-*` response headers, plus `Retry-After` on
//! denials. Verdicts that never evaluated a rule (whitelist or blacklist
//! hits) carry no quota and produce no quota headers.

use crate::decision::Decision;

/// Standard rate limit header names.
pub mod names {
    /// Maximum requests allowed per window.
    pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";

    /// Remaining requests in the current window.
    pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

    /// Unix timestamp when the quota restores.
    pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

    /// Seconds until the client should retry.
    pub const RETRY_AFTER: &str = "retry-after";
}

/// Builder for rate limit headers.
#[derive(Debug, Default)]
pub struct RateLimitHeaders {
    limit: Option<i64>,
    remaining: Option<i64>,
    reset: Option<i64>,
    retry_after: Option<i64>,
}

impl RateLimitHeaders {
    /// Create an empty header builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limit header.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the remaining header.
    pub fn remaining(mut self, remaining: i64) -> Self {
        self.remaining = Some(remaining);
        self
    }

    /// Set the reset header (unix timestamp).
    pub fn reset(mut self, reset: i64) -> Self {
        self.reset = Some(reset);
        self
    }

    /// Set the retry-after header (seconds).
    pub fn retry_after(mut self, seconds: i64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Convert to a vector of (name, value) pairs.
    pub fn to_vec(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();

        if let Some(limit) = self.limit {
            headers.push((names::RATE_LIMIT_LIMIT, limit.to_string()));
        }
        if let Some(remaining) = self.remaining {
            headers.push((names::RATE_LIMIT_REMAINING, remaining.to_string()));
        }
        if let Some(reset) = self.reset {
            headers.push((names::RATE_LIMIT_RESET, reset.to_string()));
        }
        if let Some(retry_after) = self.retry_after {
            headers.push((names::RETRY_AFTER, retry_after.to_string()));
        }

        headers
    }
}

impl From<&Decision> for RateLimitHeaders {
    fn from(decision: &Decision) -> Self {
        let mut headers = Self::new();
        if decision.has_quota() {
            headers = headers
                .limit(decision.limit)
                .remaining(decision.remaining)
                .reset(decision.reset);
        }
        if decision.retry_after > 0 {
            headers = headers.retry_after(decision.retry_after);
        }
        headers
    }
}
