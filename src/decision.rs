//! Decision type returned by every rate limit check.
//!
//! A `Decision` carries the verdict plus the observability fields an HTTP
//! adapter needs to populate `X-RateLimit-*` and `Retry-After` headers.
//! Verdicts produced by the access-control layer (or by a disabled policy)
//! carry zeroed quota fields, since no rule was ever evaluated for them.

/// The result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Effective quota of the deciding rule (`limit` or `capacity`);
    /// 0 when the verdict came from access control.
    pub limit: i64,
    /// Remaining quota, never negative.
    pub remaining: i64,
    /// Unix timestamp (seconds) when the quota fully restores or the
    /// window ends.
    pub reset: i64,
    /// Seconds the caller should wait before retrying; 0 when allowed.
    pub retry_after: i64,
}

impl Decision {
    /// An admission with quota fields from the deciding rule.
    pub fn allowed(limit: i64, remaining: i64, reset: i64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: remaining.max(0),
            reset,
            retry_after: 0,
        }
    }

    /// A denial with quota fields from the deciding rule.
    pub fn denied(limit: i64, remaining: i64, reset: i64, retry_after: i64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: remaining.max(0),
            reset,
            retry_after: retry_after.max(0),
        }
    }

    /// An admission without rule evaluation (whitelist hit, disabled
    /// policy, or no matching rule).
    pub fn pass() -> Self {
        Self::allowed(0, 0, 0)
    }

    /// A denial without rule evaluation (blacklist or dynamic ban hit).
    pub fn blocked() -> Self {
        Self::denied(0, 0, 0, 0)
    }

    /// Check if the request is admitted.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Check if the request is denied.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// Whether the verdict carries quota information from a rule.
    pub fn has_quota(&self) -> bool {
        self.limit > 0
    }
}
