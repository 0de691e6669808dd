//! Rule model: matching, dimensions, and counter key derivation.
//!
//! A [`Rule`] pairs a match predicate (path pattern + method) with one
//! limiter's parameters and a recipe for deriving the storage key that
//! partitions its counters. Rules are compiled once at policy load and
//! never mutated afterwards.

use std::time::Duration;

/// Identity dimension a rule partitions its counters by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitBy {
    /// Per caller IP address.
    Ip,
    /// Per authenticated user; anonymous callers degrade to per-IP so
    /// they are still bounded.
    User,
    /// Per request path.
    Path,
    /// One shared counter for all matching traffic.
    Global,
    /// No dimension suffix; the rule name alone namespaces the counter.
    Custom,
}

/// Limiter parameters, one variant per algorithm.
///
/// Exactly one parameter set exists by construction; the policy loader
/// rejects configurations that mix them.
#[derive(Debug, Clone, PartialEq)]
pub enum Limit {
    /// Counter with a wall-clock-anchored window.
    FixedWindow {
        /// Admissions per window.
        limit: i64,
        /// Window length.
        window: Duration,
    },
    /// Event log over the trailing window.
    SlidingWindow {
        /// Admissions per trailing window.
        limit: i64,
        /// Window length.
        window: Duration,
    },
    /// Refilling token balance.
    TokenBucket {
        /// Maximum token balance.
        capacity: i64,
        /// Refill rate in tokens per second.
        rate: f64,
    },
}

impl Limit {
    /// The effective quota advertised in decisions: the window limit or
    /// the bucket capacity.
    pub fn quota(&self) -> i64 {
        match self {
            Self::FixedWindow { limit, .. } | Self::SlidingWindow { limit, .. } => *limit,
            Self::TokenBucket { capacity, .. } => *capacity,
        }
    }
}

/// A compiled rate limiting rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Key namespace when non-empty; the request path is used otherwise.
    pub name: String,
    /// Path pattern; exact match or `*` glob (a wildcard never crosses `/`).
    pub path: String,
    /// Upper-cased HTTP method; empty matches any method.
    pub method: String,
    /// Identity dimension for counter partitioning.
    pub by: LimitBy,
    /// Limiter parameters.
    pub limit: Limit,
    /// Whether a denial by this rule feeds the auto-ban loop.
    pub record_violation: bool,
    /// Increment applied to the violation counter on a denial.
    pub violation_weight: i64,
}

impl Rule {
    /// Whether this rule applies to the given request path and method.
    pub fn matches(&self, path: &str, method: &str) -> bool {
        if !match_path(&self.path, path) {
            return false;
        }
        self.method.is_empty() || self.method == method
    }

    /// Derive the storage key partitioning this rule's counters.
    pub fn build_key(&self, path: &str, ip: &str, user: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        parts.push(if self.name.is_empty() { path } else { &self.name });

        match self.by {
            LimitBy::Ip => {
                parts.push("ip");
                parts.push(ip);
            }
            LimitBy::User => {
                if user.is_empty() {
                    parts.push("ip");
                    parts.push(ip);
                } else {
                    parts.push("user");
                    parts.push(user);
                }
            }
            LimitBy::Path => {
                parts.push("path");
                parts.push(path);
            }
            LimitBy::Global => parts.push("global"),
            LimitBy::Custom => {}
        }

        parts.join(":")
    }
}

/// Match `path` against `pattern`.
///
/// An exact literal match wins first. Otherwise `*` matches any run of
/// characters within a single path segment, so `/a/*/b` matches
/// `/a/v1/b` but not `/a/v1/w/b`.
pub fn match_path(pattern: &str, path: &str) -> bool {
    if pattern == path {
        return !pattern.is_empty();
    }
    if !pattern.contains('*') {
        return false;
    }

    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    if pattern_segments.len() != path_segments.len() {
        return false;
    }

    pattern_segments
        .iter()
        .zip(&path_segments)
        .all(|(p, s)| segment_matches(p, s))
}

/// Glob match within one segment, `*` matching any (possibly empty) run.
fn segment_matches(pattern: &str, segment: &str) -> bool {
    let p: Vec<u8> = pattern.bytes().collect();
    let s: Vec<u8> = segment.bytes().collect();
    let (mut pi, mut si) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while si < s.len() {
        if pi < p.len() && p[pi] == b'*' {
            backtrack = Some((pi, si));
            pi += 1;
        } else if pi < p.len() && p[pi] == s[si] {
            pi += 1;
            si += 1;
        } else if let Some((star, mark)) = backtrack {
            pi = star + 1;
            si = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}
