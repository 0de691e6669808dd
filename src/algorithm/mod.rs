//! Rate limiting algorithm implementations.
//!
//! Each algorithm is a free async function over any [`Storage`] backend,
//! taking a derived counter key and its parameters and returning a
//! [`Decision`]. The engine dispatches between them with a single match
//! over the rule's [`Limit`](crate::rule::Limit) variant.
//!
//! | Algorithm | Accuracy | State per key | Burst |
//! |-----------|----------|---------------|-------|
//! | Fixed Window | Low (boundary bursts) | one counter | Poor |
//! | Sliding Window | High | one timestamp per request | Good |
//! | Token Bucket | High | two numbers | Excellent |
//!
//! [`Storage`]: crate::storage::Storage
//! [`Decision`]: crate::decision::Decision

pub mod fixed_window;
pub mod sliding_window;
pub mod token_bucket;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current Unix timestamp in seconds.
pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs() as i64
}

/// Current Unix timestamp in nanoseconds.
pub(crate) fn now_unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_nanos() as i64
}

/// Whole seconds of a duration, rounded up so that a freshly armed window
/// reports its full length.
pub(crate) fn ceil_secs(d: Duration) -> i64 {
    d.as_secs_f64().ceil() as i64
}
