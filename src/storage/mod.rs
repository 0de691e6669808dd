//! Storage backend trait and implementations.
//!
//! All rate limiting state lives behind the `Storage` trait: integer
//! counters, the sorted-set event log used by the sliding window, and the
//! atomic token bucket exchange. The engine itself holds no mutable state,
//! so many service instances sharing one backend cooperate on the same
//! quotas.
//!
//! Each algorithm relies on a subset of the surface:
//!
//! - fixed window: `incr`, `expire`, `ttl`
//! - sliding window: `zadd`, `zrem_range_by_score`, `zcount`, `expire`
//! - token bucket: `take_tokens`
//! - access control: `get`, `incr_by`, `set`, `del`, `expire`

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "memory")]
pub use memory::MemoryStorage;
#[cfg(feature = "redis")]
pub use redis::{RedisConfig, RedisStorage};

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Outcome of an atomic token bucket exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenTake {
    /// Whether the requested tokens were taken.
    pub allowed: bool,
    /// Tokens left in the bucket after the exchange.
    pub tokens: f64,
}

/// Storage backend trait for rate limiting state.
///
/// Every operation is atomic with respect to its key and operations on a
/// single key are linearizable; the algorithms depend on nothing stronger.
/// Composite sequences (the sliding window's evict-count-add) are *not*
/// atomic across operations.
///
/// All operations are async to support both local and distributed
/// backends. Implementations must be thread-safe (`Send + Sync`).
pub trait Storage: Send + Sync + 'static {
    /// Get an integer value. A missing or expired key reads as 0.
    fn get(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;

    /// Set an integer value, clearing any expiry on the key.
    fn set(&self, key: &str, value: i64) -> impl Future<Output = Result<()>> + Send;

    /// Delete a key. Succeeds even if the key didn't exist.
    fn del(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Atomically increment a counter by 1, creating it at 1 if missing.
    ///
    /// Returns the count AFTER incrementing.
    fn incr(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;

    /// Atomically increment a counter by `delta`.
    ///
    /// Returns the count AFTER incrementing.
    fn incr_by(&self, key: &str, delta: i64) -> impl Future<Output = Result<i64>> + Send;

    /// Set the expiry of an existing key. A no-op when the key is missing.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<()>> + Send;

    /// Remaining time to live of a key.
    ///
    /// Returns `None` when the key is missing or has no expiry set.
    fn ttl(&self, key: &str) -> impl Future<Output = Result<Option<Duration>>> + Send;

    /// Add a member to the sorted set at `key`, replacing its score if it
    /// already exists.
    fn zadd(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove sorted-set members with scores in `[min, max]` (inclusive).
    fn zrem_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Count sorted-set members with scores in `[min, max]` (inclusive).
    fn zcount(&self, key: &str, min: f64, max: f64) -> impl Future<Output = Result<i64>> + Send;

    /// Atomically refill and take from the token bucket at `key`.
    ///
    /// Backends must perform the whole exchange as one atomic unit:
    ///
    /// 1. Read `(tokens, last_time)`, defaulting to `(capacity, now)` when
    ///    the key is missing.
    /// 2. Refill: `tokens = min(capacity, tokens + max(0, now - last_time) * rate)`.
    /// 3. Take `requested` tokens when available, otherwise leave the
    ///    bucket untouched apart from the refill.
    /// 4. Persist the new state with `last_time = now` and arm `ttl`.
    ///
    /// The Redis backend runs these steps as a server-side script; the
    /// memory backend runs them under the entry lock.
    fn take_tokens(
        &self,
        key: &str,
        capacity: i64,
        rate: f64,
        now: i64,
        requested: f64,
        ttl: Duration,
    ) -> impl Future<Output = Result<TokenTake>> + Send;
}

impl<S: Storage> Storage for std::sync::Arc<S> {
    async fn get(&self, key: &str) -> Result<i64> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        (**self).del(key).await
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        (**self).incr(key).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        (**self).incr_by(key, delta).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        (**self).expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        (**self).ttl(key).await
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        (**self).zadd(key, score, member).await
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<()> {
        (**self).zrem_range_by_score(key, min, max).await
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<i64> {
        (**self).zcount(key, min, max).await
    }

    async fn take_tokens(
        &self,
        key: &str,
        capacity: i64,
        rate: f64,
        now: i64,
        requested: f64,
        ttl: Duration,
    ) -> Result<TokenTake> {
        (**self)
            .take_tokens(key, capacity, rate, now, requested, ttl)
            .await
    }
}
