//! Token bucket.
//!
//! Each key stores a token balance and the time of its last refill. A
//! check refills at `rate` tokens per second (capped at `capacity`), then
//! takes one token when available. The whole exchange runs atomically in
//! the storage backend, so concurrent engine instances never double-spend
//! a token.

use std::time::Duration;

use crate::algorithm::now_unix;
use crate::decision::Decision;
use crate::error::Result;
use crate::storage::Storage;

/// Extra key lifetime beyond a full refill, so a bucket is not evicted
/// between a deny and the retry it advertised.
const TTL_SLACK_SECS: i64 = 60;

/// Admit a request against the bucket at `key` with the given `capacity`
/// and refill `rate` in tokens per second.
pub async fn allow<S: Storage>(
    storage: &S,
    key: &str,
    capacity: i64,
    rate: f64,
) -> Result<Decision> {
    let now = now_unix();
    let full_refill_secs = (capacity as f64 / rate).ceil() as i64;
    let ttl = Duration::from_secs((full_refill_secs + TTL_SLACK_SECS) as u64);

    let take = storage
        .take_tokens(key, capacity, rate, now, 1.0, ttl)
        .await?;

    let remaining = take.tokens.floor() as i64;
    let reset = now + full_refill_secs;

    if take.allowed {
        Ok(Decision::allowed(capacity, remaining, reset))
    } else {
        // Advertise at least one second; clients treat 0 as "immediately"
        // and hot-loop.
        let retry_after = (((1.0 - take.tokens) / rate).ceil() as i64).max(1);
        Ok(Decision::denied(capacity, remaining, reset, retry_after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_burst_up_to_capacity() {
        let storage = MemoryStorage::new();

        for i in 1..=5 {
            let decision = allow(&storage, "tb:a", 5, 1.0).await.unwrap();
            assert!(decision.is_allowed(), "request {} should be allowed", i);
        }
        let decision = allow(&storage, "tb:a", 5, 1.0).await.unwrap();
        assert!(decision.is_denied());
        assert_eq!(decision.retry_after, 1);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn test_remaining_counts_down() {
        let storage = MemoryStorage::new();

        let first = allow(&storage, "tb:b", 3, 0.5).await.unwrap();
        assert_eq!(first.remaining, 2);
        let second = allow(&storage, "tb:b", 3, 0.5).await.unwrap();
        assert_eq!(second.remaining, 1);
        assert_eq!(second.limit, 3);
    }

    #[tokio::test]
    async fn test_refill_readmits() {
        let storage = MemoryStorage::new();

        for _ in 0..3 {
            allow(&storage, "tb:c", 3, 2.0).await.unwrap();
        }
        assert!(allow(&storage, "tb:c", 3, 2.0).await.unwrap().is_denied());

        // at 2 tokens/s, well over one token accrues across this sleep
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        let decision = allow(&storage, "tb:c", 3, 2.0).await.unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn test_slow_rate_reports_long_retry() {
        let storage = MemoryStorage::new();

        assert!(allow(&storage, "tb:d", 1, 0.1).await.unwrap().is_allowed());
        let decision = allow(&storage, "tb:d", 1, 0.1).await.unwrap();
        assert!(decision.is_denied());
        // an empty bucket at 0.1 tokens/s needs ten seconds per token
        assert_eq!(decision.retry_after, 10);
        assert!(decision.reset >= decision.retry_after);
    }
}
