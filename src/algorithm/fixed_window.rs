//! Fixed window counter.
//!
//! The first request in a window creates a counter with TTL equal to the
//! window; later requests increment it. The window rolls when the key
//! expires. Two back-to-back windows can each admit `limit` requests, so
//! any window-length interval straddling the boundary can see up to
//! `2 * limit` admissions; the sliding window exists for callers that
//! cannot tolerate that.

use std::time::Duration;

use crate::algorithm::{ceil_secs, now_unix};
use crate::decision::Decision;
use crate::error::Result;
use crate::storage::Storage;

/// Admit a request against the counter at `key`, allowing `limit`
/// requests per `window`.
pub async fn allow<S: Storage>(
    storage: &S,
    key: &str,
    limit: i64,
    window: Duration,
) -> Result<Decision> {
    let count = storage.incr(key).await?;
    if count == 1 {
        storage.expire(key, window).await?;
    }

    let ttl = match storage.ttl(key).await? {
        Some(ttl) => ttl,
        // A counter without an expiry would never roll over; re-arm it.
        None => {
            storage.expire(key, window).await?;
            window
        }
    };

    let ttl_secs = ceil_secs(ttl);
    let reset = now_unix() + ttl_secs;
    let remaining = (limit - count).max(0);

    if count <= limit {
        Ok(Decision::allowed(limit, remaining, reset))
    } else {
        Ok(Decision::denied(limit, remaining, reset, ttl_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_saturation() {
        let storage = MemoryStorage::new();
        let window = Duration::from_secs(60);

        let mut verdicts = Vec::new();
        for _ in 0..6 {
            let decision = allow(&storage, "fw:a", 3, window).await.unwrap();
            verdicts.push(decision.is_allowed());
        }
        assert_eq!(verdicts, [true, true, true, false, false, false]);
    }

    #[tokio::test]
    async fn test_remaining_and_retry_after() {
        let storage = MemoryStorage::new();
        let window = Duration::from_secs(60);

        let first = allow(&storage, "fw:b", 3, window).await.unwrap();
        assert_eq!(first.remaining, 2);

        allow(&storage, "fw:b", 3, window).await.unwrap();
        let third = allow(&storage, "fw:b", 3, window).await.unwrap();
        assert_eq!(third.remaining, 0);
        assert_eq!(third.retry_after, 0);

        let fourth = allow(&storage, "fw:b", 3, window).await.unwrap();
        assert!(fourth.is_denied());
        assert_eq!(fourth.remaining, 0);
        assert_eq!(fourth.retry_after, 60);
        assert!(fourth.reset > 0);
    }

    #[tokio::test]
    async fn test_window_rolls_over() {
        let storage = MemoryStorage::new();
        let window = Duration::from_millis(80);

        assert!(allow(&storage, "fw:c", 1, window).await.unwrap().is_allowed());
        assert!(allow(&storage, "fw:c", 1, window).await.unwrap().is_denied());

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(allow(&storage, "fw:c", 1, window).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_rearms_missing_expiry() {
        let storage = MemoryStorage::new();
        let window = Duration::from_secs(60);

        // simulate a counter that lost its window boundary
        storage.set("fw:d", 2).await.unwrap();

        let decision = allow(&storage, "fw:d", 5, window).await.unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.remaining, 2);
        assert!(storage.ttl("fw:d").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let storage = MemoryStorage::new();
        let window = Duration::from_secs(60);

        allow(&storage, "fw:e", 1, window).await.unwrap();
        assert!(allow(&storage, "fw:e", 1, window).await.unwrap().is_denied());
        assert!(allow(&storage, "fw:f", 1, window).await.unwrap().is_allowed());
    }
}
