//! Sliding window event log.
//!
//! The key holds a sorted set of request timestamps scored by themselves
//! at nanosecond resolution. Each check evicts everything at or before
//! `now - window`, counts what remains, and admits while the count stays
//! under the limit. The key's TTL is refreshed to twice the window so
//! idle keys clean themselves up without a pruning pass.
//!
//! The evict-count-add sequence is not atomic across operations; over a
//! distributed backend two racing checks can both observe `limit - 1`
//! events and both admit. Callers that need exactness under contention
//! should front the log with a server-side script.

use std::time::Duration;

use crate::algorithm::{ceil_secs, now_unix, now_unix_nanos};
use crate::decision::Decision;
use crate::error::Result;
use crate::storage::Storage;

/// Admit a request against the event log at `key`, allowing `limit`
/// requests per trailing `window`.
pub async fn allow<S: Storage>(
    storage: &S,
    key: &str,
    limit: i64,
    window: Duration,
) -> Result<Decision> {
    let now = now_unix_nanos();
    let horizon = now - window.as_nanos() as i64;

    storage
        .zrem_range_by_score(key, 0.0, horizon as f64)
        .await?;
    let mut count = storage.zcount(key, horizon as f64, now as f64).await?;

    let allowed = count < limit;
    if allowed {
        storage.zadd(key, now as f64, &now.to_string()).await?;
        count += 1;
    }
    storage.expire(key, window * 2).await?;

    let window_secs = ceil_secs(window);
    let reset = now_unix() + window_secs;
    let remaining = (limit - count).max(0);

    if allowed {
        Ok(Decision::allowed(limit, remaining, reset))
    } else {
        Ok(Decision::denied(limit, remaining, reset, window_secs))
    }
}
