//! In-memory storage with garbage collection.
//!
//! This backend uses `DashMap` for thread-safe concurrent access. Expired
//! entries read as absent and are dropped lazily; a request-count
//! triggered sweep bounds memory when key churn outpaces reads.
//!
//! A single-process deployment backed by this store gets the same
//! semantics as a fleet sharing Redis, which makes it the backend of
//! choice for tests and single-instance services.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::{Storage, TokenTake};

/// How many operations pass between garbage collection sweeps.
const DEFAULT_GC_EVERY: u64 = 10_000;

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Zset(Vec<(f64, String)>),
    Bucket { tokens: f64, last_time: i64 },
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory storage backend.
///
/// # Example
///
/// ```ignore
/// use gatelimit::MemoryStorage;
///
/// let storage = MemoryStorage::new();
/// let count = storage.incr("login:ip:1.1.1.1").await?;
/// ```
pub struct MemoryStorage {
    data: DashMap<String, Entry>,
    gc_every: u64,
    op_count: AtomicU64,
    gc_lock: Mutex<()>,
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("entries", &self.data.len())
            .field("gc_every", &self.gc_every)
            .finish()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create a new memory storage with the default GC interval.
    pub fn new() -> Self {
        Self::with_gc_every(DEFAULT_GC_EVERY)
    }

    /// Create a new memory storage that sweeps expired entries every
    /// `ops` operations.
    pub fn with_gc_every(ops: u64) -> Self {
        Self {
            data: DashMap::new(),
            gc_every: ops.max(1),
            op_count: AtomicU64::new(0),
            gc_lock: Mutex::new(()),
        }
    }

    /// Number of entries currently stored, expired ones included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.data.retain(|_, entry| entry.live(now));
    }

    fn maybe_gc(&self) {
        let count = self.op_count.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % self.gc_every == 0 {
            if let Some(_guard) = self.gc_lock.try_lock() {
                self.purge_expired();
            }
        }
    }

    fn read_int(&self, key: &str) -> i64 {
        let now = Instant::now();
        match self.data.get(key) {
            Some(entry) if entry.live(now) => match entry.value {
                Value::Int(v) => v,
                _ => 0,
            },
            _ => 0,
        }
    }
}

impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<i64> {
        self.maybe_gc();
        Ok(self.read_int(key))
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        self.maybe_gc();
        self.data
            .insert(key.to_string(), Entry::new(Value::Int(value)));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.incr_by(key, 1).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.maybe_gc();
        let now = Instant::now();
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Int(0)));
        if !entry.live(now) {
            *entry = Entry::new(Value::Int(0));
        }
        let count = match &mut entry.value {
            Value::Int(v) => {
                *v += delta;
                *v
            }
            other => {
                *other = Value::Int(delta);
                delta
            }
        };
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        if let Some(mut entry) = self.data.get_mut(key) {
            if entry.live(now) {
                entry.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        Ok(self.data.get(key).and_then(|entry| {
            if entry.live(now) {
                entry.expires_at.map(|at| at - now)
            } else {
                None
            }
        }))
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        self.maybe_gc();
        let now = Instant::now();
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Zset(Vec::new())));
        if !entry.live(now) {
            *entry = Entry::new(Value::Zset(Vec::new()));
        }
        match &mut entry.value {
            Value::Zset(members) => {
                if let Some(existing) = members.iter_mut().find(|(_, m)| m == member) {
                    existing.0 = score;
                } else {
                    members.push((score, member.to_string()));
                }
            }
            other => *other = Value::Zset(vec![(score, member.to_string())]),
        }
        Ok(())
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<()> {
        let now = Instant::now();
        if let Some(mut entry) = self.data.get_mut(key) {
            if entry.live(now) {
                if let Value::Zset(members) = &mut entry.value {
                    members.retain(|(score, _)| *score < min || *score > max);
                }
            }
        }
        Ok(())
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<i64> {
        let now = Instant::now();
        Ok(match self.data.get(key) {
            Some(entry) if entry.live(now) => match &entry.value {
                Value::Zset(members) => members
                    .iter()
                    .filter(|(score, _)| *score >= min && *score <= max)
                    .count() as i64,
                _ => 0,
            },
            _ => 0,
        })
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
        self.maybe_gc();
        let wall = Instant::now();
        let mut entry = self.data.entry(key.to_string()).or_insert_with(|| {
            Entry::new(Value::Bucket {
                tokens: capacity as f64,
                last_time: now,
            })
        });
        if !entry.live(wall) || !matches!(entry.value, Value::Bucket { .. }) {
            *entry = Entry::new(Value::Bucket {
                tokens: capacity as f64,
                last_time: now,
            });
        }
        let Value::Bucket { tokens, last_time } = &mut entry.value else {
            unreachable!("bucket entry replaced above");
        };

        let delta = (now - *last_time).max(0) as f64;
        let mut refilled = (*tokens + delta * rate).min(capacity as f64);
        let allowed = refilled >= requested;
        if allowed {
            refilled -= requested;
        }
        *tokens = refilled;
        *last_time = now;
        entry.expires_at = Some(wall + ttl);

        Ok(TokenTake {
            allowed,
            tokens: refilled,
        })
    }
}
