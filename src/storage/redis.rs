//! Redis storage backend for distributed rate limiting.
//!
//! Uses connection pooling for high throughput. Counters and the sliding
//! window log map directly onto Redis integers and sorted sets; the token
//! bucket exchange runs as a server-side Lua script so that refill and
//! take happen atomically across all engine instances.

use std::time::Duration;

use deadpool_redis::{
    redis::{cmd, AsyncCommands, Script},
    Config, Connection, Pool, PoolConfig, Runtime,
};

use crate::error::{RateLimitError, Result, StorageError};
use crate::storage::{Storage, TokenTake};

/// Refill-and-take exchange over a hash with `tokens` and `last_time`
/// fields. Tokens are returned as a string so fractional balances survive
/// the integer conversion Lua applies to numeric replies.
const TAKE_TOKENS_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local requested = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

local last_time = tonumber(redis.call('HGET', key, 'last_time') or now)
local tokens = tonumber(redis.call('HGET', key, 'tokens') or capacity)

local delta = math.max(0, now - last_time)
tokens = math.min(capacity, tokens + delta * rate)

local allowed = tokens >= requested
if allowed then
    tokens = tokens - requested
end

redis.call('HSET', key, 'tokens', tokens, 'last_time', now)
redis.call('EXPIRE', key, ttl)

return {allowed and 1 or 0, tostring(tokens)}
"#;

/// Redis storage configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g. `redis://localhost:6379`).
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// Prefix prepended to every key.
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            key_prefix: "rl:".to_string(),
        }
    }
}

impl RedisConfig {
    /// Create a new Redis configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the pool size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }
}

/// Redis storage backend.
///
/// # Example
///
/// ```ignore
/// use gatelimit::storage::{RedisConfig, RedisStorage};
///
/// let config = RedisConfig::new("redis://localhost:6379")
///     .with_prefix("myapp:rl:")
///     .with_pool_size(20);
///
/// let storage = RedisStorage::new(config).await?;
/// ```
pub struct RedisStorage {
    pool: Pool,
    key_prefix: String,
}

impl std::fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorage")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

fn op_err(op: &'static str) -> impl FnOnce(deadpool_redis::redis::RedisError) -> RateLimitError {
    move |e| StorageError::operation_failed(op, e.to_string()).into()
}

impl RedisStorage {
    /// Create a new Redis storage from configuration.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(PoolConfig::new(config.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        // Fail fast when the server is unreachable.
        let mut conn = pool
            .get()
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        let _: () = cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            pool,
            key_prefix: config.key_prefix,
        })
    }

    /// Create a new Redis storage from a URL with default settings.
    pub async fn from_url(url: impl Into<String>) -> Result<Self> {
        Self::new(RedisConfig::new(url)).await
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|_| StorageError::PoolExhausted.into())
    }
}

impl Storage for RedisStorage {
    async fn get(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        let value: Option<i64> = conn.get(self.full_key(key)).await.map_err(op_err("GET"))?;
        Ok(value.unwrap_or(0))
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set(self.full_key(key), value)
            .await
            .map_err(op_err("SET"))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(self.full_key(key)).await.map_err(op_err("DEL"))?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        conn.incr(self.full_key(key), 1).await.map_err(op_err("INCR"))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn().await?;
        conn.incr(self.full_key(key), delta)
            .await
            .map_err(op_err("INCRBY"))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .expire(self.full_key(key), ttl.as_secs().max(1) as i64)
            .await
            .map_err(op_err("EXPIRE"))?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn().await?;
        let secs: i64 = conn.ttl(self.full_key(key)).await.map_err(op_err("TTL"))?;
        // -2 = missing, -1 = no expiry
        if secs < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_secs(secs as u64)))
        }
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .zadd(self.full_key(key), member, score)
            .await
            .map_err(op_err("ZADD"))?;
        Ok(())
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .zrembyscore(self.full_key(key), min, max)
            .await
            .map_err(op_err("ZREMRANGEBYSCORE"))?;
        Ok(())
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<i64> {
        let mut conn = self.conn().await?;
        conn.zcount(self.full_key(key), min, max)
            .await
            .map_err(op_err("ZCOUNT"))
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
        let mut conn = self.conn().await?;
        let (allowed, tokens): (i64, String) = Script::new(TAKE_TOKENS_SCRIPT)
            .key(self.full_key(key))
            .arg(capacity)
            .arg(rate)
            .arg(now)
            .arg(requested)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut *conn)
            .await
            .map_err(op_err("EVAL"))?;

        let tokens: f64 = tokens
            .parse()
            .map_err(|_| StorageError::operation_failed("EVAL", "malformed script reply"))?;

        Ok(TokenTake {
            allowed: allowed == 1,
            tokens,
        })
    }
}
