//! Embeddable request rate limiting engine for network services.
//!
//! `gatelimit` admits or rejects requests against a declarative policy of
//! rules that partition traffic by identity (caller IP, authenticated
//! user) and target (path, method), with:
//!
//! - **Three algorithms**: fixed window, sliding window, and token bucket
//! - **Pluggable storage**: in-memory with GC, or Redis with connection
//!   pooling so many service instances cooperate on the same quotas
//! - **Access control**: static whitelists/blacklists plus an auto-ban
//!   loop that promotes repeat offenders into a time-boxed blacklist
//! - **Framework integration**: Axum/Tower middleware
//!
//! # Quick Start
//!
//! ```ignore
//! use gatelimit::{Descriptor, Limiter, MemoryStorage, PolicyConfig};
//!
//! #[tokio::main]
//! async fn main() -> gatelimit::Result<()> {
//!     let config = PolicyConfig::from_yaml(r#"
//!         default:
//!           enabled: true
//!         rules:
//!           - name: login
//!             path: /api/login
//!             method: POST
//!             by: ip
//!             limit: 5
//!             window: 1m
//!     "#)?;
//!     let limiter = Limiter::from_config(&config, MemoryStorage::new())?;
//!
//!     let decision = limiter
//!         .check(Descriptor::new("/api/login", "POST", "1.2.3.4", ""))
//!         .await?;
//!     if decision.is_denied() {
//!         println!("rate limited, retry after {}s", decision.retry_after);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Algorithms
//!
//! | Algorithm | Best For | State per key |
//! |-----------|----------|---------------|
//! | Fixed Window | Simple quotas | one counter |
//! | Sliding Window | Boundary-burst-free quotas | one timestamp per request |
//! | Token Bucket | Bursty traffic with an average rate | two numbers |
//!
//! # Feature Flags
//!
//! - `memory` (default): in-memory storage with garbage collection
//! - `redis`: Redis storage backend
//! - `axum`: Axum middleware integration

pub mod acl;
pub mod algorithm;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod headers;
pub mod rule;
pub mod storage;

#[cfg(feature = "axum")]
pub mod middleware;

// Re-export main types
pub use acl::{AccessControl, AutoBan};
pub use config::{Policy, PolicyConfig};
pub use decision::Decision;
pub use engine::{Descriptor, Limiter};
pub use error::{ConfigError, RateLimitError, Result, StorageError};
pub use headers::RateLimitHeaders;
pub use rule::{Limit, LimitBy, Rule};
pub use storage::{Storage, TokenTake};

#[cfg(feature = "memory")]
pub use storage::MemoryStorage;

#[cfg(feature = "redis")]
pub use storage::{RedisConfig, RedisStorage};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::acl::{AccessControl, AutoBan};
    pub use crate::config::{Policy, PolicyConfig};
    pub use crate::decision::Decision;
    pub use crate::engine::{Descriptor, Limiter};
    pub use crate::error::{RateLimitError, Result};
    pub use crate::rule::{Limit, LimitBy, Rule};
    pub use crate::storage::Storage;

    #[cfg(feature = "memory")]
    pub use crate::storage::MemoryStorage;

    #[cfg(feature = "redis")]
    pub use crate::storage::{RedisConfig, RedisStorage};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn test_integration_yaml_policy() {
        let config = PolicyConfig::from_yaml(
            r#"
default:
  algorithm: fixed_window
  enabled: true
rules:
  - name: api
    path: /api/*
    by: ip
    limit: 2
    window: 60s
"#,
        )
        .unwrap();
        let limiter = Limiter::from_config(&config, MemoryStorage::new()).unwrap();

        let request = Descriptor::new("/api/data", "GET", "1.1.1.1", "");
        assert!(limiter.check(request).await.unwrap().is_allowed());
        assert!(limiter.check(request).await.unwrap().is_allowed());

        let decision = limiter.check(request).await.unwrap();
        assert!(decision.is_denied());
        assert_eq!(decision.limit, 2);
        assert_eq!(decision.retry_after, 60);
    }

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn test_integration_headers_from_decision() {
        use crate::headers::{names, RateLimitHeaders};

        let config = PolicyConfig::from_yaml(
            r#"
default:
  enabled: true
rules:
  - name: data
    path: /data
    by: ip
    limit: 10
    window: 60s
"#,
        )
        .unwrap();
        let limiter = Limiter::from_config(&config, MemoryStorage::new()).unwrap();

        let decision = limiter
            .check(Descriptor::new("/data", "GET", "1.1.1.1", ""))
            .await
            .unwrap();
        let headers = RateLimitHeaders::from(&decision).to_vec();

        assert!(headers
            .iter()
            .any(|(k, v)| *k == names::RATE_LIMIT_LIMIT && v == "10"));
        assert!(headers
            .iter()
            .any(|(k, v)| *k == names::RATE_LIMIT_REMAINING && v == "9"));
        assert!(headers.iter().any(|(k, _)| *k == names::RATE_LIMIT_RESET));
    }
}
