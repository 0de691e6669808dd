//! The per-request decision engine.
//!
//! [`Limiter`] owns a compiled [`Policy`] and a storage backend and
//! produces one [`Decision`] per request. The pipeline runs in a fixed
//! order and short-circuits on the first terminal verdict:
//!
//! 1. master switch
//! 2. user blacklist / dynamic ban, then user whitelist
//! 3. IP blacklist / dynamic ban, then IP whitelist
//! 4. global rule
//! 5. matching rules in declaration order
//!
//! User identity outranks network origin: a whitelisted account is
//! admitted even from a denied address, and a blacklisted account stays
//! blocked from any address. Denials by violation-recording rules feed
//! the auto-ban loop before the decision is returned.
//!
//! The engine holds no per-request mutable state; everything shared
//! lives in storage, so any number of handler tasks (and service
//! instances) can call [`Limiter::check`] concurrently.

use tracing::{debug, info};

use crate::algorithm::{fixed_window, sliding_window, token_bucket};
use crate::config::{Policy, PolicyConfig};
use crate::decision::Decision;
use crate::error::Result;
use crate::rule::{Limit, Rule};
use crate::storage::Storage;

/// The identity and target of one incoming request.
///
/// HTTP adapters extract these four fields; empty strings mean "not
/// present" (no authenticated user, unknown peer address).
#[derive(Debug, Clone, Copy, Default)]
pub struct Descriptor<'a> {
    /// Request path.
    pub path: &'a str,
    /// Upper-cased HTTP method.
    pub method: &'a str,
    /// Caller IP address.
    pub ip: &'a str,
    /// Authenticated user identifier.
    pub user: &'a str,
}

impl<'a> Descriptor<'a> {
    /// Create a request descriptor.
    pub fn new(path: &'a str, method: &'a str, ip: &'a str, user: &'a str) -> Self {
        Self {
            path,
            method,
            ip,
            user,
        }
    }
}

/// The rate limiting engine.
///
/// # Example
///
/// ```ignore
/// use gatelimit::{Descriptor, Limiter, MemoryStorage, PolicyConfig};
///
/// let config = PolicyConfig::from_file("ratelimit.yaml")?;
/// let limiter = Limiter::from_config(&config, MemoryStorage::new())?;
///
/// let decision = limiter
///     .check(Descriptor::new("/api/login", "POST", "1.2.3.4", "alice"))
///     .await?;
/// if decision.is_denied() {
///     // respond 429 with decision.retry_after
/// }
/// ```
pub struct Limiter<S> {
    storage: S,
    policy: Policy,
}

impl<S: Storage> Limiter<S> {
    /// Create an engine from a compiled policy.
    pub fn new(policy: Policy, storage: S) -> Self {
        info!(
            enabled = policy.enabled,
            rules = policy.rules.len(),
            global = policy.global.is_some(),
            "rate limit policy active"
        );
        Self { storage, policy }
    }

    /// Validate and compile a policy document, then create the engine.
    pub fn from_config(config: &PolicyConfig, storage: S) -> Result<Self> {
        Ok(Self::new(config.compile()?, storage))
    }

    /// Whether enforcement is enabled.
    pub fn is_enabled(&self) -> bool {
        self.policy.enabled
    }

    /// The compiled policy.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Decide whether to admit one request.
    ///
    /// Storage failures propagate as errors without a verdict; the caller
    /// chooses whether to fail open or closed.
    pub async fn check(&self, request: Descriptor<'_>) -> Result<Decision> {
        if !self.policy.enabled {
            return Ok(Decision::pass());
        }
        let acl = &self.policy.acl;

        if !request.user.is_empty() {
            if acl.user_denied(&self.storage, request.user).await? {
                debug!(user = request.user, "denied by user access control");
                return Ok(Decision::blocked());
            }
            if acl.user_allowed(request.user) {
                return Ok(Decision::pass());
            }
        }

        if !request.ip.is_empty() {
            if acl.ip_denied(&self.storage, request.ip).await? {
                debug!(ip = request.ip, "denied by ip access control");
                return Ok(Decision::blocked());
            }
            if acl.ip_allowed(request.ip) {
                return Ok(Decision::pass());
            }
        }

        if let Some(global) = &self.policy.global {
            let decision = self.evaluate(global, request).await?;
            if decision.is_denied() {
                self.record_violation(global, request).await?;
                return Ok(decision);
            }
        }

        for rule in &self.policy.rules {
            if !rule.matches(request.path, request.method) {
                continue;
            }
            let decision = self.evaluate(rule, request).await?;
            if decision.is_denied() {
                self.record_violation(rule, request).await?;
                return Ok(decision);
            }
        }

        Ok(Decision::pass())
    }

    async fn evaluate(&self, rule: &Rule, request: Descriptor<'_>) -> Result<Decision> {
        let key = rule.build_key(request.path, request.ip, request.user);
        let decision = match rule.limit {
            Limit::FixedWindow { limit, window } => {
                fixed_window::allow(&self.storage, &key, limit, window).await?
            }
            Limit::SlidingWindow { limit, window } => {
                sliding_window::allow(&self.storage, &key, limit, window).await?
            }
            Limit::TokenBucket { capacity, rate } => {
                token_bucket::allow(&self.storage, &key, capacity, rate).await?
            }
        };
        debug!(
            key = %key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "rule evaluated"
        );
        Ok(decision)
    }

    async fn record_violation(&self, rule: &Rule, request: Descriptor<'_>) -> Result<()> {
        if !rule.record_violation {
            return Ok(());
        }
        self.policy
            .acl
            .record_violation(&self.storage, request.ip, request.user, rule.violation_weight)
            .await
    }
}
