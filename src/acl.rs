//! Access control: static allow/deny lists and the auto-ban loop.
//!
//! Static lists are plain hash sets, immutable after policy load and
//! shared across request handlers without locking. Dynamic bans live in
//! storage under `blacklist:<dim>:<id>` keys whose TTL is the unban
//! clock; no background job exists. The engine feeds denials back into
//! [`AccessControl::record_violation`], which promotes repeat offenders
//! into the dynamic blacklist once their windowed violation weight
//! reaches the configured threshold.

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;
use crate::storage::Storage;

const DIM_IP: &str = "ip";
const DIM_USER: &str = "user";

fn violation_key(dim: &str, id: &str) -> String {
    format!("violation:{dim}:{id}")
}

fn ban_key(dim: &str, id: &str) -> String {
    format!("blacklist:{dim}:{id}")
}

/// Auto-ban policy.
#[derive(Debug, Clone)]
pub struct AutoBan {
    /// Promote offending IPs into the dynamic blacklist.
    pub ban_ips: bool,
    /// Promote offending users into the dynamic blacklist.
    pub ban_users: bool,
    /// Accumulated violation weight that triggers a ban.
    pub violation_threshold: i64,
    /// How long violations accumulate before the counter expires.
    pub violation_window: Duration,
    /// How long a promoted offender stays banned.
    pub ban_duration: Duration,
}

/// Static allow/deny lists plus the optional auto-ban policy.
#[derive(Debug, Default)]
pub struct AccessControl {
    whitelist_ips: HashSet<String>,
    whitelist_users: HashSet<String>,
    blacklist_ips: HashSet<String>,
    blacklist_users: HashSet<String>,
    auto_ban: Option<AutoBan>,
}

impl AccessControl {
    /// Create an empty access control table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add IPs that bypass rule evaluation.
    pub fn allow_ips<I>(mut self, ips: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.whitelist_ips.extend(ips.into_iter().map(Into::into));
        self
    }

    /// Add users that bypass rule evaluation.
    pub fn allow_users<I>(mut self, users: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.whitelist_users.extend(users.into_iter().map(Into::into));
        self
    }

    /// Add IPs that are always denied.
    pub fn deny_ips<I>(mut self, ips: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.blacklist_ips.extend(ips.into_iter().map(Into::into));
        self
    }

    /// Add users that are always denied.
    pub fn deny_users<I>(mut self, users: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.blacklist_users.extend(users.into_iter().map(Into::into));
        self
    }

    /// Enable the auto-ban loop.
    pub fn with_auto_ban(mut self, auto_ban: AutoBan) -> Self {
        self.auto_ban = Some(auto_ban);
        self
    }

    /// The configured auto-ban policy, if any.
    pub fn auto_ban(&self) -> Option<&AutoBan> {
        self.auto_ban.as_ref()
    }

    /// Whether the user is statically whitelisted.
    pub fn user_allowed(&self, user: &str) -> bool {
        self.whitelist_users.contains(user)
    }

    /// Whether the IP is statically whitelisted.
    pub fn ip_allowed(&self, ip: &str) -> bool {
        self.whitelist_ips.contains(ip)
    }

    /// Whether the user is denied, statically or by a live dynamic ban.
    pub async fn user_denied<S: Storage>(&self, storage: &S, user: &str) -> Result<bool> {
        if self.blacklist_users.contains(user) {
            return Ok(true);
        }
        match &self.auto_ban {
            Some(ban) if ban.ban_users => {
                Ok(storage.get(&ban_key(DIM_USER, user)).await? > 0)
            }
            _ => Ok(false),
        }
    }

    /// Whether the IP is denied, statically or by a live dynamic ban.
    pub async fn ip_denied<S: Storage>(&self, storage: &S, ip: &str) -> Result<bool> {
        if self.blacklist_ips.contains(ip) {
            return Ok(true);
        }
        match &self.auto_ban {
            Some(ban) if ban.ban_ips => Ok(storage.get(&ban_key(DIM_IP, ip)).await? > 0),
            _ => Ok(false),
        }
    }

    /// Record a violation for every enabled dimension with a non-empty
    /// identifier, promoting offenders whose windowed weight reaches the
    /// threshold.
    pub async fn record_violation<S: Storage>(
        &self,
        storage: &S,
        ip: &str,
        user: &str,
        weight: i64,
    ) -> Result<()> {
        let Some(ban) = &self.auto_ban else {
            return Ok(());
        };
        if weight <= 0 {
            return Ok(());
        }
        if ban.ban_ips && !ip.is_empty() {
            self.bump(storage, ban, DIM_IP, ip, weight).await?;
        }
        if ban.ban_users && !user.is_empty() {
            self.bump(storage, ban, DIM_USER, user, weight).await?;
        }
        Ok(())
    }

    async fn bump<S: Storage>(
        &self,
        storage: &S,
        ban: &AutoBan,
        dim: &'static str,
        id: &str,
        weight: i64,
    ) -> Result<()> {
        let vkey = violation_key(dim, id);
        let count = storage.incr_by(&vkey, weight).await?;
        // first increment arms the accumulation window
        if count == weight {
            storage.expire(&vkey, ban.violation_window).await?;
        }
        if count >= ban.violation_threshold {
            let bkey = ban_key(dim, id);
            storage.set(&bkey, 1).await?;
            storage.expire(&bkey, ban.ban_duration).await?;
            storage.del(&vkey).await?;
            warn!(dimension = dim, id, "violation threshold reached, banned");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn auto_ban(threshold: i64) -> AutoBan {
        AutoBan {
            ban_ips: true,
            ban_users: true,
            violation_threshold: threshold,
            violation_window: Duration::from_secs(300),
            ban_duration: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_static_lists() {
        let acl = AccessControl::new()
            .allow_ips(["127.0.0.1"])
            .allow_users(["admin"])
            .deny_ips(["10.0.0.1"])
            .deny_users(["mallory"]);

        assert!(acl.ip_allowed("127.0.0.1"));
        assert!(!acl.ip_allowed("10.0.0.1"));
        assert!(acl.user_allowed("admin"));
        assert!(!acl.user_allowed("mallory"));
    }

    #[tokio::test]
    async fn test_threshold_promotes_to_ban() {
        let storage = MemoryStorage::new();
        let acl = AccessControl::new().with_auto_ban(auto_ban(3));

        for _ in 0..2 {
            acl.record_violation(&storage, "1.2.3.4", "", 1).await.unwrap();
            assert!(!acl.ip_denied(&storage, "1.2.3.4").await.unwrap());
        }
        acl.record_violation(&storage, "1.2.3.4", "", 1).await.unwrap();
        assert!(acl.ip_denied(&storage, "1.2.3.4").await.unwrap());

        // the violation counter is consumed by the promotion
        assert_eq!(storage.get("violation:ip:1.2.3.4").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_weighted_violations_ban_sooner() {
        let storage = MemoryStorage::new();
        let acl = AccessControl::new().with_auto_ban(auto_ban(3));

        // ceil(3 / 2) = 2 denials at weight 2
        acl.record_violation(&storage, "", "eve", 2).await.unwrap();
        assert!(!acl.user_denied(&storage, "eve").await.unwrap());
        acl.record_violation(&storage, "", "eve", 2).await.unwrap();
        assert!(acl.user_denied(&storage, "eve").await.unwrap());
    }

    #[tokio::test]
    async fn test_ban_expires_with_ttl() {
        let storage = MemoryStorage::new();
        let acl = AccessControl::new().with_auto_ban(AutoBan {
            ban_duration: Duration::from_millis(50),
            ..auto_ban(1)
        });

        acl.record_violation(&storage, "5.6.7.8", "", 1).await.unwrap();
        assert!(acl.ip_denied(&storage, "5.6.7.8").await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!acl.ip_denied(&storage, "5.6.7.8").await.unwrap());
    }

    #[tokio::test]
    async fn test_violation_window_expires_counter() {
        let storage = MemoryStorage::new();
        let acl = AccessControl::new().with_auto_ban(AutoBan {
            violation_window: Duration::from_millis(50),
            ..auto_ban(3)
        });

        acl.record_violation(&storage, "9.9.9.9", "", 1).await.unwrap();
        acl.record_violation(&storage, "9.9.9.9", "", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        // the stale count is gone; two more violations still stay under
        // the threshold
        acl.record_violation(&storage, "9.9.9.9", "", 1).await.unwrap();
        acl.record_violation(&storage, "9.9.9.9", "", 1).await.unwrap();
        assert!(!acl.ip_denied(&storage, "9.9.9.9").await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_dimension_is_skipped() {
        let storage = MemoryStorage::new();
        let acl = AccessControl::new().with_auto_ban(AutoBan {
            ban_users: false,
            ..auto_ban(1)
        });

        acl.record_violation(&storage, "", "eve", 1).await.unwrap();
        assert!(!acl.user_denied(&storage, "eve").await.unwrap());
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn test_anonymous_identities_are_not_recorded() {
        let storage = MemoryStorage::new();
        let acl = AccessControl::new().with_auto_ban(auto_ban(1));

        acl.record_violation(&storage, "", "", 1).await.unwrap();
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn test_no_auto_ban_means_no_dynamic_state() {
        let storage = MemoryStorage::new();
        let acl = AccessControl::new();

        acl.record_violation(&storage, "1.1.1.1", "bob", 1).await.unwrap();
        assert_eq!(storage.len(), 0);
        assert!(!acl.ip_denied(&storage, "1.1.1.1").await.unwrap());
    }
}
