//! Declarative policy configuration.
//!
//! A [`PolicyConfig`] is the serde shape of a policy document, typically
//! loaded from YAML. [`PolicyConfig::compile`] validates it and produces
//! the immutable [`Policy`] the engine runs: string identifiers become
//! enums, duration and rate strings become numbers, and anything
//! inconsistent is rejected before the first request is served.
//!
//! Durations use `<decimal><s|m|h>` (`60s`, `5m`, `1.5h`); rates use
//! `N/<s|m|h>` and are stored as tokens per second.
//!
//! ```yaml
//! default:
//!   algorithm: fixed_window
//!   enabled: true
//! global:
//!   limit: 1000
//!   window: 1s
//! rules:
//!   - name: login
//!     path: /api/login
//!     method: POST
//!     by: ip
//!     algorithm: sliding_window
//!     limit: 5
//!     window: 1m
//!     record_violation: true
//! auto_ban:
//!   enabled: true
//!   dimensions: [ip]
//!   violation_threshold: 10
//!   violation_window: 5m
//!   ban_duration: 1h
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::acl::{AccessControl, AutoBan};
use crate::error::{ConfigError, Result};
use crate::rule::{Limit, LimitBy, Rule};

const ALGO_FIXED_WINDOW: &str = "fixed_window";
const ALGO_SLIDING_WINDOW: &str = "sliding_window";
const ALGO_TOKEN_BUCKET: &str = "token_bucket";

/// A fully validated policy, ready for the engine.
#[derive(Debug, Default)]
pub struct Policy {
    /// Master switch; when false every request passes unchecked.
    pub enabled: bool,
    /// Rule applied to every request before the rule list.
    pub global: Option<Rule>,
    /// Rules evaluated in declaration order.
    pub rules: Vec<Rule>,
    /// Static lists and auto-ban policy.
    pub acl: AccessControl,
}

/// Top-level policy document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Defaults and the master switch.
    #[serde(default)]
    pub default: DefaultConfig,
    /// Optional limit applied to every request.
    #[serde(default)]
    pub global: Option<GlobalConfig>,
    /// Rules in evaluation order.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    /// Identities that bypass rule evaluation.
    #[serde(default)]
    pub whitelist: ListConfig,
    /// Identities that are always denied.
    #[serde(default)]
    pub blacklist: ListConfig,
    /// Automatic promotion of repeat offenders into the blacklist.
    #[serde(default)]
    pub auto_ban: AutoBanConfig,
}

/// Defaults and the master switch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultConfig {
    /// Algorithm used when a rule omits one. Empty means fixed window.
    #[serde(default)]
    pub algorithm: String,
    /// Master switch; a policy must opt in to enforcement.
    #[serde(default)]
    pub enabled: bool,
}

/// The global limit section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Admissions per window across all traffic.
    pub limit: i64,
    /// Window length.
    #[serde(default)]
    pub window: String,
    /// Window algorithm override; empty uses the default.
    #[serde(default)]
    pub algorithm: String,
}

/// One rule of the policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Key namespace; the path is used when empty.
    #[serde(default)]
    pub name: String,
    /// Path pattern (`*` glob, single segment).
    #[serde(default)]
    pub path: String,
    /// HTTP method; empty matches any.
    #[serde(default)]
    pub method: String,
    /// Limit dimension: `ip`, `user`, `path`, `global`, or `custom`.
    #[serde(default)]
    pub by: String,
    /// Algorithm; empty uses the default.
    #[serde(default)]
    pub algorithm: String,
    /// Admissions per window (window algorithms).
    #[serde(default)]
    pub limit: i64,
    /// Window length (window algorithms).
    #[serde(default)]
    pub window: String,
    /// Bucket capacity (token bucket).
    #[serde(default)]
    pub capacity: i64,
    /// Refill rate, `N/<s|m|h>` (token bucket).
    #[serde(default)]
    pub rate: String,
    /// Whether denials feed the auto-ban loop.
    #[serde(default)]
    pub record_violation: bool,
    /// Violation counter increment per denial; 0 means the default of 1.
    #[serde(default)]
    pub violation_weight: i64,
}

/// IP and user lists.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListConfig {
    /// IP addresses.
    #[serde(default)]
    pub ips: Vec<String>,
    /// User identifiers.
    #[serde(default)]
    pub users: Vec<String>,
}

/// The auto-ban section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoBanConfig {
    /// Whether offenders are promoted automatically.
    #[serde(default)]
    pub enabled: bool,
    /// Dimensions to ban on, any of `ip` and `user`.
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Accumulated violation weight that triggers a ban.
    #[serde(default)]
    pub violation_threshold: i64,
    /// Violation accumulation window.
    #[serde(default)]
    pub violation_window: String,
    /// Ban length.
    #[serde(default)]
    pub ban_duration: String,
}

impl PolicyConfig {
    /// Parse a policy document from YAML. Validation happens in
    /// [`compile`](Self::compile).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml).map_err(ConfigError::from)?)
    }

    /// Read and parse a policy document from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading rate limit policy");
        let contents = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        Self::from_yaml(&contents)
    }

    /// Validate the document and compile it into an engine-ready policy.
    pub fn compile(&self) -> Result<Policy> {
        let default_algorithm = if self.default.algorithm.is_empty() {
            ALGO_FIXED_WINDOW
        } else {
            check_algorithm(&self.default.algorithm)?
        };

        let global = match &self.global {
            Some(global) => Some(global.compile(default_algorithm)?),
            None => None,
        };

        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| rule.compile(default_algorithm, index))
            .collect::<Result<Vec<_>>>()?;

        let mut acl = AccessControl::new()
            .allow_ips(self.whitelist.ips.iter().cloned())
            .allow_users(self.whitelist.users.iter().cloned())
            .deny_ips(self.blacklist.ips.iter().cloned())
            .deny_users(self.blacklist.users.iter().cloned());
        if let Some(auto_ban) = self.auto_ban.compile()? {
            acl = acl.with_auto_ban(auto_ban);
        }

        Ok(Policy {
            enabled: self.default.enabled,
            global,
            rules,
            acl,
        })
    }
}

impl GlobalConfig {
    fn compile(&self, default_algorithm: &str) -> Result<Rule> {
        if self.limit <= 0 {
            return Err(ConfigError::InvalidGlobal("limit must be positive".into()).into());
        }
        if self.window.is_empty() {
            return Err(ConfigError::InvalidGlobal("window is required".into()).into());
        }
        let window = parse_duration(&self.window)?;
        let algorithm = if self.algorithm.is_empty() {
            default_algorithm
        } else {
            check_algorithm(&self.algorithm)?
        };
        let limit = match algorithm {
            ALGO_SLIDING_WINDOW => Limit::SlidingWindow {
                limit: self.limit,
                window,
            },
            ALGO_TOKEN_BUCKET => {
                return Err(ConfigError::InvalidGlobal(
                    "token bucket needs capacity and rate; use a rule".into(),
                )
                .into())
            }
            _ => Limit::FixedWindow {
                limit: self.limit,
                window,
            },
        };

        Ok(Rule {
            name: "global".into(),
            path: "*".into(),
            method: String::new(),
            by: LimitBy::Global,
            limit,
            record_violation: true,
            violation_weight: 1,
        })
    }
}

impl RuleConfig {
    fn compile(&self, default_algorithm: &str, index: usize) -> Result<Rule> {
        if self.path.is_empty() {
            return Err(ConfigError::invalid_rule(index, "missing path").into());
        }
        let by = parse_limit_by(&self.by)
            .map_err(|_| ConfigError::invalid_rule(index, format!("unknown dimension {:?}", self.by)))?;
        if self.violation_weight < 0 {
            return Err(
                ConfigError::invalid_rule(index, "violation_weight must be non-negative").into(),
            );
        }

        let algorithm = if self.algorithm.is_empty() {
            default_algorithm
        } else {
            check_algorithm(&self.algorithm)?
        };

        let limit = match algorithm {
            ALGO_TOKEN_BUCKET => {
                if self.capacity <= 0 {
                    return Err(
                        ConfigError::invalid_rule(index, "token bucket needs a positive capacity")
                            .into(),
                    );
                }
                if self.rate.is_empty() {
                    return Err(ConfigError::invalid_rule(index, "token bucket needs a rate").into());
                }
                Limit::TokenBucket {
                    capacity: self.capacity,
                    rate: parse_rate(&self.rate)?,
                }
            }
            _ => {
                if self.limit <= 0 {
                    return Err(
                        ConfigError::invalid_rule(index, "limit must be positive").into()
                    );
                }
                let window = parse_duration(&self.window)?;
                if algorithm == ALGO_SLIDING_WINDOW {
                    Limit::SlidingWindow {
                        limit: self.limit,
                        window,
                    }
                } else {
                    Limit::FixedWindow {
                        limit: self.limit,
                        window,
                    }
                }
            }
        };

        Ok(Rule {
            name: self.name.clone(),
            path: self.path.clone(),
            method: self.method.to_uppercase(),
            by,
            limit,
            record_violation: self.record_violation,
            violation_weight: if self.violation_weight == 0 {
                1
            } else {
                self.violation_weight
            },
        })
    }
}

impl AutoBanConfig {
    fn compile(&self) -> Result<Option<AutoBan>> {
        if !self.enabled {
            return Ok(None);
        }
        if self.violation_threshold <= 0 {
            return Err(
                ConfigError::InvalidAutoBan("violation_threshold must be positive".into()).into(),
            );
        }
        let mut ban_ips = false;
        let mut ban_users = false;
        for dim in &self.dimensions {
            match dim.as_str() {
                "ip" => ban_ips = true,
                "user" => ban_users = true,
                other => return Err(ConfigError::UnknownDimension(other.into()).into()),
            }
        }
        Ok(Some(AutoBan {
            ban_ips,
            ban_users,
            violation_threshold: self.violation_threshold,
            violation_window: parse_duration(&self.violation_window)?,
            ban_duration: parse_duration(&self.ban_duration)?,
        }))
    }
}

fn check_algorithm(s: &str) -> Result<&str> {
    match s {
        ALGO_FIXED_WINDOW | ALGO_SLIDING_WINDOW | ALGO_TOKEN_BUCKET => Ok(s),
        other => Err(ConfigError::UnknownAlgorithm(other.into()).into()),
    }
}

fn parse_limit_by(s: &str) -> Result<LimitBy> {
    match s {
        "ip" => Ok(LimitBy::Ip),
        "user" => Ok(LimitBy::User),
        "path" => Ok(LimitBy::Path),
        "global" => Ok(LimitBy::Global),
        "custom" => Ok(LimitBy::Custom),
        other => Err(ConfigError::UnknownDimension(other.into()).into()),
    }
}

/// Parse a duration string: a decimal number with an `s`, `m`, or `h`
/// suffix.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let invalid = || ConfigError::InvalidDuration(s.to_string());

    let trimmed = s.trim();
    let (value, scale) = if let Some(v) = trimmed.strip_suffix('s') {
        (v, 1.0)
    } else if let Some(v) = trimmed.strip_suffix('m') {
        (v, 60.0)
    } else if let Some(v) = trimmed.strip_suffix('h') {
        (v, 3600.0)
    } else {
        return Err(invalid().into());
    };
    let value: f64 = value.parse().map_err(|_| invalid())?;
    if value <= 0.0 {
        return Err(invalid().into());
    }
    Duration::try_from_secs_f64(value * scale).map_err(|_| invalid().into())
}

/// Parse a rate string `N/<s|m|h>` into tokens per second.
pub fn parse_rate(s: &str) -> Result<f64> {
    let invalid = || ConfigError::InvalidRate(s.to_string());

    let (count, unit) = s.trim().split_once('/').ok_or_else(invalid)?;
    let count: f64 = count.parse().map_err(|_| invalid())?;
    if !count.is_finite() || count <= 0.0 {
        return Err(invalid().into());
    }
    let per_secs = match unit {
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        _ => return Err(invalid().into()),
    };
    Ok(count / per_secs)
}
