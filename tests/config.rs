//! Policy document parsing and validation tests.

use std::time::Duration;

use gatelimit::{Limit, LimitBy, PolicyConfig, RateLimitError};

#[test]
fn test_full_policy_compiles() {
    let config = PolicyConfig::from_yaml(
        r#"
default:
  algorithm: fixed_window
  enabled: true
global:
  limit: 1000
  window: 1s
rules:
  - name: login
    path: /api/login
    method: post
    by: ip
    algorithm: sliding_window
    limit: 5
    window: 1m
    record_violation: true
    violation_weight: 2
  - name: search
    path: /api/*
    by: user
    algorithm: token_bucket
    capacity: 20
    rate: 10/s
  - path: /health
    by: global
    limit: 100
    window: 10s
whitelist:
  ips: [127.0.0.1]
  users: [admin]
blacklist:
  users: [mallory]
auto_ban:
  enabled: true
  dimensions: [ip, user]
  violation_threshold: 10
  violation_window: 5m
  ban_duration: 1h
"#,
    )
    .unwrap();

    let policy = config.compile().unwrap();
    assert!(policy.enabled);
    assert_eq!(policy.rules.len(), 3);

    let login = &policy.rules[0];
    assert_eq!(login.method, "POST");
    assert_eq!(login.by, LimitBy::Ip);
    assert!(login.record_violation);
    assert_eq!(login.violation_weight, 2);
    assert_eq!(
        login.limit,
        Limit::SlidingWindow {
            limit: 5,
            window: Duration::from_secs(60),
        }
    );

    let search = &policy.rules[1];
    assert_eq!(search.by, LimitBy::User);
    assert!(matches!(
        search.limit,
        Limit::TokenBucket { capacity: 20, rate } if (rate - 10.0).abs() < 1e-12
    ));
    // weight defaults to 1 even when recording is off
    assert_eq!(search.violation_weight, 1);

    let global = policy.global.unwrap();
    assert_eq!(global.by, LimitBy::Global);
    assert!(matches!(
        global.limit,
        Limit::FixedWindow { limit: 1000, .. }
    ));

    let ban = policy.acl.auto_ban().unwrap();
    assert_eq!(ban.violation_threshold, 10);
    assert_eq!(ban.violation_window, Duration::from_secs(300));
    assert_eq!(ban.ban_duration, Duration::from_secs(3600));
}

#[test]
fn test_rule_inherits_default_algorithm() {
    let config = PolicyConfig::from_yaml(
        r#"
default:
  algorithm: sliding_window
  enabled: true
rules:
  - path: /a
    by: ip
    limit: 3
    window: 30s
"#,
    )
    .unwrap();

    let policy = config.compile().unwrap();
    assert!(matches!(
        policy.rules[0].limit,
        Limit::SlidingWindow { limit: 3, .. }
    ));
}

#[test]
fn test_empty_default_algorithm_means_fixed_window() {
    let config = PolicyConfig::from_yaml(
        r#"
default:
  enabled: true
rules:
  - path: /a
    by: ip
    limit: 3
    window: 30s
"#,
    )
    .unwrap();

    assert!(matches!(
        config.compile().unwrap().rules[0].limit,
        Limit::FixedWindow { .. }
    ));
}

#[test]
fn test_rejections() {
    let bad_documents = [
        // unknown algorithm
        r#"
rules:
  - path: /a
    by: ip
    algorithm: leaky_bucket
    limit: 1
    window: 1s
"#,
        // unknown dimension
        r#"
rules:
  - path: /a
    by: tenant
    limit: 1
    window: 1s
"#,
        // missing path
        r#"
rules:
  - by: ip
    limit: 1
    window: 1s
"#,
        // non-positive limit
        r#"
rules:
  - path: /a
    by: ip
    limit: 0
    window: 1s
"#,
        // unparseable window
        r#"
rules:
  - path: /a
    by: ip
    limit: 1
    window: soon
"#,
        // token bucket without capacity
        r#"
rules:
  - path: /a
    by: ip
    algorithm: token_bucket
    rate: 1/s
"#,
        // token bucket with bad rate
        r#"
rules:
  - path: /a
    by: ip
    algorithm: token_bucket
    capacity: 10
    rate: 10/day
"#,
        // global without window
        r#"
global:
  limit: 10
"#,
        // global with non-positive limit
        r#"
global:
  limit: -1
  window: 1s
"#,
        // auto-ban with non-positive threshold
        r#"
auto_ban:
  enabled: true
  dimensions: [ip]
  violation_threshold: 0
  violation_window: 1m
  ban_duration: 1h
"#,
        // auto-ban with unknown dimension
        r#"
auto_ban:
  enabled: true
  dimensions: [asn]
  violation_threshold: 5
  violation_window: 1m
  ban_duration: 1h
"#,
    ];

    for yaml in bad_documents {
        let result = PolicyConfig::from_yaml(yaml).unwrap().compile();
        assert!(
            matches!(result, Err(RateLimitError::Config(_))),
            "document should be rejected:\n{yaml}"
        );
    }
}

#[test]
fn test_unknown_fields_are_rejected_at_parse() {
    let result = PolicyConfig::from_yaml(
        r#"
rules:
  - path: /a
    by: ip
    limit: 1
    window: 1s
    burst: 10
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_disabled_auto_ban_section_is_ignored() {
    let config = PolicyConfig::from_yaml(
        r#"
auto_ban:
  enabled: false
  dimensions: [asn]
  violation_threshold: 0
"#,
    )
    .unwrap();

    // nothing in a disabled section is validated
    let policy = config.compile().unwrap();
    assert!(policy.acl.auto_ban().is_none());
}
