//! Integration tests for the policy resolver

use super::*;
use serde_json::json;

fn allow(principal: Principal, actions: &[Action], resource: &str) -> PolicyRule {
    PolicyRule::new(Effect::Allow, principal, action_set(actions), resource)
}

fn deny(principal: Principal, actions: &[Action], resource: &str) -> PolicyRule {
    PolicyRule::new(Effect::Deny, principal, action_set(actions), resource)
}

#[test]
fn test_complex_policy_scenario() {
    let crawler = Principal::role("dataedu-glue-crawler-role");
    let fetch = Principal::role("dataedu-fetch-demo-data-role");
    let admin = Principal::role("admin");

    let resolver = PolicyResolver::with_rules(vec![
        // Crawlers read every raw container
        allow(
            Principal::role("*-crawler-role"),
            &[Action::Read, Action::List],
            "/storage/dataedu-raw-*",
        ),
        // Fetch job owns raw writes
        allow(fetch.clone(), &[Action::Write, Action::Delete], "/storage/dataedu-raw-*"),
        // Admin does anything
        allow(admin.clone(), &[Action::All], "/**"),
        // Nobody touches key material
        deny(Principal::Any, &[Action::Delete], "/key/**"),
    ])
    .unwrap();
    let ctx = RequestContext::new();

    assert_eq!(
        resolver.decide(&crawler, "/storage/dataedu-raw-team1", Action::Read, &ctx),
        Decision::Allow
    );
    assert_eq!(
        resolver.decide(&crawler, "/storage/dataedu-raw-team1", Action::Write, &ctx),
        Decision::Deny
    );
    assert_eq!(
        resolver.decide(&crawler, "/storage/dataedu-curated-team1", Action::Read, &ctx),
        Decision::Deny
    );
    assert_eq!(
        resolver.decide(&fetch, "/storage/dataedu-raw-team1", Action::Delete, &ctx),
        Decision::Allow
    );

    // Admin access allowed, except key deletion
    assert_eq!(
        resolver.decide(&admin, "/trigger/nightly", Action::Disable, &ctx),
        Decision::Allow
    );
    assert_eq!(
        resolver.decide(&admin, "/key/dataedu-key", Action::Encrypt, &ctx),
        Decision::Allow
    );
    assert_eq!(
        resolver.decide(&admin, "/key/dataedu-key", Action::Delete, &ctx),
        Decision::Deny
    );
}

#[test]
fn test_rule_json_roundtrip_with_evaluation() {
    let rules_json = json!([
        {
            "sid": "crawler-read",
            "principal": { "role": "crawler" },
            "effect": "Allow",
            "actions": ["read", "list"],
            "resource": "/storage/*"
        },
        {
            "sid": "deny-cleartext",
            "principal": "*",
            "effect": "Deny",
            "actions": ["write"],
            "resource": "/storage/**",
            "conditions": [
                {
                    "operator": "StringNotEquals",
                    "key": "storage:encryption-mode",
                    "values": ["kms"],
                    "if_exists": true
                }
            ]
        }
    ]);

    let rules: Vec<PolicyRule> = serde_json::from_value(rules_json).unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[1].conditions.len(), 1);
    assert!(rules[1].conditions[0].if_exists);

    let back: Vec<PolicyRule> =
        serde_json::from_str(&serde_json::to_string(&rules).unwrap()).unwrap();
    assert_eq!(back, rules);

    let resolver = PolicyResolver::with_rules(rules).unwrap();
    let ctx = RequestContext::new();
    let crawler = Principal::role("crawler");

    assert_eq!(
        resolver.decide(&crawler, "/storage/raw", Action::Read, &ctx),
        Decision::Allow
    );
    assert_eq!(
        resolver.decide(&Principal::Any, "/storage/raw", Action::Write, &ctx),
        Decision::Deny
    );
}

#[test]
fn test_cache_behavior() {
    let resolver = PolicyResolver::new(
        vec![allow(Principal::Any, &[Action::Read], "/storage/**")],
        100,
    )
    .unwrap();
    let ctx = RequestContext::new();

    // First evaluation - populates cache
    for i in 0..50 {
        let path = format!("/storage/bucket-{}", i);
        assert!(resolver.decide(&Principal::Any, &path, Action::Read, &ctx).is_allow());
    }
    assert_eq!(resolver.cache_size(), 50);

    // Repeat evaluations hit the cache
    for i in 0..50 {
        let path = format!("/storage/bucket-{}", i);
        assert!(resolver.decide(&Principal::Any, &path, Action::Read, &ctx).is_allow());
    }
    assert_eq!(resolver.cache_size(), 50);

    // Different contexts are different entries
    let with_mode = RequestContext::new().with("storage:encryption-mode", "kms");
    resolver.decide(&Principal::Any, "/storage/bucket-0", Action::Read, &with_mode);
    assert_eq!(resolver.cache_size(), 51);

    // Bounded by capacity
    for i in 50..300 {
        let path = format!("/storage/bucket-{}", i);
        resolver.decide(&Principal::Any, &path, Action::Read, &ctx);
    }
    assert!(resolver.cache_size() <= 100);
}

#[test]
fn test_add_rule_clears_cache() {
    let mut resolver = PolicyResolver::with_rules(vec![allow(
        Principal::Any,
        &[Action::Read],
        "/storage/**",
    )])
    .unwrap();
    let ctx = RequestContext::new();

    assert!(resolver
        .decide(&Principal::Any, "/storage/raw", Action::Read, &ctx)
        .is_allow());
    assert_eq!(resolver.cache_size(), 1);

    resolver
        .add_rule(deny(Principal::Any, &[Action::Read], "/storage/raw"))
        .unwrap();
    assert_eq!(resolver.cache_size(), 0);
    assert!(!resolver
        .decide(&Principal::Any, "/storage/raw", Action::Read, &ctx)
        .is_allow());
}

#[test]
fn test_pattern_matching_edge_cases() {
    let resolver = PolicyResolver::with_rules(vec![
        allow(Principal::Any, &[Action::Read], "/parameter/exact"),
        allow(Principal::Any, &[Action::Read], "/storage/*/objects"),
        allow(Principal::Any, &[Action::Read], "/log-group/**/streams"),
    ])
    .unwrap();
    let ctx = RequestContext::new();
    let read = |path: &str| resolver.decide(&Principal::Any, path, Action::Read, &ctx);

    // Exact match
    assert_eq!(read("/parameter/exact"), Decision::Allow);
    assert_eq!(read("/parameter/other"), Decision::Deny);

    // Single wildcard
    assert_eq!(read("/storage/raw/objects"), Decision::Allow);
    assert_eq!(read("/storage/a/b/objects"), Decision::Deny);

    // Recursive wildcard
    assert_eq!(read("/log-group/streams"), Decision::Allow);
    assert_eq!(read("/log-group/a/streams"), Decision::Allow);
    assert_eq!(read("/log-group/a/b/c/streams"), Decision::Allow);
}

#[test]
fn test_action_wildcard_combinations() {
    let resolver = PolicyResolver::with_rules(vec![
        allow(Principal::Any, &[Action::Read], "/storage/specific"),
        allow(Principal::Any, &[Action::All], "/storage/open"),
    ])
    .unwrap();
    let ctx = RequestContext::new();
    let decide = |path: &str, action| resolver.decide(&Principal::Any, path, action, &ctx);

    assert_eq!(decide("/storage/specific", Action::Read), Decision::Allow);
    assert_eq!(decide("/storage/specific", Action::Write), Decision::Deny);

    for action in [Action::Read, Action::Write, Action::Delete, Action::List] {
        assert_eq!(decide("/storage/open", action), Decision::Allow);
    }
}

#[test]
fn test_deny_specific_allow_general() {
    let resolver = PolicyResolver::with_rules(vec![
        allow(Principal::Any, &[Action::All], "/**"),
        deny(Principal::Any, &[Action::Delete], "/storage/important"),
    ])
    .unwrap();
    let ctx = RequestContext::new();
    let decide = |path: &str, action| resolver.decide(&Principal::Any, path, action, &ctx);

    assert_eq!(decide("/storage/important", Action::Read), Decision::Allow);
    assert_eq!(decide("/storage/important", Action::Write), Decision::Allow);
    assert_eq!(decide("/storage/important", Action::Delete), Decision::Deny);
    assert_eq!(decide("/storage/scratch", Action::Delete), Decision::Allow);
}

#[test]
fn test_rule_ordering() {
    let allow_all = allow(Principal::Any, &[Action::Read], "/**");
    let deny_secret = deny(Principal::Any, &[Action::Read], "/parameter/secret");
    let ctx = RequestContext::new();

    let forward = PolicyResolver::with_rules(vec![allow_all.clone(), deny_secret.clone()]).unwrap();
    let reverse = PolicyResolver::with_rules(vec![deny_secret, allow_all]).unwrap();

    for path in ["/parameter/secret", "/parameter/public", "/storage/raw"] {
        assert_eq!(
            forward.decide(&Principal::Any, path, Action::Read, &ctx),
            reverse.decide(&Principal::Any, path, Action::Read, &ctx),
            "{}",
            path
        );
    }
    assert_eq!(
        forward.decide(&Principal::Any, "/parameter/secret", Action::Read, &ctx),
        Decision::Deny
    );
}

#[test]
fn test_conditional_deny_only_when_conditions_hold() {
    let resolver = PolicyResolver::with_rules(vec![
        allow(Principal::Any, &[Action::Write], "/storage/raw"),
        deny(Principal::Any, &[Action::Write], "/storage/raw").with_condition(Condition::new(
            ConditionOperator::Bool,
            "secure-transport",
            false.into(),
        )),
    ])
    .unwrap();

    let secure = RequestContext::new().with("secure-transport", true);
    let insecure = RequestContext::new().with("secure-transport", false);
    let unknown = RequestContext::new();

    assert_eq!(
        resolver.decide(&Principal::Any, "/storage/raw", Action::Write, &secure),
        Decision::Allow
    );
    assert_eq!(
        resolver.decide(&Principal::Any, "/storage/raw", Action::Write, &insecure),
        Decision::Deny
    );
    // missing key without if_exists: the deny does not apply
    assert_eq!(
        resolver.decide(&Principal::Any, "/storage/raw", Action::Write, &unknown),
        Decision::Allow
    );
}

#[test]
fn test_explain_reports_effective_rules() {
    let resolver = PolicyResolver::with_rules(vec![
        allow(Principal::Any, &[Action::Write], "/storage/**").with_sid("open-writes"),
        deny(Principal::Any, &[Action::Write], "/storage/raw").with_sid("freeze-raw"),
        deny(Principal::Any, &[Action::Read], "/storage/raw").with_sid("unrelated"),
    ])
    .unwrap();
    let ctx = RequestContext::new();

    let evaluation = resolver.explain(&Principal::Any, "/storage/raw", Action::Write, &ctx);
    assert_eq!(evaluation.decision, Decision::Deny);
    assert_eq!(evaluation.denied_by, vec!["freeze-raw".to_string()]);
    assert_eq!(evaluation.allowed_by, vec!["open-writes".to_string()]);

    let evaluation = resolver.explain(&Principal::Any, "/storage/curated", Action::Write, &ctx);
    assert_eq!(evaluation.decision, Decision::Allow);
    assert!(evaluation.denied_by.is_empty());

    // explain never populates the cache
    assert_eq!(resolver.cache_size(), 0);
}

#[test]
fn test_any_requester_only_matched_by_any_rules() {
    let resolver = PolicyResolver::with_rules(vec![allow(
        Principal::role("*"),
        &[Action::Read],
        "/storage/**",
    )])
    .unwrap();
    let ctx = RequestContext::new();

    assert!(resolver
        .decide(&Principal::role("anyone"), "/storage/raw", Action::Read, &ctx)
        .is_allow());
    assert!(!resolver
        .decide(&Principal::Any, "/storage/raw", Action::Read, &ctx)
        .is_allow());
}

#[test]
fn test_malformed_rules_rejected() {
    let empty = PolicyRule {
        sid: None,
        principal: Principal::Any,
        effect: Effect::Deny,
        actions: ActionSet::new(),
        resource: "/storage/raw".to_string(),
        conditions: Vec::new(),
    };
    assert!(matches!(
        PolicyResolver::with_rules(vec![empty]),
        Err(crate::error::PolicyError::Validation(_))
    ));

    for pattern in ["storage/raw", "/", "/storage//raw", "/storage/a**"] {
        assert!(
            PolicyResolver::with_rules(vec![allow(Principal::Any, &[Action::Read], pattern)])
                .is_err(),
            "{}",
            pattern
        );
    }
}

#[test]
fn test_case_sensitivity() {
    let resolver = PolicyResolver::with_rules(vec![allow(
        Principal::Any,
        &[Action::Read],
        "/storage/Raw",
    )])
    .unwrap();
    let ctx = RequestContext::new();

    assert!(resolver
        .decide(&Principal::Any, "/storage/Raw", Action::Read, &ctx)
        .is_allow());
    assert!(!resolver
        .decide(&Principal::Any, "/storage/raw", Action::Read, &ctx)
        .is_allow());
}

#[test]
fn test_cached_decisions_never_leak_between_contexts() {
    let rules = vec![
        allow(Principal::Any, &[Action::Write], "/storage/raw"),
        deny(Principal::Any, &[Action::Write], "/storage/raw").with_condition(Condition::new(
            ConditionOperator::StringEquals,
            "a",
            "x".into(),
        )),
    ];
    let two_attrs = RequestContext::new().with("a", "x").with("b", "y");
    let one_attr = RequestContext::new().with("a=String(\"x\")&b", "y");

    // either request order must give the uncached answer
    for order in [[&two_attrs, &one_attr], [&one_attr, &two_attrs]] {
        let resolver = PolicyResolver::with_rules(rules.clone()).unwrap();
        for ctx in order {
            let expected = resolver
                .explain(&Principal::Any, "/storage/raw", Action::Write, ctx)
                .decision;
            assert_eq!(
                resolver.decide(&Principal::Any, "/storage/raw", Action::Write, ctx),
                expected
            );
        }
        assert_eq!(resolver.cache_size(), 2);
    }

    let resolver = PolicyResolver::with_rules(rules).unwrap();
    assert_eq!(
        resolver.decide(&Principal::Any, "/storage/raw", Action::Write, &two_attrs),
        Decision::Deny
    );
    assert_eq!(
        resolver.decide(&Principal::Any, "/storage/raw", Action::Write, &one_attr),
        Decision::Allow
    );
}
