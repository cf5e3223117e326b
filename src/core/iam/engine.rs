//! Policy evaluation with deny precedence
//!
//! Evaluates the rule set to decide whether a principal may perform an
//! action on a resource. Key properties:
//! - Explicit deny takes precedence over allow
//! - No matching rule means deny
//! - The storage order of rules never changes an outcome
//! - Evaluation is a pure function of rules + request (cached per request)

use super::cache::DecisionCache;
use super::condition::RequestContext;
use super::pattern::ResourcePattern;
use super::policy::{Action, Decision, Effect, PolicyRule, Principal};
use crate::catalog::ResourceCatalog;
use crate::error::{PolicyError, Result};
use crate::validation::ResourceId;
use serde::Serialize;
use tracing::debug;

/// Default number of cached decisions
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: PolicyRule,
    pattern: ResourcePattern,
}

impl CompiledRule {
    fn compile(rule: PolicyRule) -> Result<Self> {
        rule.validate()?;
        let pattern = ResourcePattern::parse(&rule.resource)?;
        Ok(CompiledRule { rule, pattern })
    }

    /// Patterns match and the conditions hold
    fn is_effective(
        &self,
        principal: &Principal,
        resource_path: &str,
        action: &Action,
        context: &RequestContext,
    ) -> bool {
        self.rule.principal.covers(principal)
            && self.rule.actions.iter().any(|a| a.matches(action))
            && self.pattern.matches(resource_path)
            && self.rule.conditions_hold(context)
    }
}

/// Decision plus the rules that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub decision: Decision,
    /// Labels of effective deny rules
    pub denied_by: Vec<String>,
    /// Labels of effective allow rules
    pub allowed_by: Vec<String>,
}

/// Rule set plus decision cache
pub struct PolicyResolver {
    rules: Vec<CompiledRule>,
    cache: DecisionCache,
}

impl PolicyResolver {
    /// Create a resolver with the given cache capacity
    ///
    /// Fails with `Validation` on the first malformed rule.
    pub fn new(rules: Vec<PolicyRule>, cache_capacity: usize) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(PolicyResolver {
            rules,
            cache: DecisionCache::new(cache_capacity),
        })
    }

    /// Resolver without rules (denies everything)
    pub fn empty(cache_capacity: usize) -> Self {
        PolicyResolver {
            rules: Vec::new(),
            cache: DecisionCache::new(cache_capacity),
        }
    }

    /// Create a resolver with the default cache (1000 entries)
    pub fn with_rules(rules: Vec<PolicyRule>) -> Result<Self> {
        Self::new(rules, DEFAULT_CACHE_CAPACITY)
    }

    /// Append a rule
    pub fn add_rule(&mut self, rule: PolicyRule) -> Result<()> {
        self.rules.push(CompiledRule::compile(rule)?);
        self.cache.clear();
        Ok(())
    }

    /// Iterate over the rules in storage order
    pub fn rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Decide a request against a canonical resource path
    ///
    /// # Examples
    ///
    /// ```
    /// use infra_policy::iam::{
    ///     action_set, Action, Decision, Effect, PolicyResolver, PolicyRule, Principal,
    ///     RequestContext,
    /// };
    ///
    /// let resolver = PolicyResolver::with_rules(vec![PolicyRule::new(
    ///     Effect::Allow,
    ///     Principal::role("crawler"),
    ///     action_set(&[Action::Read]),
    ///     "/storage/*",
    /// )])
    /// .unwrap();
    ///
    /// let ctx = RequestContext::new();
    /// let crawler = Principal::role("crawler");
    /// assert_eq!(resolver.decide(&crawler, "/storage/raw", Action::Read, &ctx), Decision::Allow);
    /// assert_eq!(resolver.decide(&crawler, "/storage/raw", Action::Write, &ctx), Decision::Deny);
    /// ```
    pub fn decide(
        &self,
        principal: &Principal,
        resource_path: &str,
        action: Action,
        context: &RequestContext,
    ) -> Decision {
        if let Some(cached) = self.cache.get(principal, resource_path, action, context) {
            return cached;
        }

        let decision = Decision::combine(
            self.rules
                .iter()
                .filter(|r| r.is_effective(principal, resource_path, &action, context))
                .map(|r| r.rule.effect),
        );

        debug!(
            principal = %principal,
            resource = resource_path,
            action = %action,
            decision = %decision,
            "policy evaluated"
        );

        self.cache
            .put(principal, resource_path, action, context, decision);
        decision
    }

    /// Like [`decide`](Self::decide) but reports every effective rule
    ///
    /// Bypasses the cache.
    pub fn explain(
        &self,
        principal: &Principal,
        resource_path: &str,
        action: Action,
        context: &RequestContext,
    ) -> Evaluation {
        let mut denied_by = Vec::new();
        let mut allowed_by = Vec::new();

        for compiled in &self.rules {
            if !compiled.is_effective(principal, resource_path, &action, context) {
                continue;
            }
            match compiled.rule.effect {
                Effect::Deny => denied_by.push(compiled.rule.label()),
                Effect::Allow => allowed_by.push(compiled.rule.label()),
            }
        }
        denied_by.sort();
        allowed_by.sort();

        let decision = if !denied_by.is_empty() {
            Decision::Deny
        } else if !allowed_by.is_empty() {
            Decision::Allow
        } else {
            Decision::Deny
        };

        Evaluation {
            decision,
            denied_by,
            allowed_by,
        }
    }

    /// Decide a request against a catalogued resource
    ///
    /// Fails with `NotFound` when the resource is not catalogued or the
    /// requesting role is not held by any compute job.
    pub fn evaluate(
        &self,
        catalog: &ResourceCatalog,
        principal: &Principal,
        resource: &ResourceId,
        action: Action,
        context: &RequestContext,
    ) -> Result<Decision> {
        let path = Self::resolve(catalog, principal, resource)?;
        Ok(self.decide(principal, &path, action, context))
    }

    /// Catalog-aware variant of [`explain`](Self::explain)
    pub fn explain_resource(
        &self,
        catalog: &ResourceCatalog,
        principal: &Principal,
        resource: &ResourceId,
        action: Action,
        context: &RequestContext,
    ) -> Result<Evaluation> {
        let path = Self::resolve(catalog, principal, resource)?;
        Ok(self.explain(principal, &path, action, context))
    }

    /// Deny rules whose patterns cover the request, regardless of conditions
    pub fn matching_denies<'a>(
        &'a self,
        principal: &'a Principal,
        resource_path: &'a str,
        action: Action,
    ) -> impl Iterator<Item = &'a PolicyRule> + 'a {
        self.rules
            .iter()
            .filter(move |c| {
                c.rule.effect == Effect::Deny
                    && c.rule.principal.covers(principal)
                    && c.rule.actions.iter().any(|a| a.matches(&action))
                    && c.pattern.matches(resource_path)
            })
            .map(|c| &c.rule)
    }

    fn resolve(
        catalog: &ResourceCatalog,
        principal: &Principal,
        resource: &ResourceId,
    ) -> Result<String> {
        if let Principal::Role(name) = principal {
            if !catalog.has_role(name) {
                return Err(PolicyError::not_found("principal role", name));
            }
        }
        Ok(catalog.get(resource)?.path())
    }

    /// Clear the decision cache
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of cached decisions
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

impl std::fmt::Debug for PolicyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyResolver")
            .field("rules", &self.rules.len())
            .field("cache", &self.cache)
            .finish()
    }
}
