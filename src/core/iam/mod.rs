//! Identity and Access Management (IAM) core
//!
//! Provides the rule model and resolver:
//! - Allow/Deny rules with explicit deny precedence and default deny
//! - Principal patterns (`*` or role globs)
//! - Wildcard pattern matching over canonical resource paths
//! - Condition evaluation (String, Numeric, Bool; optional `if_exists`)
//! - LRU caching of decisions

mod cache;
mod condition;
mod engine;
mod pattern;
mod policy;

pub use cache::DecisionCache;
pub use condition::{all_hold, Condition, ConditionOperator, ConditionValue, RequestContext};
pub use engine::{Evaluation, PolicyResolver, DEFAULT_CACHE_CAPACITY};
pub use pattern::{glob_match, PatternMatcher, ResourcePattern};
pub use policy::{action_set, Action, ActionSet, Decision, Effect, PolicyRule, Principal};

#[cfg(test)]
mod tests;
