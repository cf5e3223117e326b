//! Condition evaluation for policy rules
//!
//! Conditions are pure attribute matchers over the request context:
//! - String operations (Equals, NotEquals, Like, NotLike)
//! - Numeric operations (Equals, LessThan, GreaterThan)
//! - Bool
//!
//! A missing context key makes a condition fail, unless the condition is
//! marked `if_exists`, in which case a missing key makes it hold.

use super::pattern::glob_match;
use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    /// String equals (case-sensitive)
    StringEquals,
    /// String not equals
    StringNotEquals,
    /// String matches pattern (supports * wildcard)
    StringLike,
    /// String matches none of the patterns
    StringNotLike,
    /// Numeric equals
    NumericEquals,
    /// Numeric less than
    NumericLessThan,
    /// Numeric greater than
    NumericGreaterThan,
    /// Boolean equals
    Bool,
}

impl ConditionOperator {
    /// Negated operators hold only when no listed value matches
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            ConditionOperator::StringNotEquals | ConditionOperator::StringNotLike
        )
    }
}

/// Condition value (string, number, or bool)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl ConditionValue {
    fn as_string(&self) -> Option<&str> {
        match self {
            ConditionValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            ConditionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            ConditionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(s: &str) -> Self {
        ConditionValue::String(s.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(s: String) -> Self {
        ConditionValue::String(s)
    }
}

impl From<f64> for ConditionValue {
    fn from(n: f64) -> Self {
        ConditionValue::Number(n)
    }
}

impl From<bool> for ConditionValue {
    fn from(b: bool) -> Self {
        ConditionValue::Bool(b)
    }
}

impl std::fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionValue::String(s) => f.write_str(s),
            ConditionValue::Number(n) => write!(f, "{}", n),
            ConditionValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// [`ConditionValue`] with numbers compared by bit pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum CanonicalValue {
    String(String),
    Number(u64),
    Bool(bool),
}

impl From<&ConditionValue> for CanonicalValue {
    fn from(value: &ConditionValue) -> Self {
        match value {
            ConditionValue::String(s) => CanonicalValue::String(s.clone()),
            ConditionValue::Number(n) => CanonicalValue::Number(n.to_bits()),
            ConditionValue::Bool(b) => CanonicalValue::Bool(*b),
        }
    }
}

/// Attributes of a single request, consulted by conditions
///
/// Backed by a sorted map so that two contexts with the same entries
/// always render the same cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestContext {
    attributes: BTreeMap<String, ConditionValue>,
}

impl RequestContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite an attribute
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConditionValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Look up an attribute
    pub fn get(&self, key: &str) -> Option<&ConditionValue> {
        self.attributes.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Parse a `key=value` pair; `true`/`false` become bools and numbers
    /// become numbers, everything else stays a string
    pub fn parse_pair(pair: &str) -> Result<(String, ConditionValue)> {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            PolicyError::Validation(format!("context entry '{}' is not key=value", pair))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(PolicyError::Validation(format!(
                "context entry '{}' has an empty key",
                pair
            )));
        }
        let value = match raw {
            "true" => ConditionValue::Bool(true),
            "false" => ConditionValue::Bool(false),
            _ => match raw.parse::<f64>() {
                Ok(n) if n.is_finite() => ConditionValue::Number(n),
                _ => ConditionValue::String(raw.to_string()),
            },
        };
        Ok((key.to_string(), value))
    }

    /// Hashable form used for cache keys, one entry per attribute
    pub(crate) fn canonical(&self) -> Vec<(String, CanonicalValue)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.clone(), CanonicalValue::from(v)))
            .collect()
    }
}

/// A single condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: ConditionOperator,
    pub key: String,
    pub values: Vec<ConditionValue>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub if_exists: bool,
}

impl Condition {
    /// Create a new condition over a single value
    pub fn new(operator: ConditionOperator, key: impl Into<String>, value: ConditionValue) -> Self {
        Condition {
            operator,
            key: key.into(),
            values: vec![value],
            if_exists: false,
        }
    }

    /// Create a condition over a set of values
    pub fn any_of(
        operator: ConditionOperator,
        key: impl Into<String>,
        values: Vec<ConditionValue>,
    ) -> Self {
        Condition {
            operator,
            key: key.into(),
            values,
            if_exists: false,
        }
    }

    /// Make a missing context key satisfy this condition
    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    /// Reject conditions that can never be evaluated meaningfully
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(PolicyError::Validation(
                "condition key cannot be empty".to_string(),
            ));
        }
        if self.values.is_empty() {
            return Err(PolicyError::Validation(format!(
                "condition on '{}' has no values",
                self.key
            )));
        }
        Ok(())
    }

    /// Evaluate this condition against a context
    pub fn evaluate(&self, context: &RequestContext) -> bool {
        let actual = match context.get(&self.key) {
            Some(v) => v,
            None => return self.if_exists,
        };

        if self.operator.is_negated() {
            !self.values.iter().any(|v| self.matches_one(v, actual))
        } else {
            self.values.iter().any(|v| self.matches_one(v, actual))
        }
    }

    /// Compare one listed value with the context value; negated operators
    /// compare with their positive form
    fn matches_one(&self, expected: &ConditionValue, actual: &ConditionValue) -> bool {
        match self.operator {
            ConditionOperator::StringEquals | ConditionOperator::StringNotEquals => {
                match (expected.as_string(), actual.as_string()) {
                    (Some(e), Some(a)) => e == a,
                    _ => false,
                }
            }
            ConditionOperator::StringLike | ConditionOperator::StringNotLike => {
                match (expected.as_string(), actual.as_string()) {
                    (Some(pattern), Some(a)) => glob_match(pattern, a),
                    _ => false,
                }
            }
            ConditionOperator::NumericEquals => match (expected.as_number(), actual.as_number()) {
                (Some(e), Some(a)) => (e - a).abs() < f64::EPSILON,
                _ => false,
            },
            ConditionOperator::NumericLessThan => {
                match (expected.as_number(), actual.as_number()) {
                    (Some(e), Some(a)) => a < e,
                    _ => false,
                }
            }
            ConditionOperator::NumericGreaterThan => {
                match (expected.as_number(), actual.as_number()) {
                    (Some(e), Some(a)) => a > e,
                    _ => false,
                }
            }
            ConditionOperator::Bool => match (expected.as_bool(), actual.as_bool()) {
                (Some(e), Some(a)) => e == a,
                _ => false,
            },
        }
    }
}

/// True when every condition holds (an empty list always holds)
pub fn all_hold(conditions: &[Condition], context: &RequestContext) -> bool {
    conditions.iter().all(|c| c.evaluate(context))
}
