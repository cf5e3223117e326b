//! Policy rule structure
//!
//! A rule is the tuple (principal pattern, resource pattern, action set,
//! effect, conditions). Rules are plain data: matching lives here, the
//! deny-over-allow combination lives in the resolver.

use super::condition::{all_hold, Condition, RequestContext};
use super::pattern::{glob_match, ResourcePattern};
use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Effect of a policy rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action (takes precedence over Allow)
    Deny,
}

/// Actions that can be requested on resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Read object contents or a parameter value
    Read,
    /// Write objects or a parameter value
    Write,
    /// Delete objects
    Delete,
    /// List container contents
    List,
    /// Encrypt with a key
    Encrypt,
    /// Decrypt with a key
    Decrypt,
    /// Run a compute job
    Invoke,
    /// Switch a trigger on
    Enable,
    /// Switch a trigger off
    Disable,
    /// Create log streams and put log events
    Log,
    /// All actions (wildcard, rules only)
    #[serde(rename = "*")]
    All,
}

impl Action {
    /// Check if this action matches another (considering wildcards)
    pub fn matches(&self, other: &Action) -> bool {
        match (self, other) {
            (Action::All, _) => true,
            (_, Action::All) => true,
            (a, b) => a == b,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::List => "list",
            Action::Encrypt => "encrypt",
            Action::Decrypt => "decrypt",
            Action::Invoke => "invoke",
            Action::Enable => "enable",
            Action::Disable => "disable",
            Action::Log => "log",
            Action::All => "*",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        let action = match s.to_lowercase().as_str() {
            "read" => Action::Read,
            "write" => Action::Write,
            "delete" => Action::Delete,
            "list" => Action::List,
            "encrypt" => Action::Encrypt,
            "decrypt" => Action::Decrypt,
            "invoke" => Action::Invoke,
            "enable" => Action::Enable,
            "disable" => Action::Disable,
            "log" => Action::Log,
            "*" => Action::All,
            other => {
                return Err(PolicyError::Validation(format!(
                    "unknown action '{}'",
                    other
                )))
            }
        };
        Ok(action)
    }
}

/// Ordered, duplicate-free set of actions
pub type ActionSet = BTreeSet<Action>;

/// Build an [`ActionSet`] from a slice
pub fn action_set(actions: &[Action]) -> ActionSet {
    actions.iter().copied().collect()
}

/// An actor that requests actions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Principal {
    /// Any principal. In a rule it matches every requester; as a requester
    /// it is matched only by rules that name `*`.
    #[serde(rename = "*")]
    Any,
    /// A named role (a compute job's identity); in rules the name may
    /// contain `*` globs
    Role(String),
}

impl Principal {
    pub fn role(name: impl Into<String>) -> Self {
        Principal::Role(name.into())
    }

    /// Check whether this principal, used as a rule pattern, covers `requester`
    pub fn covers(&self, requester: &Principal) -> bool {
        match (self, requester) {
            (Principal::Any, _) => true,
            (Principal::Role(pattern), Principal::Role(name)) => glob_match(pattern, name),
            (Principal::Role(_), Principal::Any) => false,
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Principal::Any => f.write_str("*"),
            Principal::Role(name) => write!(f, "role:{}", name),
        }
    }
}

impl std::str::FromStr for Principal {
    type Err = PolicyError;

    /// Parses `*` or `role:<name>`
    fn from_str(s: &str) -> Result<Self> {
        if s == "*" {
            return Ok(Principal::Any);
        }
        match s.strip_prefix("role:") {
            Some(name) if !name.is_empty() => Ok(Principal::Role(name.to_string())),
            _ => Err(PolicyError::Validation(format!(
                "principal '{}' must be '*' or 'role:<name>'",
                s
            ))),
        }
    }
}

/// A single policy rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule ID (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Who the rule applies to
    pub principal: Principal,

    /// Effect of this rule
    pub effect: Effect,

    /// Actions this rule applies to
    pub actions: ActionSet,

    /// Resource pattern over canonical resource paths
    pub resource: String,

    /// Conditions that must all hold for the rule to take effect
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl PolicyRule {
    /// Create a new unconditional rule
    pub fn new(
        effect: Effect,
        principal: Principal,
        actions: ActionSet,
        resource: impl Into<String>,
    ) -> Self {
        PolicyRule {
            sid: None,
            principal,
            effect,
            actions,
            resource: resource.into(),
            conditions: Vec::new(),
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Label used in logs and explanations
    pub fn label(&self) -> String {
        self.sid
            .clone()
            .unwrap_or_else(|| format!("{:?} {} on {}", self.effect, self.principal, self.resource))
    }

    /// Check structural well-formedness
    pub fn validate(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(PolicyError::Validation(format!(
                "rule '{}' has an empty action set",
                self.label()
            )));
        }
        if let Principal::Role(name) = &self.principal {
            if name.is_empty() {
                return Err(PolicyError::Validation(format!(
                    "rule '{}' names an empty role",
                    self.label()
                )));
            }
        }
        ResourcePattern::parse(&self.resource)?;
        for condition in &self.conditions {
            condition.validate()?;
        }
        Ok(())
    }

    /// Check if this rule's patterns cover the request (ignores conditions)
    pub fn applies_to(&self, principal: &Principal, resource_path: &str, action: &Action) -> bool {
        if !self.principal.covers(principal) {
            return false;
        }

        if !self.actions.iter().any(|a| a.matches(action)) {
            return false;
        }

        ResourcePattern::parse(&self.resource)
            .map(|p| p.matches(resource_path))
            .unwrap_or(false)
    }

    /// Check if all conditions hold for the request context
    pub fn conditions_hold(&self, context: &RequestContext) -> bool {
        all_hold(&self.conditions, context)
    }
}

/// Outcome of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    /// Deny-overrides combinator
    ///
    /// Any effective Deny yields Deny; otherwise any effective Allow yields
    /// Allow; with nothing effective the default is Deny. The input order
    /// never affects the result.
    pub fn combine<I>(effects: I) -> Decision
    where
        I: IntoIterator<Item = Effect>,
    {
        let mut allowed = false;
        for effect in effects {
            match effect {
                Effect::Deny => return Decision::Deny,
                Effect::Allow => allowed = true,
            }
        }
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allow => f.write_str("ALLOW"),
            Decision::Deny => f.write_str("DENY"),
        }
    }
}
