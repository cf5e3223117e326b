//! Least-privilege grant planning
//!
//! A compute job declares, in order, the capabilities it needs: an action
//! set on one specific resource, optionally under conditions. Planning turns
//! those into grants (materialized allow rules) for the job's role:
//! - one grant per distinct (resource, action set); repeats are dropped
//! - never wider than declared: no `*` actions, no patterns, no merging of
//!   unrelated resources
//! - every action must make sense for the target's kind
//! - a capability that an existing deny rule would always block is a
//!   conflict and fails the whole plan

use crate::catalog::{path_of, ResourceCatalog, ResourceKind};
use crate::encryption::names_foreign_key;
use crate::error::{PolicyError, Result};
use crate::iam::{
    Action, ActionSet, Condition, ConditionOperator, Effect, PolicyResolver, PolicyRule,
    Principal, RequestContext,
};
use crate::validation::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// A declared need of a compute job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub resource: ResourceId,
    pub actions: ActionSet,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Capability {
    pub fn new(resource: ResourceId, actions: &[Action]) -> Self {
        Capability {
            resource,
            actions: actions.iter().copied().collect(),
            conditions: Vec::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// Checks that don't need the catalog
    pub fn validate_shape(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(PolicyError::Validation(format!(
                "capability on '{}' has no actions",
                self.resource
            )));
        }
        if self.actions.contains(&Action::All) {
            return Err(PolicyError::Validation(format!(
                "capability on '{}' uses the '*' action; declare each action",
                self.resource
            )));
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        Ok(())
    }

    /// The request shape this capability guarantees
    ///
    /// Only single-valued positive conditions without `if_exists` pin a
    /// context value; everything else is left open.
    fn witness_context(&self) -> RequestContext {
        let mut ctx = RequestContext::new();
        for condition in &self.conditions {
            let pins = matches!(
                condition.operator,
                ConditionOperator::StringEquals
                    | ConditionOperator::NumericEquals
                    | ConditionOperator::Bool
            );
            if pins && !condition.if_exists && condition.values.len() == 1 {
                ctx.insert(condition.key.clone(), condition.values[0].clone());
            }
        }
        ctx
    }
}

/// A materialized allow rule for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub id: String,
    /// Job the grant was planned for
    pub job: ResourceId,
    pub principal: Principal,
    pub resource: ResourceId,
    pub resource_kind: ResourceKind,
    pub actions: ActionSet,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Grant {
    /// The allow rule the resolver consumes
    pub fn to_rule(&self) -> PolicyRule {
        PolicyRule {
            sid: Some(self.id.clone()),
            principal: self.principal.clone(),
            effect: Effect::Allow,
            actions: self.actions.clone(),
            resource: path_of(self.resource_kind, &self.resource),
            conditions: self.conditions.clone(),
        }
    }

    /// Same principal, target, actions and conditions
    pub fn same_scope(&self, other: &Grant) -> bool {
        self.principal == other.principal
            && self.resource == other.resource
            && self.actions == other.actions
            && self.conditions == other.conditions
    }
}

/// Output of planning one job
#[derive(Debug, Clone, PartialEq)]
pub struct GrantPlan {
    pub job: ResourceId,
    pub grants: Vec<Grant>,
    /// Capabilities that added nothing (exact repeats, or action sets
    /// contained in another capability on the same resource)
    pub redundant: Vec<String>,
}

/// Turns declared capabilities into grants
#[derive(Debug, Default, Clone)]
pub struct GrantPlanner;

impl GrantPlanner {
    pub fn new() -> Self {
        GrantPlanner
    }

    /// Plan grants for the compute job `job`
    ///
    /// `resolver` holds the deny rules the plan is checked against.
    pub fn plan(
        &self,
        catalog: &ResourceCatalog,
        resolver: &PolicyResolver,
        job: &ResourceId,
    ) -> Result<GrantPlan> {
        let job_resource = catalog.get_kind(job, ResourceKind::ComputeJob)?;
        let spec = job_resource
            .as_job()
            .ok_or_else(|| PolicyError::not_found("compute job", job))?;
        let principal = Principal::role(spec.role.as_str());

        let mut grants: Vec<Grant> = Vec::new();
        let mut redundant = Vec::new();

        for capability in &spec.capabilities {
            capability.validate_shape()?;

            let target = catalog.get(&capability.resource)?;
            let kind = target.kind();
            if let Some(action) = capability.actions.iter().find(|a| !kind.supports(**a)) {
                return Err(PolicyError::Validation(format!(
                    "job '{}' requests '{}' on {} '{}', which does not support it",
                    job, action, kind, capability.resource
                )));
            }

            if kind == ResourceKind::StorageContainer {
                let key = catalog.key_of(&capability.resource)?;
                if names_foreign_key(&key.id, &capability.conditions) {
                    return Err(PolicyError::Conflict(format!(
                        "job '{}' pins a key other than '{}' for writes to '{}'",
                        job, key.id, capability.resource
                    )));
                }
            }

            self.check_conflicts(resolver, &principal, job, capability, &target.path())?;

            if let Some(existing) = grants
                .iter()
                .find(|g| g.resource == capability.resource && g.actions == capability.actions)
            {
                if existing.conditions != capability.conditions {
                    return Err(PolicyError::Conflict(format!(
                        "job '{}' declares {} on '{}' twice with different conditions",
                        job,
                        describe(&capability.actions),
                        capability.resource
                    )));
                }
                let note = format!(
                    "{} on '{}' repeated",
                    describe(&capability.actions),
                    capability.resource
                );
                warn!(job = %job, "redundant capability: {}", note);
                redundant.push(note);
                continue;
            }

            let grant = Grant {
                id: format!("{}-grant-{}", job, grants.len() + 1),
                job: job.clone(),
                principal: principal.clone(),
                resource: capability.resource.clone(),
                resource_kind: kind,
                actions: capability.actions.clone(),
                conditions: capability.conditions.clone(),
            };
            debug!(
                job = %job,
                grant = %grant.id,
                resource = %grant.resource,
                actions = %describe(&grant.actions),
                "planned grant"
            );
            grants.push(grant);
        }

        // subsumed action sets stay as separate grants but are reported
        for grant in &grants {
            let subsumed = grants.iter().any(|other| {
                other.id != grant.id
                    && other.resource == grant.resource
                    && other.conditions == grant.conditions
                    && grant.actions.is_subset(&other.actions)
            });
            if subsumed {
                let note = format!(
                    "{} on '{}' is contained in a wider capability",
                    describe(&grant.actions),
                    grant.resource
                );
                warn!(job = %job, "redundant capability: {}", note);
                redundant.push(note);
            }
        }

        Ok(GrantPlan {
            job: job.clone(),
            grants,
            redundant,
        })
    }

    /// Fail if some deny rule blocks every request this capability allows
    fn check_conflicts(
        &self,
        resolver: &PolicyResolver,
        principal: &Principal,
        job: &ResourceId,
        capability: &Capability,
        resource_path: &str,
    ) -> Result<()> {
        let witness = capability.witness_context();
        for action in &capability.actions {
            if let Some(rule) = resolver
                .matching_denies(principal, resource_path, *action)
                .find(|rule| rule.conditions_hold(&witness))
            {
                return Err(PolicyError::Conflict(format!(
                    "job '{}' requests '{}' on '{}' but deny rule '{}' blocks it under the declared conditions",
                    job,
                    action,
                    capability.resource,
                    rule.label()
                )));
            }
        }
        Ok(())
    }

    /// Check that every grant stays within its job's declared capabilities
    pub fn verify_least_privilege(catalog: &ResourceCatalog, grants: &[Grant]) -> Result<()> {
        for grant in grants {
            let job = catalog.get_kind(&grant.job, ResourceKind::ComputeJob)?;
            let spec = job
                .as_job()
                .ok_or_else(|| PolicyError::not_found("compute job", &grant.job))?;

            if grant.principal != Principal::role(spec.role.as_str()) {
                return Err(PolicyError::Validation(format!(
                    "grant '{}' is held by {} but job '{}' runs as role:{}",
                    grant.id, grant.principal, grant.job, spec.role
                )));
            }

            let declared: BTreeSet<Action> = spec
                .capabilities
                .iter()
                .filter(|c| c.resource == grant.resource)
                .flat_map(|c| c.actions.iter().copied())
                .collect();

            if grant.actions.contains(&Action::All) || !grant.actions.is_subset(&declared) {
                return Err(PolicyError::Validation(format!(
                    "grant '{}' allows {} on '{}' but job '{}' only declares {}",
                    grant.id,
                    describe(&grant.actions),
                    grant.resource,
                    grant.job,
                    describe(&declared)
                )));
            }

            if grant.resource_kind == ResourceKind::StorageContainer {
                let key = catalog.key_of(&grant.resource)?;
                if names_foreign_key(&key.id, &grant.conditions) {
                    return Err(PolicyError::Validation(format!(
                        "grant '{}' pins a key other than '{}', the key of '{}'",
                        grant.id, key.id, grant.resource
                    )));
                }
            }
        }
        Ok(())
    }
}

fn describe(actions: &ActionSet) -> String {
    if actions.is_empty() {
        return "nothing".to_string();
    }
    actions
        .iter()
        .map(Action::as_str)
        .collect::<Vec<_>>()
        .join("+")
}
