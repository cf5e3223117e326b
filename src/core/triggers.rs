//! Trigger-to-job bindings
//!
//! Each binding is a small state machine: `Disabled -> Enabled -> Disabled`.
//! Enabling is always an administrative action. Disabling is either
//! administrative or done by the bound job on its own trigger, which
//! requires a grant of `disable` on that trigger to the job.
//!
//! Firing an enabled binding hands the job to a [`JobInvoker`] once the
//! resolver allows the job's role to `invoke` the job. Completion is not
//! tracked. [`TriggerBinder::authorize_fire`] makes the decision without
//! invoking, so callers holding a lock can release it before the job runs.

use crate::catalog::{ResourceCatalog, ResourceKind};
use crate::error::{PolicyError, Result};
use crate::grants::Grant;
use crate::iam::{Action, PolicyResolver, Principal, RequestContext};
use crate::validation::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Rate or event pattern driving a trigger
///
/// Opaque apart from requiring a non-blank expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleDescriptor(String);

impl ScheduleDescriptor {
    pub fn new(expression: impl Into<String>) -> Self {
        ScheduleDescriptor(expression.into())
    }

    pub fn expression(&self) -> &str {
        &self.0
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.trim().is_empty() {
            return Err(PolicyError::Validation(
                "schedule expression is empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for ScheduleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingState {
    Disabled,
    Enabled,
}

impl std::fmt::Display for BindingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingState::Disabled => write!(f, "disabled"),
            BindingState::Enabled => write!(f, "enabled"),
        }
    }
}

/// Association of a trigger with the job it fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub id: String,
    pub trigger: ResourceId,
    pub job: ResourceId,
    pub schedule: ScheduleDescriptor,
    pub state: BindingState,
}

impl Binding {
    pub fn id_for(trigger: &ResourceId, job: &ResourceId) -> String {
        format!("{}-fires-{}", trigger, job)
    }

    pub fn is_enabled(&self) -> bool {
        self.state == BindingState::Enabled
    }
}

/// Result of a fire signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Binding disabled; nothing invoked
    Skipped,
    /// Job handed to the invoker
    Invoked,
}

/// Dispatches a compute job; fire-and-forget
pub trait JobInvoker: Send + Sync {
    fn invoke(&self, job: &ResourceId, binding: &Binding);
}

/// Owns the bindings and drives their state machine
#[derive(Debug, Clone, Default)]
pub struct TriggerBinder {
    bindings: BTreeMap<String, Binding>,
}

impl TriggerBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `trigger` to `job`
    ///
    /// The binding starts in the trigger's declared initial state.
    pub fn bind(
        &mut self,
        catalog: &ResourceCatalog,
        trigger: &ResourceId,
        job: &ResourceId,
    ) -> Result<&Binding> {
        let trigger_spec = catalog
            .get_kind(trigger, ResourceKind::Trigger)?
            .as_trigger()
            .ok_or_else(|| PolicyError::not_found("trigger", trigger))?;
        catalog.get_kind(job, ResourceKind::ComputeJob)?;

        let id = Binding::id_for(trigger, job);
        if self.bindings.contains_key(&id) {
            return Err(PolicyError::AlreadyExists(format!("binding '{}'", id)));
        }

        let binding = Binding {
            id: id.clone(),
            trigger: trigger.clone(),
            job: job.clone(),
            schedule: trigger_spec.schedule.clone(),
            state: if trigger_spec.enabled {
                BindingState::Enabled
            } else {
                BindingState::Disabled
            },
        };
        info!(
            "Bound trigger {} to job {} ({}, {})",
            trigger, job, binding.schedule, binding.state
        );
        Ok(self.bindings.entry(id).or_insert(binding))
    }

    /// Restore a binding as recorded, checking its references
    pub fn restore(&mut self, catalog: &ResourceCatalog, binding: Binding) -> Result<()> {
        catalog.get_kind(&binding.trigger, ResourceKind::Trigger)?;
        catalog.get_kind(&binding.job, ResourceKind::ComputeJob)?;
        binding.schedule.validate()?;
        if binding.id != Binding::id_for(&binding.trigger, &binding.job) {
            return Err(PolicyError::Validation(format!(
                "binding id '{}' does not match its trigger and job",
                binding.id
            )));
        }
        if self.bindings.contains_key(&binding.id) {
            return Err(PolicyError::AlreadyExists(format!(
                "binding '{}'",
                binding.id
            )));
        }
        self.bindings.insert(binding.id.clone(), binding);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Binding> {
        self.bindings
            .get(id)
            .ok_or_else(|| PolicyError::not_found("binding", id))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Binding> {
        self.bindings
            .get_mut(id)
            .ok_or_else(|| PolicyError::not_found("binding", id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop a binding
    pub fn unbind(&mut self, id: &str) -> Result<Binding> {
        self.bindings
            .remove(id)
            .ok_or_else(|| PolicyError::not_found("binding", id))
    }

    /// True if some binding references `id` as trigger or job
    pub fn references(&self, id: &ResourceId) -> bool {
        self.bindings
            .values()
            .any(|b| &b.trigger == id || &b.job == id)
    }

    /// Administrative `Disabled -> Enabled`
    pub fn enable(&mut self, id: &str) -> Result<()> {
        let binding = self.get_mut(id)?;
        if binding.state != BindingState::Enabled {
            binding.state = BindingState::Enabled;
            info!("Enabled binding {}", id);
        }
        Ok(())
    }

    /// Administrative `Enabled -> Disabled`
    pub fn disable(&mut self, id: &str) -> Result<()> {
        let binding = self.get_mut(id)?;
        if binding.state != BindingState::Disabled {
            binding.state = BindingState::Disabled;
            info!("Disabled binding {}", id);
        }
        Ok(())
    }

    /// The bound job disables its own trigger
    ///
    /// Fails with `PermissionDenied` unless one of `grants` gives the job
    /// `disable` on this trigger and the resolver allows it. Broad rules
    /// alone are not enough. The binding is left unchanged on failure.
    pub fn self_disable(
        &mut self,
        id: &str,
        catalog: &ResourceCatalog,
        resolver: &PolicyResolver,
        grants: &[Grant],
    ) -> Result<()> {
        let binding = self.get(id)?;
        let principal = job_principal(catalog, &binding.job)?;

        let granted = grants.iter().any(|g| {
            g.job == binding.job
                && g.resource == binding.trigger
                && g.actions.contains(&Action::Disable)
        });
        if !granted {
            warn!(
                binding = id,
                job = %binding.job,
                "self-disable without a disable grant"
            );
            return Err(PolicyError::PermissionDenied(format!(
                "job '{}' holds no grant to disable trigger '{}'",
                binding.job, binding.trigger
            )));
        }
        let decision = resolver.evaluate(
            catalog,
            &principal,
            &binding.trigger,
            Action::Disable,
            &RequestContext::new(),
        )?;

        if !decision.is_allow() {
            warn!(
                binding = id,
                principal = %principal,
                "self-disable denied"
            );
            return Err(PolicyError::PermissionDenied(format!(
                "{} may not disable trigger '{}'",
                principal, binding.trigger
            )));
        }

        self.disable(id)
    }

    /// Deliver a fire signal
    ///
    /// Disabled bindings are skipped. Enabled bindings invoke the job
    /// exactly once, provided its role is allowed to invoke it; otherwise
    /// `PermissionDenied`.
    pub fn fire(
        &self,
        id: &str,
        catalog: &ResourceCatalog,
        resolver: &PolicyResolver,
        invoker: &dyn JobInvoker,
    ) -> Result<FireOutcome> {
        match self.authorize_fire(id, catalog, resolver)? {
            Some(binding) => {
                invoker.invoke(&binding.job, &binding);
                Ok(FireOutcome::Invoked)
            }
            None => Ok(FireOutcome::Skipped),
        }
    }

    /// Decide a fire signal without running the job
    ///
    /// `None` for a disabled binding, a copy of the binding when the job
    /// may run.
    pub fn authorize_fire(
        &self,
        id: &str,
        catalog: &ResourceCatalog,
        resolver: &PolicyResolver,
    ) -> Result<Option<Binding>> {
        let binding = self.get(id)?;
        if !binding.is_enabled() {
            debug!("Binding {} is disabled, skipping fire", id);
            return Ok(None);
        }

        let principal = job_principal(catalog, &binding.job)?;
        let decision = resolver.evaluate(
            catalog,
            &principal,
            &binding.job,
            Action::Invoke,
            &RequestContext::new(),
        )?;
        if !decision.is_allow() {
            warn!(binding = id, principal = %principal, "invocation denied");
            return Err(PolicyError::PermissionDenied(format!(
                "{} may not invoke job '{}'",
                principal, binding.job
            )));
        }

        debug!("Firing binding {} -> job {}", id, binding.job);
        Ok(Some(binding.clone()))
    }

    /// Whether some enabled binding would run `job`
    ///
    /// Disabled bindings never make a job reachable.
    pub fn is_reachable(
        &self,
        job: &ResourceId,
        catalog: &ResourceCatalog,
        resolver: &PolicyResolver,
    ) -> bool {
        let principal = match job_principal(catalog, job) {
            Ok(p) => p,
            Err(_) => return false,
        };
        self.bindings
            .values()
            .filter(|b| &b.job == job && b.is_enabled())
            .any(|_| {
                matches!(
                    resolver.evaluate(catalog, &principal, job, Action::Invoke, &RequestContext::new()),
                    Ok(d) if d.is_allow()
                )
            })
    }

    /// Check every binding still points at a trigger and a job
    pub fn verify(&self, catalog: &ResourceCatalog) -> Result<()> {
        for binding in self.bindings.values() {
            catalog.get_kind(&binding.trigger, ResourceKind::Trigger)?;
            catalog.get_kind(&binding.job, ResourceKind::ComputeJob)?;
        }
        Ok(())
    }
}

fn job_principal(catalog: &ResourceCatalog, job: &ResourceId) -> Result<Principal> {
    let spec = catalog
        .get_kind(job, ResourceKind::ComputeJob)?
        .as_job()
        .ok_or_else(|| PolicyError::not_found("compute job", job))?;
    Ok(Principal::role(spec.role.as_str()))
}
