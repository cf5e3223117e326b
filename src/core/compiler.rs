//! Policy compiler
//!
//! [`PolicyCompiler`] owns the catalog, the explicit rule set (user rules
//! plus generated encryption rules), the planned grants and the trigger
//! bindings. Readers (evaluation, explain, fire, export) share a read
//! lock; every mutation takes the write lock and rebuilds the resolver,
//! which also discards cached decisions.

use crate::catalog::{Resource, ResourceCatalog, ResourceKind};
use crate::encryption::{ContainerGate, EncryptionGate, DEFAULT_APPROVED_MODE};
use crate::error::{PolicyError, Result};
use crate::grants::{Grant, GrantPlan, GrantPlanner};
use crate::iam::{
    Action, Decision, Evaluation, PolicyResolver, PolicyRule, Principal, RequestContext,
    DEFAULT_CACHE_CAPACITY,
};
use crate::manifest::PolicyManifest;
use crate::triggers::{Binding, FireOutcome, JobInvoker, TriggerBinder};
use crate::validation::ResourceId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};
use validator::Validate;

/// Compiler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CompilerConfig {
    /// Decision cache entries
    #[validate(range(min = 1, max = 1_000_000))]
    pub cache_capacity: usize,

    /// Encryption mode writes to storage containers must declare
    #[validate(length(min = 1, max = 64))]
    pub approved_encryption_mode: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            approved_encryption_mode: DEFAULT_APPROVED_MODE.to_string(),
        }
    }
}

impl CompilerConfig {
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| PolicyError::Validation(format!("compiler config: {}", e)))
    }
}

struct PolicyState {
    catalog: ResourceCatalog,
    rules: Vec<PolicyRule>,
    grants: Vec<Grant>,
    binder: TriggerBinder,
    resolver: PolicyResolver,
}

impl PolicyState {
    fn empty(cache_capacity: usize) -> Self {
        PolicyState {
            catalog: ResourceCatalog::new(),
            rules: Vec::new(),
            grants: Vec::new(),
            binder: TriggerBinder::new(),
            resolver: PolicyResolver::empty(cache_capacity),
        }
    }

    fn rebuild(&mut self, cache_capacity: usize) -> Result<()> {
        let rules = self
            .rules
            .iter()
            .cloned()
            .chain(self.grants.iter().map(Grant::to_rule))
            .collect();
        self.resolver = PolicyResolver::new(rules, cache_capacity)?;
        Ok(())
    }

    fn has_sid(&self, sid: &str) -> bool {
        self.rules.iter().any(|r| r.sid.as_deref() == Some(sid))
            || self.grants.iter().any(|g| g.id == sid)
    }

    /// Sids of rules generated for storage containers
    fn gate_sids(&self) -> BTreeSet<String> {
        self.catalog
            .of_kind(ResourceKind::StorageContainer)
            .flat_map(|r| ContainerGate::rule_ids(&r.id))
            .collect()
    }

    fn install_gate(&mut self, gate: &EncryptionGate, container: &ResourceId) -> Result<()> {
        let rules = gate.for_container(&self.catalog, container)?.deny_rules();
        for rule in &rules {
            if let Some(sid) = &rule.sid {
                if self.has_sid(sid) {
                    return Err(PolicyError::AlreadyExists(format!("rule '{}'", sid)));
                }
            }
        }
        self.rules.extend(rules);
        Ok(())
    }

    fn uninstall_gate(&mut self, container: &ResourceId) {
        let sids = ContainerGate::rule_ids(container);
        self.rules
            .retain(|r| !r.sid.as_ref().map_or(false, |s| sids.contains(s)));
    }

    /// Everything that still points at `id`
    fn references_to(&self, id: &ResourceId) -> Vec<String> {
        let mut refs = Vec::new();
        for resource in self.catalog.iter() {
            if let Some(container) = resource.as_container() {
                if container.encryption_key.as_ref() == Some(id) {
                    refs.push(format!("storage container '{}'", resource.id));
                }
            }
            if let Some(job) = resource.as_job() {
                let code_from = job.code.as_ref().map_or(false, |c| &c.bucket == id);
                if &resource.id != id
                    && (code_from || job.capabilities.iter().any(|c| &c.resource == id))
                {
                    refs.push(format!("compute job '{}'", resource.id));
                }
            }
        }
        for grant in &self.grants {
            if &grant.resource == id || &grant.job == id {
                refs.push(format!("grant '{}'", grant.id));
            }
        }
        for binding in self.binder.iter() {
            if &binding.trigger == id || &binding.job == id {
                refs.push(format!("binding '{}'", binding.id));
            }
        }
        refs
    }

    /// Follow-up of a wholesale replacement of `old`
    fn apply_replacement(&mut self, gate: &EncryptionGate, old: &Resource) -> Result<()> {
        let id = &old.id;
        if old.kind() == ResourceKind::StorageContainer {
            self.uninstall_gate(id);
        }
        let new = self.catalog.get(id)?.clone();
        if new.kind() == ResourceKind::StorageContainer {
            self.install_gate(gate, id)?;

            let old_key = old.as_container().and_then(|c| c.encryption_key.as_ref());
            let new_key = new.as_container().and_then(|c| c.encryption_key.as_ref());
            if old_key != new_key {
                let container = gate.for_container(&self.catalog, id)?;
                let before = self.grants.len();
                self.grants
                    .retain(|g| &g.resource != id || !container.names_foreign_key(&g.conditions));
                if self.grants.len() != before {
                    info!(
                        "Dropped {} grants pinning the previous key of '{}'",
                        before - self.grants.len(),
                        id
                    );
                }
            }
        }

        let old_job = old.as_job().map(|j| (&j.role, &j.capabilities));
        let new_job = new.as_job().map(|j| (&j.role, &j.capabilities));
        if old_job != new_job {
            let before = self.grants.len();
            self.grants.retain(|g| &g.job != id);
            if self.grants.len() != before {
                info!(
                    "Dropped {} grants of replaced job '{}'",
                    before - self.grants.len(),
                    id
                );
            }
        }
        self.check_references()
    }

    fn check_references(&self) -> Result<()> {
        for container in self.catalog.of_kind(ResourceKind::StorageContainer) {
            self.catalog.key_of(&container.id)?;
        }
        for job in self.catalog.of_kind(ResourceKind::ComputeJob) {
            if let Some(code) = job.as_job().and_then(|j| j.code.as_ref()) {
                let bucket = self.catalog.get(&code.bucket)?;
                if !matches!(
                    bucket.kind(),
                    ResourceKind::StorageContainer | ResourceKind::ExternalStorage
                ) {
                    return Err(PolicyError::Validation(format!(
                        "compute job '{}' loads its code from {} '{}'",
                        job.id,
                        bucket.kind(),
                        code.bucket
                    )));
                }
            }
        }
        for grant in &self.grants {
            self.catalog.get_kind(&grant.job, ResourceKind::ComputeJob)?;
            self.catalog.get_kind(&grant.resource, grant.resource_kind)?;
        }
        self.binder.verify(&self.catalog)
    }
}

/// Compiled policy state with reader-writer access
pub struct PolicyCompiler {
    state: RwLock<PolicyState>,
    gate: EncryptionGate,
    planner: GrantPlanner,
    config: CompilerConfig,
}

impl PolicyCompiler {
    pub fn new(config: CompilerConfig) -> Result<Self> {
        config.check()?;
        Ok(PolicyCompiler {
            state: RwLock::new(PolicyState::empty(config.cache_capacity)),
            gate: EncryptionGate::new(config.approved_encryption_mode.clone()),
            planner: GrantPlanner::new(),
            config,
        })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn encryption_gate(&self) -> &EncryptionGate {
        &self.gate
    }

    /// Encryption requirements of a catalogued storage container
    pub fn container_gate(&self, container: &ResourceId) -> Result<ContainerGate> {
        self.gate.for_container(&self.state.read().catalog, container)
    }

    /// Add a resource
    ///
    /// Storage containers must reference a catalogued key; their two
    /// encryption deny rules are installed with them.
    pub fn add_resource(&self, resource: Resource) -> Result<()> {
        let mut state = self.state.write();
        let id = resource.id.clone();
        let kind = resource.kind();
        state.catalog.insert(resource)?;

        if kind == ResourceKind::StorageContainer {
            if let Err(e) = state.install_gate(&self.gate, &id) {
                state.catalog.remove(&id)?;
                return Err(e);
            }
        }
        state.rebuild(self.config.cache_capacity)?;
        info!("Added {} '{}'", kind, id);
        Ok(())
    }

    /// Replace a resource wholesale
    ///
    /// Encryption rules follow the new definition. Replacing a compute job
    /// whose capabilities changed drops its grants; plan them again.
    pub fn replace_resource(&self, resource: Resource) -> Result<()> {
        let mut state = self.state.write();
        let id = resource.id.clone();
        let saved_rules = state.rules.clone();
        let saved_grants = state.grants.clone();
        let old = state.catalog.replace(resource)?;

        let result = state.apply_replacement(&self.gate, &old);

        if let Err(e) = result {
            state.catalog.replace(old)?;
            state.rules = saved_rules;
            state.grants = saved_grants;
            return Err(e);
        }
        state.rebuild(self.config.cache_capacity)?;
        info!("Replaced resource '{}'", id);
        Ok(())
    }

    /// Remove a resource nothing references any more
    pub fn remove_resource(&self, id: &ResourceId) -> Result<Resource> {
        let mut state = self.state.write();
        let refs = state.references_to(id);
        if !refs.is_empty() {
            return Err(PolicyError::Conflict(format!(
                "resource '{}' is still referenced by {}",
                id,
                refs.join(", ")
            )));
        }
        let removed = state.catalog.remove(id)?;
        if removed.kind() == ResourceKind::StorageContainer {
            state.uninstall_gate(id);
        }
        state.rebuild(self.config.cache_capacity)?;
        info!("Removed {} '{}'", removed.kind(), id);
        Ok(removed)
    }

    pub fn resource(&self, id: &ResourceId) -> Result<Resource> {
        self.state.read().catalog.get(id).cloned()
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.state.read().catalog.iter().cloned().collect()
    }

    /// Add an explicit rule
    pub fn add_rule(&self, rule: PolicyRule) -> Result<()> {
        rule.validate()?;
        let mut state = self.state.write();
        if let Some(sid) = &rule.sid {
            if state.has_sid(sid) {
                return Err(PolicyError::AlreadyExists(format!("rule '{}'", sid)));
            }
        }
        debug!("Adding rule {}", rule.label());
        state.rules.push(rule);
        state.rebuild(self.config.cache_capacity)
    }

    /// Remove an explicit rule by sid
    ///
    /// Encryption rules go away only with their container.
    pub fn remove_rule(&self, sid: &str) -> Result<PolicyRule> {
        let mut state = self.state.write();
        if state.gate_sids().contains(sid) {
            return Err(PolicyError::Validation(format!(
                "rule '{}' enforces container encryption and cannot be removed on its own",
                sid
            )));
        }
        let position = state
            .rules
            .iter()
            .position(|r| r.sid.as_deref() == Some(sid))
            .ok_or_else(|| PolicyError::not_found("rule", sid))?;
        let rule = state.rules.remove(position);
        state.rebuild(self.config.cache_capacity)?;
        info!("Removed rule '{}'", sid);
        Ok(rule)
    }

    /// Explicit rules, generated encryption rules included
    pub fn rules(&self) -> Vec<PolicyRule> {
        self.state.read().rules.clone()
    }

    /// Plan (or re-plan) the grants of a compute job
    ///
    /// Replaces the job's previous grants, so planning twice yields the
    /// same grant set.
    pub fn plan_grants(&self, job: &ResourceId) -> Result<GrantPlan> {
        let mut state = self.state.write();
        let plan = self.planner.plan(&state.catalog, &state.resolver, job)?;

        for grant in &plan.grants {
            let taken = state
                .rules
                .iter()
                .any(|r| r.sid.as_deref() == Some(grant.id.as_str()))
                || state.grants.iter().any(|g| g.id == grant.id && &g.job != job);
            if taken {
                return Err(PolicyError::AlreadyExists(format!("rule '{}'", grant.id)));
            }
        }

        state.grants.retain(|g| &g.job != job);
        state.grants.extend(plan.grants.iter().cloned());
        state.rebuild(self.config.cache_capacity)?;
        info!("Planned {} grants for job '{}'", plan.grants.len(), job);
        Ok(plan)
    }

    pub fn revoke_grant(&self, id: &str) -> Result<Grant> {
        let mut state = self.state.write();
        let position = state
            .grants
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| PolicyError::not_found("grant", id))?;
        let grant = state.grants.remove(position);
        state.rebuild(self.config.cache_capacity)?;
        info!("Revoked grant '{}'", id);
        Ok(grant)
    }

    pub fn grants(&self) -> Vec<Grant> {
        self.state.read().grants.clone()
    }

    pub fn bind(&self, trigger: &ResourceId, job: &ResourceId) -> Result<Binding> {
        let mut state = self.state.write();
        let state = &mut *state;
        state.binder.bind(&state.catalog, trigger, job).cloned()
    }

    pub fn unbind(&self, binding: &str) -> Result<Binding> {
        self.state.write().binder.unbind(binding)
    }

    pub fn enable(&self, binding: &str) -> Result<()> {
        self.state.write().binder.enable(binding)
    }

    pub fn disable(&self, binding: &str) -> Result<()> {
        self.state.write().binder.disable(binding)
    }

    /// The bound job disables its own trigger
    pub fn self_disable(&self, binding: &str) -> Result<()> {
        let mut state = self.state.write();
        let state = &mut *state;
        state
            .binder
            .self_disable(binding, &state.catalog, &state.resolver, &state.grants)
    }

    pub fn binding(&self, id: &str) -> Result<Binding> {
        self.state.read().binder.get(id).cloned()
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.state.read().binder.iter().cloned().collect()
    }

    /// Deliver a fire signal to a binding
    ///
    /// The job runs after the state lock is released, so the invoker may
    /// call back into the compiler (for example to self-disable).
    pub fn fire(&self, binding: &str, invoker: &dyn JobInvoker) -> Result<FireOutcome> {
        let authorized = {
            let state = self.state.read();
            state
                .binder
                .authorize_fire(binding, &state.catalog, &state.resolver)?
        };
        match authorized {
            Some(binding) => {
                invoker.invoke(&binding.job, &binding);
                Ok(FireOutcome::Invoked)
            }
            None => Ok(FireOutcome::Skipped),
        }
    }

    pub fn is_reachable(&self, job: &ResourceId) -> bool {
        let state = self.state.read();
        state
            .binder
            .is_reachable(job, &state.catalog, &state.resolver)
    }

    /// Decide a request against a catalogued resource
    pub fn evaluate(
        &self,
        principal: &Principal,
        resource: &ResourceId,
        action: Action,
        context: &RequestContext,
    ) -> Result<Decision> {
        let state = self.state.read();
        state
            .resolver
            .evaluate(&state.catalog, principal, resource, action, context)
    }

    /// Decision plus the rules that produced it
    pub fn explain(
        &self,
        principal: &Principal,
        resource: &ResourceId,
        action: Action,
        context: &RequestContext,
    ) -> Result<Evaluation> {
        let state = self.state.read();
        state
            .resolver
            .explain_resource(&state.catalog, principal, resource, action, context)
    }

    /// Number of cached decisions
    pub fn cache_size(&self) -> usize {
        self.state.read().resolver.cache_size()
    }

    /// Check the structural invariants of the compiled state
    ///
    /// - every storage container references exactly one catalogued key
    /// - every container has both encryption deny rules
    /// - no grant exceeds its job's declared capabilities
    /// - grants and bindings reference catalogued resources
    pub fn verify(&self) -> Result<()> {
        let state = self.state.read();
        state.check_references()?;
        self.gate.verify(&state.catalog, state.rules.iter())?;
        GrantPlanner::verify_least_privilege(&state.catalog, &state.grants)?;
        debug!(
            "Verified {} resources, {} rules, {} grants, {} bindings",
            state.catalog.len(),
            state.rules.len(),
            state.grants.len(),
            state.binder.len()
        );
        Ok(())
    }

    pub fn to_manifest(&self) -> PolicyManifest {
        let state = self.state.read();
        let mut manifest = PolicyManifest::new(self.gate.approved_mode());
        manifest.resources = state.catalog.iter().cloned().collect();
        manifest.rules = state.rules.clone();
        manifest.grants = state.grants.clone();
        manifest.bindings = state.binder.iter().cloned().collect();
        manifest
    }

    /// Rebuild a compiler from a manifest and verify it
    ///
    /// The manifest's approved encryption mode overrides the one in
    /// `config`.
    pub fn from_manifest(manifest: &PolicyManifest, mut config: CompilerConfig) -> Result<Self> {
        manifest.check_version()?;
        config.approved_encryption_mode = manifest.approved_encryption_mode.clone();
        let compiler = PolicyCompiler::new(config)?;

        {
            let mut state = compiler.state.write();
            let state = &mut *state;
            for resource in &manifest.resources {
                state.catalog.insert(resource.clone())?;
            }
            for rule in &manifest.rules {
                rule.validate()?;
                if let Some(sid) = &rule.sid {
                    if state.has_sid(sid) {
                        return Err(PolicyError::AlreadyExists(format!("rule '{}'", sid)));
                    }
                }
                state.rules.push(rule.clone());
            }
            for grant in &manifest.grants {
                if state.has_sid(&grant.id) {
                    return Err(PolicyError::AlreadyExists(format!("grant '{}'", grant.id)));
                }
                state.grants.push(grant.clone());
            }
            for binding in &manifest.bindings {
                state.binder.restore(&state.catalog, binding.clone())?;
            }
            state.rebuild(compiler.config.cache_capacity)?;
        }

        compiler.verify()?;
        info!(
            "Compiled policy state from manifest ({} resources)",
            manifest.resources.len()
        );
        Ok(compiler)
    }
}

impl Default for PolicyCompiler {
    fn default() -> Self {
        let config = CompilerConfig::default();
        PolicyCompiler {
            state: RwLock::new(PolicyState::empty(config.cache_capacity)),
            gate: EncryptionGate::new(config.approved_encryption_mode.clone()),
            planner: GrantPlanner::new(),
            config,
        }
    }
}

impl std::fmt::Debug for PolicyCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("PolicyCompiler")
            .field("resources", &state.catalog.len())
            .field("rules", &state.rules.len())
            .field("grants", &state.grants.len())
            .field("bindings", &state.binder.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::JobSpec;
    use crate::grants::Capability;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn compiler() -> PolicyCompiler {
        let compiler = PolicyCompiler::default();
        compiler.add_resource(Resource::key(id("dataedu-key"))).unwrap();
        compiler
            .add_resource(Resource::storage_container(id("raw"), id("dataedu-key")))
            .unwrap();
        compiler
    }

    #[test]
    fn test_container_installs_gate() {
        let compiler = compiler();
        let sids: Vec<_> = compiler.rules().into_iter().filter_map(|r| r.sid).collect();
        assert_eq!(sids, vec!["raw-deny-unapproved-mode", "raw-deny-foreign-key"]);
        assert!(compiler.verify().is_ok());
    }

    #[test]
    fn test_container_without_key_rejected() {
        let compiler = compiler();
        let err = compiler
            .add_resource(Resource::storage_container(id("curated"), id("missing")))
            .unwrap_err();
        assert!(matches!(err, PolicyError::NotFound(_)));
        assert!(compiler.resource(&id("curated")).is_err());
        assert_eq!(compiler.rules().len(), 2);
    }

    #[test]
    fn test_gate_rules_cannot_be_removed() {
        let compiler = compiler();
        assert!(matches!(
            compiler.remove_rule("raw-deny-foreign-key"),
            Err(PolicyError::Validation(_))
        ));
    }

    #[test]
    fn test_remove_referenced_resource() {
        let compiler = compiler();
        assert!(matches!(
            compiler.remove_resource(&id("dataedu-key")),
            Err(PolicyError::Conflict(_))
        ));
        compiler.remove_resource(&id("raw")).unwrap();
        assert!(compiler.rules().is_empty());
        compiler.remove_resource(&id("dataedu-key")).unwrap();
    }

    #[test]
    fn test_replan_is_idempotent() {
        let compiler = compiler();
        let job = JobSpec::new("crawler-role")
            .with_capability(Capability::new(id("raw"), &[Action::List, Action::Read]));
        compiler
            .add_resource(Resource::compute_job(id("crawler"), job))
            .unwrap();

        let first = compiler.plan_grants(&id("crawler")).unwrap();
        let second = compiler.plan_grants(&id("crawler")).unwrap();
        assert_eq!(first.grants, second.grants);
        assert_eq!(compiler.grants().len(), 1);
    }

    #[test]
    fn test_replacing_job_drops_grants() {
        let compiler = compiler();
        let job = JobSpec::new("crawler-role")
            .with_capability(Capability::new(id("raw"), &[Action::List, Action::Read]));
        compiler
            .add_resource(Resource::compute_job(id("crawler"), job))
            .unwrap();
        compiler.plan_grants(&id("crawler")).unwrap();

        let narrower = JobSpec::new("crawler-role")
            .with_capability(Capability::new(id("raw"), &[Action::List]));
        compiler
            .replace_resource(Resource::compute_job(id("crawler"), narrower))
            .unwrap();
        assert!(compiler.grants().is_empty());
        assert!(compiler.verify().is_ok());
    }

    #[test]
    fn test_rekeyed_container_drops_stale_grants() {
        let compiler = compiler();
        let encrypted = compiler.container_gate(&id("raw")).unwrap().compliant_conditions();
        let job = JobSpec::new("writer-role")
            .with_capability(Capability::new(id("raw"), &[Action::List]))
            .with_capability(
                Capability::new(id("raw"), &[Action::Write]).with_conditions(encrypted),
            );
        compiler
            .add_resource(Resource::compute_job(id("writer"), job))
            .unwrap();
        compiler.plan_grants(&id("writer")).unwrap();
        assert_eq!(compiler.grants().len(), 2);

        compiler.add_resource(Resource::key(id("rotated-key"))).unwrap();
        compiler
            .replace_resource(Resource::storage_container(id("raw"), id("rotated-key")))
            .unwrap();

        // the list grant carries no key, the write grant pinned the old one
        let grants = compiler.grants();
        assert_eq!(grants.len(), 1);
        assert!(!grants[0].actions.contains(&Action::Write));
        assert!(compiler.verify().is_ok());

        let rotated = RequestContext::new()
            .with(crate::encryption::ENCRYPTION_MODE_KEY, "kms")
            .with(crate::encryption::ENCRYPTION_KEY_ID_KEY, "rotated-key");
        let writer = Principal::role("writer-role");
        assert_eq!(
            compiler
                .evaluate(&writer, &id("raw"), Action::Write, &rotated)
                .unwrap(),
            Decision::Deny
        );

        // replanning the unchanged job can't bring the stale grant back
        assert!(matches!(
            compiler.plan_grants(&id("writer")),
            Err(PolicyError::Conflict(_))
        ));
        assert_eq!(compiler.grants().len(), 1);
    }

    #[test]
    fn test_replace_key_with_other_kind_reverts() {
        let compiler = compiler();
        let err = compiler
            .replace_resource(Resource::log_group(id("dataedu-key")))
            .unwrap_err();
        assert!(matches!(err, PolicyError::Validation(_)));
        assert_eq!(
            compiler.resource(&id("dataedu-key")).unwrap().kind(),
            ResourceKind::Key
        );
        assert!(compiler.verify().is_ok());
    }

    #[test]
    fn test_mutation_clears_cache() {
        let compiler = compiler();
        let ctx = RequestContext::new();
        compiler
            .evaluate(&Principal::Any, &id("raw"), Action::Write, &ctx)
            .unwrap();
        assert_eq!(compiler.cache_size(), 1);

        compiler.add_resource(Resource::log_group(id("logs"))).unwrap();
        assert_eq!(compiler.cache_size(), 0);
    }

    #[test]
    fn test_invalid_config() {
        let config = CompilerConfig {
            cache_capacity: 0,
            ..CompilerConfig::default()
        };
        assert!(matches!(
            PolicyCompiler::new(config),
            Err(PolicyError::Validation(_))
        ));
    }
}
