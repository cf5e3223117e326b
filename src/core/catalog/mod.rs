//! Resource catalog
//!
//! The catalog maps identifiers to declared resources. Identifiers are
//! unique; resources are never edited in place, only replaced wholesale
//! (the immutable-redeploy model of the provisioning engine).

pub mod resource;

pub use resource::{
    path_of, CodeLocation, ContainerSpec, JobSpec, KeySpec, LogGroupSpec, ParameterSpec, Resource,
    ResourceKind, ResourceSpec, TriggerSpec,
};

use crate::error::{PolicyError, Result};
use crate::validation::ResourceId;
use std::collections::BTreeMap;

/// In-memory registry of declared resources
///
/// Ordered by identifier so manifests and listings are deterministic.
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    resources: BTreeMap<ResourceId, Resource>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new resource
    ///
    /// Fails with `AlreadyExists` when the identifier is taken and with
    /// `Validation` when the resource's own attributes are malformed.
    pub fn insert(&mut self, resource: Resource) -> Result<()> {
        resource.validate()?;
        if self.resources.contains_key(&resource.id) {
            return Err(PolicyError::AlreadyExists(format!(
                "resource '{}'",
                resource.id
            )));
        }
        self.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    /// Replace an existing resource wholesale, returning the old definition
    pub fn replace(&mut self, resource: Resource) -> Result<Resource> {
        resource.validate()?;
        match self.resources.get_mut(&resource.id) {
            Some(slot) => Ok(std::mem::replace(slot, resource)),
            None => Err(PolicyError::not_found("resource", &resource.id)),
        }
    }

    /// Remove a resource
    pub fn remove(&mut self, id: &ResourceId) -> Result<Resource> {
        self.resources
            .remove(id)
            .ok_or_else(|| PolicyError::not_found("resource", id))
    }

    /// Look up a resource by identifier
    pub fn get(&self, id: &ResourceId) -> Result<&Resource> {
        self.resources
            .get(id)
            .ok_or_else(|| PolicyError::not_found("resource", id))
    }

    /// Look up a resource and require a kind
    pub fn get_kind(&self, id: &ResourceId, kind: ResourceKind) -> Result<&Resource> {
        let resource = self.get(id)?;
        if resource.kind() != kind {
            return Err(PolicyError::Validation(format!(
                "'{}' is a {}, expected a {}",
                id,
                resource.kind(),
                kind
            )));
        }
        Ok(resource)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Resources of one kind, in identifier order
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(move |r| r.kind() == kind)
    }

    /// True if some compute job runs as `role`
    pub fn has_role(&self, role: &str) -> bool {
        self.resources
            .values()
            .filter_map(Resource::as_job)
            .any(|job| job.role == role)
    }

    /// The key guarding a storage container
    pub fn key_of(&self, container: &ResourceId) -> Result<&Resource> {
        let resource = self.get_kind(container, ResourceKind::StorageContainer)?;
        let key_id = resource
            .as_container()
            .and_then(|c| c.encryption_key.as_ref())
            .ok_or_else(|| {
                PolicyError::Validation(format!(
                    "storage container '{}' has no encryption key",
                    container
                ))
            })?;
        self.get_kind(key_id, ResourceKind::Key)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
