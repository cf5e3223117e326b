//! Resource definitions
//!
//! A resource is created once at compile time and never edited in place;
//! the catalog replaces it wholesale instead.

use crate::error::{PolicyError, Result};
use crate::grants::Capability;
use crate::iam::Action;
use crate::triggers::ScheduleDescriptor;
use crate::validation::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Encrypted storage provisioned by this stack
    StorageContainer,
    /// Storage imported by name; its own policy is managed elsewhere
    ExternalStorage,
    /// Encryption key
    Key,
    /// Serverless function or crawler
    ComputeJob,
    /// Scheduled or event trigger
    Trigger,
    /// Parameter store entry
    ParameterStoreEntry,
    /// Log group receiving a job's log streams
    LogGroup,
}

impl ResourceKind {
    /// First segment of the canonical resource path
    pub fn path_segment(&self) -> &'static str {
        match self {
            ResourceKind::StorageContainer | ResourceKind::ExternalStorage => "storage",
            ResourceKind::Key => "key",
            ResourceKind::ComputeJob => "job",
            ResourceKind::Trigger => "trigger",
            ResourceKind::ParameterStoreEntry => "parameter",
            ResourceKind::LogGroup => "log-group",
        }
    }

    /// Actions that are meaningful on this kind
    pub fn supported_actions(&self) -> &'static [Action] {
        match self {
            ResourceKind::StorageContainer => {
                &[Action::Read, Action::Write, Action::Delete, Action::List]
            }
            ResourceKind::ExternalStorage => &[Action::Read, Action::List],
            ResourceKind::Key => &[Action::Encrypt, Action::Decrypt],
            ResourceKind::ComputeJob => &[Action::Invoke],
            ResourceKind::Trigger => &[Action::Enable, Action::Disable],
            ResourceKind::ParameterStoreEntry => &[Action::Read, Action::Write],
            ResourceKind::LogGroup => &[Action::Log],
        }
    }

    pub fn supports(&self, action: Action) -> bool {
        self.supported_actions().contains(&action)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::StorageContainer => "storage-container",
            ResourceKind::ExternalStorage => "external-storage",
            ResourceKind::Key => "key",
            ResourceKind::ComputeJob => "compute-job",
            ResourceKind::Trigger => "trigger",
            ResourceKind::ParameterStoreEntry => "parameter-store-entry",
            ResourceKind::LogGroup => "log-group",
        };
        f.write_str(name)
    }
}

fn default_true() -> bool {
    true
}

fn default_pending_window() -> u32 {
    KeySpec::DEFAULT_PENDING_WINDOW_DAYS
}

/// Encrypted storage container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// The single key every write must use
    #[serde(default)]
    pub encryption_key: Option<ResourceId>,

    #[serde(default = "default_true")]
    pub block_public_access: bool,

    #[serde(default)]
    pub versioned: bool,
}

/// Encryption key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default = "default_true")]
    pub rotation_enabled: bool,

    /// Days between a deletion request and actual deletion
    #[serde(default = "default_pending_window")]
    pub pending_window_days: u32,
}

impl KeySpec {
    pub const DEFAULT_PENDING_WINDOW_DAYS: u32 = 7;
    const PENDING_WINDOW_RANGE: std::ops::RangeInclusive<u32> = 7..=30;
}

/// Compute job (function or crawler)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Role the job runs as; its principal is `role:<role>`
    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Deployment package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeLocation>,

    /// Declared needs, in order; the input to grant planning
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
}

/// Object holding a job's deployment package
///
/// The provisioning engine reads it at deploy time, so the bucket is a
/// reference of the job but needs no grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLocation {
    pub bucket: ResourceId,
    pub object: String,
}

impl JobSpec {
    const MEMORY_RANGE_MB: std::ops::RangeInclusive<u32> = 128..=10_240;
    const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u32> = 1..=900;

    pub fn new(role: impl Into<String>) -> Self {
        JobSpec {
            role: role.into(),
            runtime: None,
            memory_mb: None,
            timeout_secs: None,
            environment: BTreeMap::new(),
            code: None,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_code(mut self, bucket: ResourceId, object: impl Into<String>) -> Self {
        self.code = Some(CodeLocation {
            bucket,
            object: object.into(),
        });
        self
    }
}

/// Scheduled or event trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub schedule: ScheduleDescriptor,

    /// Initial state of bindings created for this trigger
    #[serde(default)]
    pub enabled: bool,
}

/// Parameter store entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub value: String,

    #[serde(default)]
    pub secure: bool,
}

/// Log group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogGroupSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
}

/// Kind-specific attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResourceSpec {
    StorageContainer(ContainerSpec),
    ExternalStorage,
    Key(KeySpec),
    ComputeJob(JobSpec),
    Trigger(TriggerSpec),
    ParameterStoreEntry(ParameterSpec),
    LogGroup(LogGroupSpec),
}

/// A declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,

    #[serde(flatten)]
    pub spec: ResourceSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Resource {
    pub fn new(id: ResourceId, spec: ResourceSpec) -> Self {
        Resource {
            id,
            spec,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Encrypted container guarded by `key`
    pub fn storage_container(id: ResourceId, key: ResourceId) -> Self {
        Resource::new(
            id,
            ResourceSpec::StorageContainer(ContainerSpec {
                encryption_key: Some(key),
                block_public_access: true,
                versioned: true,
            }),
        )
    }

    pub fn external_storage(id: ResourceId) -> Self {
        Resource::new(id, ResourceSpec::ExternalStorage)
    }

    pub fn key(id: ResourceId) -> Self {
        Resource::new(
            id,
            ResourceSpec::Key(KeySpec {
                alias: None,
                rotation_enabled: true,
                pending_window_days: KeySpec::DEFAULT_PENDING_WINDOW_DAYS,
            }),
        )
    }

    pub fn compute_job(id: ResourceId, job: JobSpec) -> Self {
        Resource::new(id, ResourceSpec::ComputeJob(job))
    }

    pub fn trigger(id: ResourceId, schedule: ScheduleDescriptor, enabled: bool) -> Self {
        Resource::new(id, ResourceSpec::Trigger(TriggerSpec { schedule, enabled }))
    }

    pub fn parameter(id: ResourceId, value: impl Into<String>, secure: bool) -> Self {
        Resource::new(
            id,
            ResourceSpec::ParameterStoreEntry(ParameterSpec {
                value: value.into(),
                secure,
            }),
        )
    }

    pub fn log_group(id: ResourceId) -> Self {
        Resource::new(id, ResourceSpec::LogGroup(LogGroupSpec { retention_days: None }))
    }

    pub fn kind(&self) -> ResourceKind {
        match &self.spec {
            ResourceSpec::StorageContainer(_) => ResourceKind::StorageContainer,
            ResourceSpec::ExternalStorage => ResourceKind::ExternalStorage,
            ResourceSpec::Key(_) => ResourceKind::Key,
            ResourceSpec::ComputeJob(_) => ResourceKind::ComputeJob,
            ResourceSpec::Trigger(_) => ResourceKind::Trigger,
            ResourceSpec::ParameterStoreEntry(_) => ResourceKind::ParameterStoreEntry,
            ResourceSpec::LogGroup(_) => ResourceKind::LogGroup,
        }
    }

    /// Canonical path matched by rule resource patterns
    pub fn path(&self) -> String {
        path_of(self.kind(), &self.id)
    }

    pub fn as_container(&self) -> Option<&ContainerSpec> {
        match &self.spec {
            ResourceSpec::StorageContainer(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_job(&self) -> Option<&JobSpec> {
        match &self.spec {
            ResourceSpec::ComputeJob(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_trigger(&self) -> Option<&TriggerSpec> {
        match &self.spec {
            ResourceSpec::Trigger(t) => Some(t),
            _ => None,
        }
    }

    /// Check the kind-specific attributes on their own
    ///
    /// Cross-references (does the key exist?) are checked by the compiler.
    pub fn validate(&self) -> Result<()> {
        match &self.spec {
            ResourceSpec::StorageContainer(c) => {
                if c.encryption_key.is_none() {
                    return Err(PolicyError::Validation(format!(
                        "storage container '{}' has no encryption key",
                        self.id
                    )));
                }
            }
            ResourceSpec::Key(k) => {
                if !KeySpec::PENDING_WINDOW_RANGE.contains(&k.pending_window_days) {
                    return Err(PolicyError::Validation(format!(
                        "key '{}' pending window {} days is outside 7..=30",
                        self.id, k.pending_window_days
                    )));
                }
            }
            ResourceSpec::ComputeJob(j) => {
                ResourceId::new(j.role.as_str()).map_err(|_| {
                    PolicyError::Validation(format!(
                        "compute job '{}' has an invalid role name '{}'",
                        self.id, j.role
                    ))
                })?;
                if let Some(memory) = j.memory_mb {
                    if !JobSpec::MEMORY_RANGE_MB.contains(&memory) {
                        return Err(PolicyError::Validation(format!(
                            "compute job '{}' memory {} MB is outside 128..=10240",
                            self.id, memory
                        )));
                    }
                }
                if let Some(timeout) = j.timeout_secs {
                    if !JobSpec::TIMEOUT_RANGE_SECS.contains(&timeout) {
                        return Err(PolicyError::Validation(format!(
                            "compute job '{}' timeout {}s is outside 1..=900",
                            self.id, timeout
                        )));
                    }
                }
                if let Some(code) = &j.code {
                    if code.object.is_empty() {
                        return Err(PolicyError::Validation(format!(
                            "compute job '{}' has an empty code object name",
                            self.id
                        )));
                    }
                }
                for capability in &j.capabilities {
                    capability.validate_shape()?;
                }
            }
            ResourceSpec::Trigger(t) => t.schedule.validate()?,
            ResourceSpec::ExternalStorage
            | ResourceSpec::ParameterStoreEntry(_)
            | ResourceSpec::LogGroup(_) => {}
        }
        Ok(())
    }
}

/// Canonical path for a resource of `kind` named `id`
pub fn path_of(kind: ResourceKind, id: &ResourceId) -> String {
    format!("/{}/{}", kind.path_segment(), id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    #[test]
    fn test_paths() {
        let raw = Resource::storage_container(id("dataedu-raw-1"), id("dataedu-key"));
        assert_eq!(raw.path(), "/storage/dataedu-raw-1");
        assert_eq!(Resource::key(id("dataedu-key")).path(), "/key/dataedu-key");
        assert_eq!(
            Resource::external_storage(id("ee-assets")).path(),
            "/storage/ee-assets"
        );
        assert_eq!(Resource::log_group(id("fetch-logs")).path(), "/log-group/fetch-logs");
    }

    #[test]
    fn test_container_requires_key() {
        let keyless = Resource::new(
            id("raw"),
            ResourceSpec::StorageContainer(ContainerSpec {
                encryption_key: None,
                block_public_access: true,
                versioned: false,
            }),
        );
        assert!(matches!(keyless.validate(), Err(PolicyError::Validation(_))));
    }

    #[test]
    fn test_key_pending_window() {
        let mut key = Resource::key(id("k"));
        assert!(key.validate().is_ok());
        if let ResourceSpec::Key(spec) = &mut key.spec {
            spec.pending_window_days = 3;
        }
        assert!(key.validate().is_err());
    }

    #[test]
    fn test_job_limits() {
        let mut job = JobSpec::new("fetch-role");
        job.memory_mb = Some(256);
        job.timeout_secs = Some(600);
        assert!(Resource::compute_job(id("fetch"), job.clone()).validate().is_ok());

        job.timeout_secs = Some(3600);
        assert!(Resource::compute_job(id("fetch"), job.clone()).validate().is_err());

        let bad_role = JobSpec::new("Fetch Role");
        assert!(Resource::compute_job(id("fetch"), bad_role).validate().is_err());
    }

    #[test]
    fn test_supported_actions() {
        assert!(ResourceKind::StorageContainer.supports(Action::Write));
        assert!(!ResourceKind::ExternalStorage.supports(Action::Write));
        assert!(ResourceKind::Trigger.supports(Action::Disable));
        assert!(!ResourceKind::ComputeJob.supports(Action::Read));
        assert!(!ResourceKind::LogGroup.supports(Action::All));
    }

    #[test]
    fn test_resource_json_roundtrip() {
        let raw = Resource::storage_container(id("dataedu-raw-1"), id("dataedu-key"))
            .with_description("raw landing zone");
        let json = serde_json::to_string(&raw).unwrap();
        assert!(json.contains("\"kind\":\"storage-container\""));
        let parsed: Resource = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, raw);

        let ext = Resource::external_storage(id("ee-assets"));
        let parsed: Resource = serde_json::from_str(&serde_json::to_string(&ext).unwrap()).unwrap();
        assert_eq!(parsed, ext);
    }
}
