//! Policy manifest
//!
//! The serialized form of a compiled policy state: resources, explicit
//! rules (including generated encryption rules), grants and bindings. It is
//! what the provisioning engine consumes and what [`PolicyCompiler`] is
//! rebuilt from.
//!
//! Encoding is pretty-printed JSON. Every collection is emitted in a
//! stable order, so two manifests of the same state differ only in
//! `generated_at`; [`PolicyManifest::fingerprint`] ignores that field.
//!
//! [`PolicyCompiler`]: crate::PolicyCompiler

use crate::catalog::Resource;
use crate::error::{PolicyError, Result};
use crate::grants::Grant;
use crate::iam::PolicyRule;
use crate::triggers::Binding;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// Serialized policy state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyManifest {
    /// Manifest format version
    ///
    /// Readers accept any version with the same major number.
    pub format_version: Version,

    /// Stack name, when compiled from a template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Generation timestamp (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,

    /// Encryption mode the gate rules were generated for
    pub approved_encryption_mode: String,

    #[serde(default)]
    pub resources: Vec<Resource>,

    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    #[serde(default)]
    pub grants: Vec<Grant>,

    #[serde(default)]
    pub bindings: Vec<Binding>,
}

impl PolicyManifest {
    /// Default file name
    pub const FILE_NAME: &'static str = "policy-manifest.json";

    /// Version written by this build
    pub fn current_format_version() -> Version {
        Version::new(1, 0, 0)
    }

    /// Empty manifest stamped with the current time
    pub fn new(approved_encryption_mode: impl Into<String>) -> Self {
        PolicyManifest {
            format_version: Self::current_format_version(),
            name: None,
            generated_at: Some(chrono::Utc::now().to_rfc3339()),
            approved_encryption_mode: approved_encryption_mode.into(),
            resources: Vec::new(),
            rules: Vec::new(),
            grants: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Reject manifests written by an incompatible format
    pub fn check_version(&self) -> Result<()> {
        let current = Self::current_format_version();
        if self.format_version.major != current.major {
            return Err(PolicyError::ManifestVersion(format!(
                "manifest format {} is not compatible with {}",
                self.format_version, current
            )));
        }
        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and version-check a JSON manifest
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: PolicyManifest = serde_json::from_str(json)?;
        manifest.check_version()?;
        Ok(manifest)
    }

    /// SHA-256 over the content, excluding `generated_at`
    ///
    /// ```
    /// use infra_policy::PolicyManifest;
    ///
    /// let a = PolicyManifest::new("kms");
    /// let mut b = a.clone();
    /// b.generated_at = Some("2000-01-01T00:00:00Z".to_string());
    /// assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    /// ```
    pub fn fingerprint(&self) -> Result<String> {
        let mut content = self.clone();
        content.generated_at = None;
        let bytes = serde_json::to_vec(&content)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!("Saved policy manifest to {:?}", path);
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manifest = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(
            "Loaded policy manifest from {:?} ({} resources, {} rules, {} grants, {} bindings)",
            path,
            manifest.resources.len(),
            manifest.rules.len(),
            manifest.grants.len(),
            manifest.bindings.len()
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Resource;
    use crate::validation::ResourceId;

    fn sample() -> PolicyManifest {
        let mut manifest = PolicyManifest::new("kms").with_name("dataedu");
        manifest
            .resources
            .push(Resource::key(ResourceId::new("dataedu-key").unwrap()));
        manifest
    }

    #[test]
    fn test_json_round_trip() {
        let manifest = sample();
        let json = manifest.to_json().unwrap();
        let back = PolicyManifest::from_json(&json).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn test_fingerprint_ignores_timestamp() {
        let a = sample();
        let mut b = a.clone();
        b.generated_at = None;
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap().len(), 64);

        b.name = Some("other".to_string());
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_version_check() {
        let mut manifest = sample();
        manifest.format_version = Version::new(1, 4, 2);
        assert!(manifest.check_version().is_ok());

        manifest.format_version = Version::new(2, 0, 0);
        let json = manifest.to_json().unwrap();
        assert!(matches!(
            PolicyManifest::from_json(&json),
            Err(PolicyError::ManifestVersion(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            PolicyManifest::from_json("{ not json"),
            Err(PolicyError::Serialization(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PolicyManifest::FILE_NAME);
        let manifest = sample();
        manifest.save(&path).unwrap();
        assert_eq!(PolicyManifest::load(&path).unwrap(), manifest);
    }
}
