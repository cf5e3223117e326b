//! Validation for resource identifiers
//!
//! Every declared resource is addressed by a [`ResourceId`]: a stable,
//! lowercase identifier such as `dataedu-raw-123456` or `db_raw_sisdemo`.
//! Identifiers are validated once at construction (and on deserialization),
//! so the rest of the crate can treat them as well-formed.

use crate::error::{PolicyError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Validated resource identifier
///
/// # Rules
/// - Lowercase letters (a-z), digits (0-9), `-`, `_` and `.` only
/// - Must start and end with a letter or digit
/// - No consecutive separators (`--`, `__`, `..`, `-.`, ...)
/// - Length: 1-128 characters
///
/// # Examples
///
/// ```
/// use infra_policy::ResourceId;
///
/// let id = ResourceId::new("dataedu-raw-123456").unwrap();
/// assert_eq!(id.as_str(), "dataedu-raw-123456");
///
/// assert!(ResourceId::new("Raw-Bucket").is_err()); // uppercase
/// assert!(ResourceId::new("raw/bucket").is_err()); // path separator
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Pattern for valid identifiers
    const PATTERN: &'static str = r"^[a-z0-9]([a-z0-9._-]*[a-z0-9])?$";

    /// Maximum length
    const MAX_LENGTH: usize = 128;

    /// Create a new validated identifier
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` if the identifier doesn't meet validation rules.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate_id(&id)?;
        Ok(ResourceId(id))
    }

    fn pattern() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(Self::PATTERN).expect("identifier pattern is a valid regex"))
    }

    fn validate_id(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(PolicyError::InvalidIdentifier(
                "identifier cannot be empty".to_string(),
            ));
        }

        if id.len() > Self::MAX_LENGTH {
            return Err(PolicyError::InvalidIdentifier(format!(
                "'{}' is too long (max {} characters)",
                id,
                Self::MAX_LENGTH
            )));
        }

        if !Self::pattern().is_match(id) {
            return Err(PolicyError::InvalidIdentifier(id.to_string()));
        }

        let bytes = id.as_bytes();
        let is_sep = |b: u8| matches!(b, b'-' | b'_' | b'.');
        if bytes.windows(2).any(|w| is_sep(w[0]) && is_sep(w[1])) {
            return Err(PolicyError::InvalidIdentifier(format!(
                "'{}' contains consecutive separators",
                id
            )));
        }

        Ok(())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for ResourceId {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self> {
        ResourceId::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ResourceId {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceId::new(s)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Join a name prefix and a team identifier into a resource identifier
///
/// Mirrors how stack variants derive bucket names (`dataedu-raw-` + team id).
pub fn prefixed_id(prefix: &str, suffix: &str) -> Result<ResourceId> {
    ResourceId::new(format!("{}{}", prefix, suffix))
}
