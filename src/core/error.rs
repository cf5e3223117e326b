use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid identifier: {0} (lowercase letters, digits, '-', '_' and '.'; must start and end alphanumeric)")]
    InvalidIdentifier(String),

    #[error("Unsupported manifest format version: {0}")]
    ManifestVersion(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PolicyError {
    pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        PolicyError::NotFound(format!("{} '{}'", what, id))
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
