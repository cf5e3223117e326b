//! Policy compiler core
//!
//! - [`catalog`] - declared resources and their canonical paths
//! - [`iam`] - rule model, deny-precedence resolver, decision cache
//! - [`encryption`] - per-container encryption deny rules
//! - [`grants`] - least-privilege grant planning
//! - [`triggers`] - trigger bindings and their state machine
//! - [`compiler`] - the locked policy state tying the above together
//! - [`manifest`] - serialized policy state
//! - [`template`] - stack configuration and the stack builder
//!
//! ## Architecture
//!
//! ```text
//! StackConfig ──► StackTemplate ──► PolicyCompiler ──► PolicyManifest
//!                                    │
//!        ┌───────────────┬───────────┼──────────────┐
//!        ▼               ▼           ▼              ▼
//!  ResourceCatalog  EncryptionGate  GrantPlanner  TriggerBinder
//!        │               │           │              │
//!        └───────────────┴─────► PolicyResolver ◄───┘
//! ```

pub mod catalog;
pub mod compiler;
pub mod encryption;
pub mod error;
pub mod grants;
pub mod iam;
pub mod manifest;
pub mod template;
pub mod triggers;
pub mod validation;

pub use catalog::{Resource, ResourceCatalog, ResourceKind};
pub use compiler::{CompilerConfig, PolicyCompiler};
pub use error::{PolicyError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
