//! # infra-policy - Infrastructure Policy Compiler
//!
//! Compiles declared infrastructure (storage containers, keys, compute
//! jobs, triggers, parameters, log groups) into a consistent access-control
//! model:
//!
//! - **Deny-precedence resolution**: explicit deny beats allow, no match
//!   means deny, rule order never matters
//! - **Encryption gates**: writes to a storage container must declare the
//!   approved mode and, if they name a key, the container's key
//! - **Least-privilege grants** planned from each job's declared
//!   capabilities, with static conflict detection against deny rules
//! - **Trigger bindings** that only run a job while enabled and only if
//!   the job may be invoked
//! - **Manifests**: lossless JSON export with a content fingerprint
//!
//! ## Quick Start
//!
//! ```rust
//! use infra_policy::{
//!     Action, Capability, Decision, JobSpec, PolicyCompiler, Principal, RequestContext,
//!     Resource, ResourceId, Result,
//! };
//!
//! # fn main() -> Result<()> {
//! let compiler = PolicyCompiler::default();
//! let key = ResourceId::new("dataedu-key")?;
//! let raw = ResourceId::new("dataedu-raw")?;
//! compiler.add_resource(Resource::key(key.clone()))?;
//! compiler.add_resource(Resource::storage_container(raw.clone(), key))?;
//!
//! let job = JobSpec::new("crawler-role")
//!     .with_capability(Capability::new(raw.clone(), &[Action::List, Action::Read]));
//! let crawler = ResourceId::new("crawler")?;
//! compiler.add_resource(Resource::compute_job(crawler.clone(), job))?;
//! compiler.plan_grants(&crawler)?;
//!
//! let role = Principal::role("crawler-role");
//! let ctx = RequestContext::new();
//! assert_eq!(compiler.evaluate(&role, &raw, Action::Read, &ctx)?, Decision::Allow);
//! assert_eq!(compiler.evaluate(&role, &raw, Action::Write, &ctx)?, Decision::Deny);
//! # Ok(())
//! # }
//! ```
//!
//! ## From a stack configuration
//!
//! ```rust
//! use infra_policy::{StackConfig, StackTemplate};
//!
//! let compiler = StackTemplate::build(&StackConfig::default()).unwrap();
//! let manifest = compiler.to_manifest();
//! println!("{}", manifest.fingerprint().unwrap());
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    catalog, compiler, encryption, error, grants, manifest, template, triggers, validation,
};

pub use crate::core::iam;

// Re-export core types that users need
pub use crate::core::{
    catalog::{
        CodeLocation, ContainerSpec, JobSpec, KeySpec, LogGroupSpec, ParameterSpec, Resource, ResourceCatalog,
        ResourceKind, ResourceSpec, TriggerSpec,
    },
    compiler::{CompilerConfig, PolicyCompiler},
    encryption::{
        ContainerGate, EncryptionGate, DEFAULT_APPROVED_MODE, ENCRYPTION_KEY_ID_KEY,
        ENCRYPTION_MODE_KEY,
    },
    error::{PolicyError, Result},
    grants::{Capability, Grant, GrantPlan, GrantPlanner},
    iam::{
        Action, ActionSet, Condition, ConditionOperator, ConditionValue, Decision, Effect,
        Evaluation, PolicyResolver, PolicyRule, Principal, RequestContext,
    },
    manifest::PolicyManifest,
    template::{CrawlerConfig, ScheduledJobConfig, StackConfig, StackTemplate},
    triggers::{Binding, BindingState, FireOutcome, JobInvoker, ScheduleDescriptor, TriggerBinder},
    validation::ResourceId,
    VERSION,
};
