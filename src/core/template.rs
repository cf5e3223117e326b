//! Parameterized stack template
//!
//! One [`StackConfig`] record describes what differs between deployments
//! of the data-analytics stack: naming prefixes, team identifier, which
//! auxiliary jobs exist. [`StackTemplate::build`] turns it into a fully
//! planned [`PolicyCompiler`].
//!
//! ```
//! use infra_policy::{StackConfig, StackTemplate};
//!
//! let config = StackConfig::from_toml_str(r#"
//!     team_id = "team42"
//!     fetch_job = false
//! "#).unwrap();
//! let compiler = StackTemplate::build(&config).unwrap();
//! assert!(compiler.verify().is_ok());
//! ```

use crate::catalog::{path_of, JobSpec, KeySpec, Resource, ResourceKind, ResourceSpec};
use crate::compiler::{CompilerConfig, PolicyCompiler};
use crate::error::{PolicyError, Result};
use crate::grants::Capability;
use crate::iam::{action_set, Action, Effect, PolicyRule, Principal};
use crate::triggers::ScheduleDescriptor;
use crate::validation::{prefixed_id, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;
use validator::Validate;

/// Team identifier used when none is configured
pub const DEFAULT_TEAM_ID: &str = "123456abcdefghijklmnopqrstuvwxyz";

/// Fetch job name
pub const FETCH_JOB: &str = "dataedu-fetch-demo-data";

/// Role shared by all crawlers
pub const CRAWLER_ROLE: &str = "dataedu-glue-crawler-role";

/// Shared prefix of the imported asset buckets
const ASSET_BUCKET_PREFIX: &str = "ee-assets-prod-";

/// Deployment package of the fetch job inside the source-code bucket
const FETCH_JOB_PACKAGE: &str =
    "modules/cfdd4f678e99415a9c1f11342a3a9887/v1/lambda/dataedu_fetch_demo_data.zip";

/// Crawler over a prefix of the raw container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CrawlerConfig {
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    /// Catalog database the crawler populates
    #[validate(length(min = 1, max = 255))]
    pub database: String,

    /// Prefix inside the raw container
    #[validate(length(min = 1, max = 1024))]
    pub target_prefix: String,
}

/// Job run on a schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ScheduledJobConfig {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(length(min = 1, max = 256))]
    pub schedule: String,

    /// Initial trigger state
    #[serde(default)]
    pub enabled: bool,

    /// Let the job disable its own trigger
    #[serde(default = "default_true")]
    pub self_disable: bool,
}

fn default_true() -> bool {
    true
}

/// Deployment options of the stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StackConfig {
    #[validate(length(min = 1, max = 64))]
    pub name: String,

    /// Suffix of every managed container name
    #[validate(length(min = 1, max = 40))]
    pub team_id: String,

    #[validate(length(min = 1, max = 32))]
    pub region: String,

    #[validate(length(min = 1, max = 64))]
    pub key_alias: String,

    /// Role granted full control of the key
    #[validate(length(min = 1, max = 64))]
    pub key_admin: String,

    #[validate(length(min = 1, max = 40))]
    pub raw_prefix: String,

    #[validate(length(min = 1, max = 40))]
    pub curated_prefix: String,

    #[validate(length(min = 1, max = 40))]
    pub results_prefix: String,

    /// Imported bucket holding the demo data; not managed here.
    /// Empty disables the import.
    pub source_bucket: Option<String>,

    /// Imported bucket holding the fetch job's code. Unset means
    /// `ee-assets-prod-<team_id>-<region>`; empty disables the import.
    pub source_code_bucket: Option<String>,

    pub fetch_job: bool,

    pub crawlers: Vec<CrawlerConfig>,

    pub scheduled_jobs: Vec<ScheduledJobConfig>,

    pub compiler: CompilerConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            name: "dataedu-data-analyst".to_string(),
            team_id: DEFAULT_TEAM_ID.to_string(),
            region: "us-east-1".to_string(),
            key_alias: "dataedu-key".to_string(),
            key_admin: "account-root".to_string(),
            raw_prefix: "dataedu-raw-".to_string(),
            curated_prefix: "dataedu-curated-".to_string(),
            results_prefix: "dataedu-results-".to_string(),
            source_bucket: Some("ee-assets-prod-us-east-1".to_string()),
            source_code_bucket: None,
            fetch_job: true,
            crawlers: vec![
                CrawlerConfig {
                    name: "dataedu-sisdemo-crawler".to_string(),
                    database: "db_raw_sisdemo".to_string(),
                    target_prefix: "sisdb/sisdemo/".to_string(),
                },
                CrawlerConfig {
                    name: "dataedu-lmsdemo-crawler".to_string(),
                    database: "db_raw_lmsdemo".to_string(),
                    target_prefix: "lmsapi/".to_string(),
                },
            ],
            scheduled_jobs: Vec::new(),
            compiler: CompilerConfig::default(),
        }
    }
}

impl StackConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: StackConfig = toml::from_str(source)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_toml_str(&std::fs::read_to_string(path)?)?;
        info!("Loaded stack config '{}' from {:?}", config.name, path);
        Ok(config)
    }

    /// Field-level validation of the whole record
    pub fn check(&self) -> Result<()> {
        let invalid = |e: validator::ValidationErrors| {
            PolicyError::Validation(format!("stack config: {}", e))
        };
        self.validate().map_err(invalid)?;
        for crawler in &self.crawlers {
            crawler.validate().map_err(invalid)?;
        }
        for job in &self.scheduled_jobs {
            job.validate().map_err(invalid)?;
        }
        self.compiler.check()
    }

    pub fn key_id(&self) -> Result<ResourceId> {
        ResourceId::new(self.key_alias.as_str())
    }

    pub fn raw_container(&self) -> Result<ResourceId> {
        prefixed_id(&self.raw_prefix, &self.team_id)
    }

    pub fn curated_container(&self) -> Result<ResourceId> {
        prefixed_id(&self.curated_prefix, &self.team_id)
    }

    pub fn results_container(&self) -> Result<ResourceId> {
        prefixed_id(&self.results_prefix, &self.team_id)
    }

    /// Source-code bucket name, or `None` when switched off
    pub fn source_code_bucket(&self) -> Option<String> {
        match self.source_code_bucket.as_deref() {
            Some("") => None,
            Some(name) => Some(name.to_string()),
            None => Some(format!(
                "{}{}-{}",
                ASSET_BUCKET_PREFIX, self.team_id, self.region
            )),
        }
    }
}

/// Builds compiled stacks from [`StackConfig`]
pub struct StackTemplate;

impl StackTemplate {
    /// Build, plan and bind the stack described by `config`
    pub fn build(config: &StackConfig) -> Result<PolicyCompiler> {
        config.check()?;
        let compiler = PolicyCompiler::new(config.compiler.clone())?;

        let key = config.key_id()?;
        let key_spec = KeySpec {
            alias: Some(config.key_alias.clone()),
            rotation_enabled: true,
            pending_window_days: KeySpec::DEFAULT_PENDING_WINDOW_DAYS,
        };
        compiler.add_resource(
            Resource::new(key.clone(), ResourceSpec::Key(key_spec))
                .with_description("Key encrypting objects in the stack's storage containers"),
        )?;
        compiler.add_rule(
            PolicyRule::new(
                Effect::Allow,
                Principal::role(config.key_admin.as_str()),
                action_set(&[Action::All]),
                path_of(ResourceKind::Key, &key),
            )
            .with_sid(format!("{}-key-admin", key)),
        )?;

        let raw = config.raw_container()?;
        for (container, description) in [
            (raw.clone(), "Raw data landing zone"),
            (config.curated_container()?, "Curated data"),
            (config.results_container()?, "Query results"),
        ] {
            compiler.add_resource(
                Resource::storage_container(container, key.clone()).with_description(description),
            )?;
        }

        // an empty name in TOML switches the import off
        let source = match config.source_bucket.as_deref().filter(|s| !s.is_empty()) {
            Some(name) => {
                let id = ResourceId::new(name)?;
                compiler.add_resource(
                    Resource::external_storage(id.clone())
                        .with_description("Imported source data bucket"),
                )?;
                Some(id)
            }
            None => None,
        };

        let code = match config.source_code_bucket() {
            Some(name) => {
                let id = ResourceId::new(name)?;
                compiler.add_resource(
                    Resource::external_storage(id.clone())
                        .with_description("Imported bucket holding job deployment packages"),
                )?;
                Some(id)
            }
            None => None,
        };

        let mut jobs = Vec::new();

        if config.fetch_job {
            let job = Self::fetch_job(&compiler, &raw, source.as_ref(), code.as_ref())?;
            jobs.push(job);
        }

        for crawler in &config.crawlers {
            jobs.push(Self::crawler(&compiler, crawler, &raw)?);
        }

        for job in &jobs {
            compiler.plan_grants(job)?;
        }

        for scheduled in &config.scheduled_jobs {
            Self::scheduled_job(&compiler, scheduled)?;
        }

        compiler.verify()?;
        info!(
            "Built stack '{}' for team {} ({} resources, {} grants)",
            config.name,
            config.team_id,
            compiler.resources().len(),
            compiler.grants().len()
        );
        Ok(compiler)
    }

    /// Fetch job copying demo data from the source bucket into raw
    fn fetch_job(
        compiler: &PolicyCompiler,
        raw: &ResourceId,
        source: Option<&ResourceId>,
        code: Option<&ResourceId>,
    ) -> Result<ResourceId> {
        let id = ResourceId::new(FETCH_JOB)?;
        let logs = ResourceId::new(format!("{}-logs", FETCH_JOB))?;
        compiler.add_resource(Resource::log_group(logs.clone()))?;

        let gate = compiler.container_gate(raw)?;

        let mut job = JobSpec::new(format!("{}-role", FETCH_JOB));
        job.runtime = Some("python3.7".to_string());
        job.memory_mb = Some(256);
        job.timeout_secs = Some(600);
        job.environment = BTreeMap::from([
            (
                "SOURCE_DATA_BUCKET_NAME_PREFIX".to_string(),
                ASSET_BUCKET_PREFIX.to_string(),
            ),
            (
                "SIS_DEMO_MOCK_DATA_PREFIX".to_string(),
                "modules/f7ff818991a14cfb80e2617aad4431d1/v1/mockdata/sis_demo_parquet/"
                    .to_string(),
            ),
            (
                "LMS_DEMO_MOCK_DATA_PREFIX".to_string(),
                "modules/cfdd4f678e99415a9c1f11342a3a9887/v1/mockdata/lms_demo/v1/".to_string(),
            ),
            ("RAW_DATA_BUCKET_NAME".to_string(), raw.to_string()),
            ("SIS_DEMO_RAW_DATA_PREFIX".to_string(), "sisdb/sisdemo/".to_string()),
            ("LMS_DEMO_RAW_DATA_PREFIX".to_string(), "lmsapi/".to_string()),
        ]);
        if let Some(bucket) = code {
            job = job.with_code(bucket.clone(), FETCH_JOB_PACKAGE);
        }

        for bucket in source.into_iter().chain(std::iter::once(raw)) {
            job = job.with_capability(Capability::new(bucket.clone(), &[Action::List]));
        }
        for bucket in source.into_iter().chain(std::iter::once(raw)) {
            job = job.with_capability(Capability::new(bucket.clone(), &[Action::Read]));
        }
        job = job
            .with_capability(
                Capability::new(raw.clone(), &[Action::Write])
                    .with_conditions(gate.compliant_conditions()),
            )
            .with_capability(Capability::new(raw.clone(), &[Action::Delete]))
            .with_capability(Capability::new(logs, &[Action::Log]));

        compiler.add_resource(
            Resource::compute_job(id.clone(), job)
                .with_description("Copies demo data from the source bucket into the raw container"),
        )?;
        Ok(id)
    }

    fn crawler(
        compiler: &PolicyCompiler,
        crawler: &CrawlerConfig,
        raw: &ResourceId,
    ) -> Result<ResourceId> {
        let id = ResourceId::new(crawler.name.as_str())?;
        let mut job = JobSpec::new(CRAWLER_ROLE)
            .with_capability(Capability::new(raw.clone(), &[Action::List]))
            .with_capability(Capability::new(raw.clone(), &[Action::Read]));
        job.environment = BTreeMap::from([
            ("DATABASE".to_string(), crawler.database.clone()),
            (
                "TARGET_PATH".to_string(),
                format!("{}/{}", raw, crawler.target_prefix),
            ),
        ]);
        compiler.add_resource(Resource::compute_job(id.clone(), job))?;
        Ok(id)
    }

    /// Job plus trigger, binding, invoke grant and optional self-disable
    fn scheduled_job(compiler: &PolicyCompiler, scheduled: &ScheduledJobConfig) -> Result<()> {
        let id = ResourceId::new(scheduled.name.as_str())?;
        let trigger = ResourceId::new(format!("{}-schedule", scheduled.name))?;

        compiler.add_resource(Resource::trigger(
            trigger.clone(),
            ScheduleDescriptor::new(scheduled.schedule.as_str()),
            scheduled.enabled,
        ))?;

        let mut job = JobSpec::new(format!("{}-role", scheduled.name))
            .with_capability(Capability::new(id.clone(), &[Action::Invoke]));
        if scheduled.self_disable {
            job = job.with_capability(Capability::new(trigger.clone(), &[Action::Disable]));
        }
        compiler.add_resource(Resource::compute_job(id.clone(), job))?;
        compiler.plan_grants(&id)?;
        compiler.bind(&trigger, &id)?;
        Ok(())
    }
}
