//! Policy compiler CLI
//!
//! Compiles stack configurations into policy manifests and answers
//! questions against a compiled manifest.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use infra_policy::{
    Action, Binding, CompilerConfig, ConditionValue, FireOutcome, JobInvoker, PolicyCompiler,
    PolicyManifest, Principal, RequestContext, ResourceId, StackConfig, StackTemplate,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "policyc")]
#[command(about = "Infrastructure policy compiler", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a stack configuration into a policy manifest
    Compile {
        /// Stack configuration (TOML); defaults to the data-analyst stack
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output manifest path; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Decide a single request
    Evaluate(RequestArgs),

    /// Decide a request and list the rules behind the decision
    Explain(RequestArgs),

    /// Deliver a fire signal to a binding
    Fire {
        #[arg(short, long)]
        manifest: PathBuf,

        /// Binding id
        #[arg(short, long)]
        binding: String,

        /// Enable the binding before firing
        #[arg(long)]
        enable: bool,
    },

    /// Check the invariants of a manifest
    Verify {
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Print the content fingerprint of a manifest
    Fingerprint {
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RequestArgs {
    #[arg(short, long)]
    manifest: PathBuf,

    /// `*` or `role:<name>`
    #[arg(short, long)]
    principal: Principal,

    /// Resource id
    #[arg(short, long)]
    resource: ResourceId,

    #[arg(short, long)]
    action: Action,

    /// Context attribute as key=value (repeatable)
    #[arg(short = 'c', long = "context", value_parser = RequestContext::parse_pair)]
    context: Vec<(String, ConditionValue)>,
}

impl RequestArgs {
    fn request_context(&self) -> RequestContext {
        let mut ctx = RequestContext::new();
        for (key, value) in &self.context {
            ctx.insert(key.clone(), value.clone());
        }
        ctx
    }
}

/// Records fire signals in the log; jobs run elsewhere
struct LoggingInvoker;

impl JobInvoker for LoggingInvoker {
    fn invoke(&self, job: &ResourceId, binding: &Binding) {
        info!("Dispatching job {} (binding {}, {})", job, binding.id, binding.schedule);
    }
}

fn load(path: &Path) -> Result<PolicyCompiler> {
    let manifest = PolicyManifest::load(path)
        .with_context(|| format!("failed to load manifest {:?}", path))?;
    PolicyCompiler::from_manifest(&manifest, CompilerConfig::default())
        .with_context(|| format!("manifest {:?} is inconsistent", path))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Compile { config, out } => {
            let config = match config {
                Some(path) => StackConfig::load(&path)
                    .with_context(|| format!("failed to load config {:?}", path))?,
                None => StackConfig::default(),
            };
            let compiler = StackTemplate::build(&config)?;
            let manifest = compiler.to_manifest().with_name(config.name.clone());
            match out {
                Some(path) => {
                    manifest.save(&path)?;
                    println!("{}", manifest.fingerprint()?);
                }
                None => println!("{}", manifest.to_json()?),
            }
        }

        Command::Evaluate(args) => {
            let compiler = load(&args.manifest)?;
            let decision = compiler.evaluate(
                &args.principal,
                &args.resource,
                args.action,
                &args.request_context(),
            )?;
            println!("{}", decision);
        }

        Command::Explain(args) => {
            let compiler = load(&args.manifest)?;
            let evaluation = compiler.explain(
                &args.principal,
                &args.resource,
                args.action,
                &args.request_context(),
            )?;
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
        }

        Command::Fire {
            manifest,
            binding,
            enable,
        } => {
            let compiler = load(&manifest)?;
            if enable {
                compiler.enable(&binding)?;
            }
            match compiler.fire(&binding, &LoggingInvoker)? {
                FireOutcome::Invoked => println!("invoked"),
                FireOutcome::Skipped => println!("skipped (binding disabled)"),
            }
        }

        Command::Verify { manifest } => {
            let compiler = load(&manifest)?;
            compiler.verify()?;
            println!("ok");
        }

        Command::Fingerprint { manifest } => {
            let manifest = PolicyManifest::load(&manifest)?;
            println!("{}", manifest.fingerprint()?);
        }
    }

    Ok(())
}
