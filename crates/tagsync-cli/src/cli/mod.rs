#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tagsync::{ConflictPolicy, DuplicateTagPolicy, NeedsFormat, RegistryInventory};

pub mod config;
pub mod conflicts;
pub mod plan;

use crate::config::{CliOverrides, RegistryConfig, TagSyncConfig, resolve_config};
use crate::telemetry::LOG_ENV;

#[derive(Debug, Parser)]
#[command(
    name = "tagsync",
    about = "Plan tag transfers from a source registry to its mirror",
    version
)]
pub struct Cli {
    /// Logging filter (overridden by TAGSYNC_LOG)
    #[arg(long = "log", default_value = "info", global = true)]
    pub verbosity: String,

    /// Directory holding the inventories; outputs are written here too
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    pub dir: PathBuf,

    /// Config file (defaults to tagsync.toml in --dir when present)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON output where applicable
    #[arg(long, global = true)]
    pub json: bool,

    /// How tags with different digests on each side are handled
    #[arg(long, value_enum, global = true)]
    pub conflict_policy: Option<ConflictPolicyArg>,

    /// Shape of the needs document
    #[arg(long, value_enum, global = true)]
    pub needs_format: Option<NeedsFormatArg>,

    /// How one inventory listing a tag under two digests is handled
    #[arg(long, value_enum, global = true)]
    pub duplicate_tags: Option<DuplicateTagsArg>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile the inventories and write lookup tables and the transfer script (default)
    Plan(self::plan::PlanArgs),
    /// List tags whose digests differ between the registries; writes nothing
    Conflicts(self::conflicts::ConflictsArgs),
    /// Show the resolved configuration and where each value came from
    Config(self::config::ConfigArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConflictPolicyArg {
    Exclude,
    Fatal,
}

impl From<ConflictPolicyArg> for ConflictPolicy {
    fn from(value: ConflictPolicyArg) -> Self {
        match value {
            ConflictPolicyArg::Exclude => ConflictPolicy::Exclude,
            ConflictPolicyArg::Fatal => ConflictPolicy::Fatal,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum NeedsFormatArg {
    List,
    ByDigest,
}

impl From<NeedsFormatArg> for NeedsFormat {
    fn from(value: NeedsFormatArg) -> Self {
        match value {
            NeedsFormatArg::List => NeedsFormat::List,
            NeedsFormatArg::ByDigest => NeedsFormat::ByDigest,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DuplicateTagsArg {
    Reject,
    LastWins,
}

impl From<DuplicateTagsArg> for DuplicateTagPolicy {
    fn from(value: DuplicateTagsArg) -> Self {
        match value {
            DuplicateTagsArg::Reject => DuplicateTagPolicy::Reject,
            DuplicateTagsArg::LastWins => DuplicateTagPolicy::LastWins,
        }
    }
}

pub fn run() -> Result<()> {
    run_with_cli(Cli::parse())
}

/// Resolve the logging filter to use for telemetry initialisation.
pub fn resolve_env_filter(cli: &Cli) -> String {
    std::env::var(LOG_ENV).unwrap_or_else(|_| cli.verbosity.clone())
}

/// Execute the CLI using a pre-parsed argument set.
pub fn run_with_cli(cli: Cli) -> Result<()> {
    let overrides = CliOverrides {
        conflict_policy: cli.conflict_policy.map(Into::into),
        needs_format: cli.needs_format.map(Into::into),
        duplicate_tags: cli.duplicate_tags.map(Into::into),
    };
    let resolved = resolve_config(&cli.dir, cli.config.as_deref(), &overrides)?;

    match cli
        .command
        .unwrap_or_else(|| Command::Plan(self::plan::PlanArgs::default()))
    {
        Command::Plan(args) => self::plan::handle(args, cli.json, &cli.dir, &resolved)?,
        Command::Conflicts(args) => self::conflicts::handle(args, cli.json, &cli.dir, &resolved)?,
        Command::Config(args) => self::config::handle(args, cli.json, &resolved)?,
    }

    Ok(())
}

/// Load the source and destination inventories named by the config.
pub(crate) fn load_inventories(
    root: &Path,
    config: &TagSyncConfig,
) -> Result<(RegistryInventory, RegistryInventory)> {
    let policy = config.plan.duplicate_tags;
    let source = load_inventory(root, &config.source, policy)?;
    let destination = load_inventory(root, &config.destination, policy)?;
    Ok((source, destination))
}

fn load_inventory(
    root: &Path,
    registry: &RegistryConfig,
    policy: DuplicateTagPolicy,
) -> Result<RegistryInventory> {
    let path = root.join(&registry.inventory);
    RegistryInventory::load(registry.name.clone(), &path, policy)
        .with_context(|| format!("failed to load {} inventory", registry.name))
}
