//! gitflow command-line tool.
//!
//! Starts, finishes and lists feature, release, hotfix and support branches,
//! repairs descriptor version conflicts and inspects the effective
//! configuration.

mod commands;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gitflow_core::{BranchKind, ConfigError, FinishOptions, FlowConfig};

use commands::{branch, config, init, open_orchestrator, resolve, status};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// git-flow branch lifecycle tool.
#[derive(Parser, Debug)]
#[command(
    name = "gitflow",
    version,
    about = "Manage git-flow branches and repair descriptor version conflicts"
)]
struct Cli {
    /// Run as if started in this directory.
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    repo: PathBuf,

    /// Explicit TOML configuration file (overrides .gitflow.toml).
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record branch names in git config and create the integration branch.
    Init {
        /// Use the configured values without prompting.
        #[arg(short, long)]
        defaults: bool,

        /// Reconfigure an already initialised repository.
        #[arg(short, long)]
        force: bool,
    },

    /// Manage feature branches.
    Feature {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Manage release branches.
    Release {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Manage hotfix branches.
    Hotfix {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Manage support branches.
    Support {
        #[command(subcommand)]
        action: SupportAction,
    },

    /// Show the current branch and naming policy.
    Status {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Repair version-only conflicts in a conflicted descriptor file.
    Resolve {
        /// Path to the conflicted file.
        file: PathBuf,

        /// Transition the merge belongs to: feature, release or hotfix.
        #[arg(short, long, default_value = "release")]
        kind: String,

        /// Version precedence: auto, target or incoming.
        #[arg(short, long)]
        precedence: Option<String>,

        /// Write the repaired file in place.
        #[arg(short, long)]
        write: bool,
    },

    /// Inspect the effective configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum BranchAction {
    /// Create and check out a new branch.
    Start {
        /// Branch identifier (e.g. `login` or `1.2.0`).
        id: String,

        /// Start point instead of the default base branch.
        #[arg(short, long)]
        base: Option<String>,
    },
    /// Merge the branch back, tag it where applicable and delete it.
    Finish {
        /// Branch identifier; defaults to the current branch.
        id: Option<String>,

        /// Push the updated branches and tag.
        #[arg(short, long)]
        push: bool,

        /// Keep the branch after finishing.
        #[arg(short, long)]
        keep: bool,

        /// Print the transition report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List local branches of this kind.
    List,
}

#[derive(Subcommand, Debug)]
enum SupportAction {
    /// Create and check out a new support branch.
    Start {
        id: String,

        #[arg(short, long)]
        base: Option<String>,
    },
    /// List local support branches.
    List,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Load and validate the layered configuration.
    Validate,
    /// Print the effective configuration.
    Show {
        /// Print JSON instead of TOML.
        #[arg(long)]
        json: bool,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let explicit = cli.config.as_deref().map(commands::expand_tilde).map(PathBuf::from);
    let loaded = FlowConfig::load_layered(&cli.repo, explicit.as_deref());

    let level = loaded
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("GITFLOW_LOG").unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .without_time()
        .init();

    match run(cli, explicit.as_deref(), loaded) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, explicit: Option<&Path>, loaded: Result<FlowConfig, ConfigError>) -> Result<()> {
    if let Commands::Config {
        action: ConfigAction::Validate,
    } = cli.command
    {
        return config::run_validate(&cli.repo, explicit);
    }

    let flow_config = loaded.context("failed to load configuration")?;

    match cli.command {
        Commands::Init { defaults, force } => init::run_init(&cli.repo, flow_config, defaults, force),
        Commands::Feature { action } => run_branch(&cli.repo, &flow_config, BranchKind::Feature, action),
        Commands::Release { action } => run_branch(&cli.repo, &flow_config, BranchKind::Release, action),
        Commands::Hotfix { action } => run_branch(&cli.repo, &flow_config, BranchKind::Hotfix, action),
        Commands::Support { action } => {
            let mut orch = open_orchestrator(&cli.repo, &flow_config)?;
            match action {
                SupportAction::Start { id, base } => {
                    branch::run_start(&mut orch, BranchKind::Support, &id, base)
                }
                SupportAction::List => branch::run_list(&orch, BranchKind::Support),
            }
        }
        Commands::Status { json } => {
            let orch = open_orchestrator(&cli.repo, &flow_config)?;
            status::run_status(&orch, json)
        }
        Commands::Resolve {
            file,
            kind,
            precedence,
            write,
        } => resolve::run_resolve(&flow_config, &file, &kind, precedence.as_deref(), write),
        Commands::Config { action } => match action {
            ConfigAction::Show { json } => config::run_show(&flow_config, json),
            ConfigAction::Validate => config::run_validate(&cli.repo, explicit),
        },
    }
}

fn run_branch(repo: &Path, flow_config: &FlowConfig, kind: BranchKind, action: BranchAction) -> Result<()> {
    let mut orch = open_orchestrator(repo, flow_config)?;
    match action {
        BranchAction::Start { id, base } => branch::run_start(&mut orch, kind, &id, base),
        BranchAction::Finish {
            id,
            push,
            keep,
            json,
        } => {
            let opts = FinishOptions {
                push: push.then_some(true),
                keep_branch: keep.then_some(true),
            };
            branch::run_finish(&mut orch, kind, id, opts, json)
        }
        BranchAction::List => branch::run_list(&orch, kind),
    }
}
