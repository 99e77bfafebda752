//! `gitflow init`: record the naming policy in git config and create the
//! integration branch.

use std::path::Path;

use anyhow::{Context, Result};
use console::{Style, Term};
use dialoguer::{Confirm, Input};

use gitflow_core::{FlowConfig, FlowOptions, GitRepository, Orchestrator, RepositoryPort};

use super::style;

const INITIALIZED_KEY: &str = "gitflow.branch.master";

/// Initialise git-flow in the repository at `repo_path`.
///
/// Prompts for branch names and prefixes unless `defaults` is set or stdout
/// is not a terminal, in which case the layered configuration is used as is.
pub fn run_init(repo_path: &Path, mut config: FlowConfig, defaults: bool, force: bool) -> Result<()> {
    let repo = GitRepository::open(repo_path).context("failed to open git repository")?;

    let already = repo
        .config()
        .map(|c| c.get_string(INITIALIZED_KEY).is_ok())
        .unwrap_or(false);
    if already && !force {
        println!(
            "{}",
            style::warn("Repository is already initialised for gitflow; use --force to reconfigure")
        );
        return Ok(());
    }

    let interactive = !defaults && Term::stdout().is_term();
    if interactive {
        prompt_policy(&mut config)?;
    }

    config.validate().context("invalid gitflow configuration")?;

    let trunk = config.branches.trunk.clone();
    if !repo.branch_exists(&trunk).context("failed to inspect branches")? {
        let current = repo.current_branch().ok();
        anyhow::bail!(
            "trunk branch '{}' does not exist{}; create it (or commit once) before running init",
            trunk,
            current
                .map(|c| format!(" (currently on '{}')", c))
                .unwrap_or_default()
        );
    }

    repo.write_config(&config.to_git_config_entries())
        .context("failed to write gitflow settings to git config")?;
    println!("{}", style::success("Saved branch names and prefixes to git config"));

    let mut orch = Orchestrator::new(repo, FlowOptions::from_config(&config))
        .context("invalid gitflow configuration")?;
    let created = orch.init().context("failed to create integration branch")?;
    if created {
        println!(
            "{}",
            style::success(&format!(
                "Created {} from {}",
                style::branch(&config.branches.integration),
                style::branch(&trunk)
            ))
        );
    } else {
        println!(
            "{}",
            style::success(&format!(
                "Integration branch {} already exists",
                style::branch(&config.branches.integration)
            ))
        );
    }

    println!();
    println!(
        "  {}",
        style::dim("Start work with `gitflow feature start <name>`")
    );
    Ok(())
}

fn prompt_policy(config: &mut FlowConfig) -> Result<()> {
    let accent = Style::new().cyan().bold();
    println!();
    println!("{}", accent.apply_to("gitflow setup"));
    println!();

    println!("{}", style::header("Branches"));
    config.branches.trunk = ask("Branch for production releases", &config.branches.trunk)?;
    config.branches.integration = ask("Branch for next-release development", &config.branches.integration)?;
    println!();

    println!("{}", style::header("Prefixes"));
    config.prefixes.feature = ask("Feature branch prefix", &config.prefixes.feature)?;
    config.prefixes.release = ask("Release branch prefix", &config.prefixes.release)?;
    config.prefixes.hotfix = ask("Hotfix branch prefix", &config.prefixes.hotfix)?;
    config.prefixes.support = ask("Support branch prefix", &config.prefixes.support)?;
    config.prefixes.version_tag = Input::new()
        .with_prompt("Version tag prefix")
        .default(config.prefixes.version_tag.clone())
        .allow_empty(true)
        .interact_text()
        .context("failed to read version tag prefix")?;
    println!();

    let proceed = Confirm::new()
        .with_prompt("Write these settings to git config?")
        .default(true)
        .interact()
        .context("failed to read confirmation")?;
    if !proceed {
        anyhow::bail!("init cancelled");
    }
    Ok(())
}

fn ask(prompt: &str, default: &str) -> Result<String> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()
        .with_context(|| format!("failed to read '{}'", prompt))?;
    Ok(value.trim().to_string())
}
