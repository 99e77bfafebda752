//! Subcommand implementations.
//!
//! Each module implements one command group: repository initialisation,
//! branch start/finish/list, status, one-off descriptor resolution and
//! configuration inspection.

pub mod branch;
pub mod config;
pub mod init;
pub mod resolve;
pub mod status;
pub mod style;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use gitflow_core::{FlowConfig, FlowOptions, GitRepository, Orchestrator};

/// Open the repository at `repo_path` and wrap it in an orchestrator.
pub fn open_orchestrator(repo_path: &Path, config: &FlowConfig) -> Result<Orchestrator<GitRepository>> {
    debug!(
        repo = %repo_path.display(),
        trunk = config.branches.trunk.as_str(),
        integration = config.branches.integration.as_str(),
        "opening orchestrator"
    );
    let repo = GitRepository::open(repo_path).context("failed to open git repository")?;
    Orchestrator::new(repo, FlowOptions::from_config(config)).context("invalid gitflow configuration")
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/etc/gitflow.toml"), "/etc/gitflow.toml");
        assert_eq!(expand_tilde("relative.toml"), "relative.toml");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_tilde("~/gitflow.toml"),
                format!("{}/gitflow.toml", home.display())
            );
        }
    }
}
