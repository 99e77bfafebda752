//! Repository status: the current branch's role and the naming policy.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use gitflow_core::{BranchKind, GitRepository, Orchestrator, RepositoryPort};

use super::style;

pub fn run_status(orch: &Orchestrator<GitRepository>, json: bool) -> Result<()> {
    let branch_name = orch
        .port()
        .current_branch()
        .context("failed to read current branch")?;
    let classified = orch.current_branch().ok();
    let dirty = orch
        .port()
        .has_uncommitted_changes()
        .context("failed to read working tree status")?;
    let policy = orch.policy();

    if json {
        let status = serde_json::json!({
            "branch": branch_name,
            "kind": classified.as_ref().map(|b| b.kind()),
            "identifier": classified.as_ref().map(|b| b.short_name()),
            "uncommitted_changes": dirty,
            "policy": policy,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("{}", style::header("gitflow status"));
    println!("{}", "═".repeat(14));
    println!();

    let role = match &classified {
        Some(b) if matches!(b.kind(), BranchKind::Trunk | BranchKind::Integration) => b.kind().to_string(),
        Some(b) => format!("{} '{}'", b.kind(), b.short_name()),
        None => style::warn("not a gitflow branch"),
    };
    println!("  Branch     {} ({})", style::branch(&branch_name), role);
    println!(
        "  Worktree   {}",
        if dirty {
            style::warn("uncommitted changes")
        } else {
            style::success("clean")
        }
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Role", "Name / prefix", "Branches"]);

    table.add_row(vec![
        Cell::new("trunk"),
        Cell::new(policy.trunk_branch()),
        Cell::new(""),
    ]);
    table.add_row(vec![
        Cell::new("integration"),
        Cell::new(policy.integration_branch()),
        Cell::new(""),
    ]);
    for kind in BranchKind::PREFIXED {
        let count = orch.list(kind).map(|b| b.len()).unwrap_or(0);
        table.add_row(vec![
            Cell::new(kind.to_string()),
            Cell::new(policy.prefix(kind).unwrap_or("")),
            Cell::new(count.to_string()),
        ]);
    }
    let tag_prefix = policy.tag_prefix();
    table.add_row(vec![
        Cell::new("version tag"),
        Cell::new(if tag_prefix.is_empty() { "(none)" } else { tag_prefix }),
        Cell::new(""),
    ]);

    println!("{}", table);
    println!();
    Ok(())
}
