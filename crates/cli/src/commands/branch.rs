//! `feature`, `release`, `hotfix` and `support` subcommands.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use gitflow_core::errors::FlowError;
use gitflow_core::models::MergeOutcome;
use gitflow_core::{
    BranchKind, FinishOptions, GitRepository, Orchestrator, RepositoryPort, TransitionReport,
    TransitionRequest,
};

use super::style;

/// Create and check out a new branch of `kind`.
pub fn run_start(
    orch: &mut Orchestrator<GitRepository>,
    kind: BranchKind,
    identifier: &str,
    base: Option<String>,
) -> Result<()> {
    let mut request = TransitionRequest::new(kind, identifier);
    if let Some(base) = base {
        request = request.with_start_point(base);
    }

    let report = orch
        .start(request)
        .with_context(|| format!("could not start {} '{}'", kind, identifier))?;

    let start_point = report.start_point.as_deref().unwrap_or("?");
    println!(
        "{}",
        style::success(&format!(
            "Created {} from {}",
            style::branch(&report.branch),
            style::branch(start_point)
        ))
    );
    println!("  Now on {}", style::branch(&report.branch));
    if kind == BranchKind::Release || kind == BranchKind::Hotfix {
        println!(
            "  {}",
            style::dim(&format!("Bump the version, then run `gitflow {} finish {}`", kind, identifier))
        );
    }
    Ok(())
}

/// Finish a branch of `kind`. Without an identifier, the current branch is
/// finished if it is of that kind.
pub fn run_finish(
    orch: &mut Orchestrator<GitRepository>,
    kind: BranchKind,
    identifier: Option<String>,
    opts: FinishOptions,
    json: bool,
) -> Result<()> {
    let identifier = match identifier {
        Some(id) => id,
        None => {
            let current = orch
                .current_branch()
                .context("cannot infer which branch to finish; pass an identifier")?;
            if current.kind() != kind {
                anyhow::bail!(
                    "current branch '{}' is not a {} branch; pass an identifier",
                    current.name(),
                    kind
                );
            }
            current.short_name().to_string()
        }
    };

    let report = match orch.finish(kind, &identifier, opts) {
        Ok(report) => report,
        Err(err) => {
            if let FlowError::MergeConflict { target, paths } = err.flow_error() {
                eprintln!("{}", style::error(&format!("Merge into {} needs manual resolution:", target)));
                for path in paths {
                    eprintln!("    {}", path);
                }
                eprintln!(
                    "  {}",
                    style::dim(&format!(
                        "Resolve and commit the merge, then re-run `gitflow {} finish {}`",
                        kind, identifier
                    ))
                );
            }
            return Err(err).with_context(|| format!("could not finish {} '{}'", kind, identifier));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_finish_summary(&report);
    }
    Ok(())
}

fn print_finish_summary(report: &TransitionReport) {
    println!();
    println!("{}", style::header(&format!("Finished {}", report.branch)));
    println!();

    for merge in &report.merges {
        match &merge.outcome {
            MergeOutcome::Clean => {
                println!("{}", style::success(&format!("Merged into {}", style::branch(&merge.target))));
            }
            MergeOutcome::AutoResolved { paths } => {
                println!(
                    "{}",
                    style::success(&format!(
                        "Merged into {} (version conflicts repaired in {})",
                        style::branch(&merge.target),
                        paths.join(", ")
                    ))
                );
            }
        }
    }
    if let Some(tag) = &report.tag {
        println!("{}", style::success(&format!("Tagged {}", tag)));
    }
    if report.branch_deleted {
        println!("{}", style::success(&format!("Deleted {}", report.branch)));
    }
    if !report.pushed.is_empty() {
        println!("{}", style::success(&format!("Pushed {}", report.pushed.join(", "))));
    }
    for warning in &report.warnings {
        println!("{}", style::warn(warning));
    }
    println!();
}

/// List local branches of `kind`.
pub fn run_list(orch: &Orchestrator<GitRepository>, kind: BranchKind) -> Result<()> {
    let branches = orch
        .list(kind)
        .with_context(|| format!("failed to list {} branches", kind))?;

    if branches.is_empty() {
        println!("{}", style::dim(&format!("No {} branches", kind)));
        return Ok(());
    }

    let current = orch.port().current_branch().ok();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["", "Branch", "Identifier"]);

    for branch in &branches {
        let marker = if current.as_deref() == Some(branch.name()) {
            style::current_marker()
        } else {
            String::new()
        };
        table.add_row(vec![
            Cell::new(marker),
            Cell::new(branch.name()),
            Cell::new(branch.short_name()),
        ]);
    }

    println!("{}", table);
    Ok(())
}
