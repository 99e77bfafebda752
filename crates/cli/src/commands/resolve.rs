//! One-off descriptor conflict resolution for a single file.
//!
//! Useful after a finish stopped with conflicts, or for checking what the
//! resolver would decide without running a transition.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use gitflow_core::conflict::{
    Classification, ConflictDocument, DescriptorResolution, ResolveContext, Side,
};
use gitflow_core::{BranchKind, FlowConfig, VersionPrecedence};

use super::style;

pub fn run_resolve(
    config: &FlowConfig,
    file: &Path,
    kind: &str,
    precedence: Option<&str>,
    write: bool,
) -> Result<()> {
    let transition = BranchKind::from_str_val(kind)
        .filter(|k| matches!(k, BranchKind::Feature | BranchKind::Release | BranchKind::Hotfix))
        .with_context(|| format!("invalid kind '{}': use feature, release or hotfix", kind))?;

    let mut resolver = config.resolver();
    if let Some(p) = precedence {
        let parsed = VersionPrecedence::parse(p)
            .with_context(|| format!("invalid precedence '{}': use auto, target or incoming", p))?;
        resolver = resolver.with_precedence(parsed);
    }
    resolver.validate().context("invalid resolver configuration")?;

    if !config.matcher().is_descriptor(&file.to_string_lossy()) {
        println!(
            "{}",
            style::warn(&format!(
                "{} does not match the configured descriptor patterns",
                file.display()
            ))
        );
    }

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let ctx = ResolveContext {
        transition,
        target: "HEAD".into(),
        source: "incoming".into(),
    };

    if let Ok(mut doc) = ConflictDocument::parse(&text) {
        resolver.classify(&mut doc);
        print_regions(&doc, transition, resolver.precedence());
    }

    match resolver.resolve(&ctx, &text) {
        DescriptorResolution::Resolved { content, regions } => {
            if write {
                std::fs::write(file, &content)
                    .with_context(|| format!("failed to write {}", file.display()))?;
                println!(
                    "{}",
                    style::success(&format!(
                        "Resolved {} version conflict(s) in {}",
                        regions,
                        file.display()
                    ))
                );
            } else {
                println!(
                    "{}",
                    style::success(&format!(
                        "{} version conflict(s) can be resolved; re-run with --write to apply",
                        regions
                    ))
                );
            }
            Ok(())
        }
        DescriptorResolution::Escalated(reason) => {
            println!("{}", style::error(&format!("{}: {}", file.display(), reason)));
            anyhow::bail!("{} needs manual resolution", file.display())
        }
    }
}

fn print_regions(doc: &ConflictDocument, transition: BranchKind, precedence: VersionPrecedence) {
    let regions: Vec<_> = doc.regions().collect();
    if regions.is_empty() {
        return;
    }

    println!();
    println!("{}", style::header(&format!("Conflict regions ({})", regions.len())));
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Line", "Kind", "Ours", "Base", "Theirs", "Keeps"]);

    for region in regions {
        match &region.classification {
            Classification::VersionOnly(conflict) => {
                let keeps = match precedence.choose(transition, conflict) {
                    Side::Ours => "ours",
                    Side::Theirs => "theirs",
                };
                table.add_row(vec![
                    Cell::new(region.start_line),
                    Cell::new(format!("<{}>", conflict.element)).fg(Color::Green),
                    Cell::new(&conflict.ours),
                    Cell::new(conflict.base.as_deref().unwrap_or("-")),
                    Cell::new(&conflict.theirs),
                    Cell::new(keeps),
                ]);
            }
            Classification::Other => {
                table.add_row(vec![
                    Cell::new(region.start_line),
                    Cell::new("other").fg(Color::Red),
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new("manual"),
                ]);
            }
        }
    }

    println!("{}", table);
    println!();
}
