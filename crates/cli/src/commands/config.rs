//! `config validate` and `config show`.

use std::path::Path;

use anyhow::{Context, Result};

use gitflow_core::config::CONFIG_FILE_NAME;
use gitflow_core::FlowConfig;

use super::style;

/// Load the layered configuration and report each check.
pub fn run_validate(repo_path: &Path, explicit: Option<&Path>) -> Result<()> {
    match explicit {
        Some(path) => println!("Validating configuration: {}", path.display()),
        None => println!(
            "Validating configuration for {} (git config + {})",
            repo_path.display(),
            CONFIG_FILE_NAME
        ),
    }
    println!();

    let config = match FlowConfig::load_layered(repo_path, explicit) {
        Ok(config) => config,
        Err(e) => {
            println!("  {}", style::error(&format!("Could not load configuration: {}", e)));
            anyhow::bail!("configuration validation failed");
        }
    };
    println!("  {}", style::success("Configuration layers parsed"));

    match config.validate() {
        Ok(()) => println!("  {}", style::success("Branch names, prefixes and resolver settings are valid")),
        Err(e) => {
            println!("  {}", style::error(&format!("Validation error: {}", e)));
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Trunk         : {}", config.branches.trunk);
    println!("  Integration   : {}", config.branches.integration);
    println!(
        "  Prefixes      : {} {} {} {}",
        config.prefixes.feature, config.prefixes.release, config.prefixes.hotfix, config.prefixes.support
    );
    println!(
        "  Version tag   : {}",
        if config.prefixes.version_tag.is_empty() {
            "(no prefix)"
        } else {
            config.prefixes.version_tag.as_str()
        }
    );
    println!("  Descriptors   : {}", config.resolver.descriptor_patterns.join(", "));
    println!("  Precedence    : {}", config.resolver.precedence);
    println!(
        "  Push          : {}",
        if config.finish.push {
            format!("yes ({})", config.finish.remote)
        } else {
            "no".into()
        }
    );

    Ok(())
}

/// Print the effective configuration.
pub fn run_show(config: &FlowConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        let text = toml::to_string_pretty(config).context("failed to render configuration")?;
        print!("{}", text);
    }
    Ok(())
}
