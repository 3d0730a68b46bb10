//! Config command - View and validate the LeadGraph configuration

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use leadgraph_core::config::{Config, ValidationError};
use serde_json::json;
use tracing::info;

use super::CommandContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(ctx),
            ConfigCommand::Validate => execute_validate(ctx),
        }
    }
}

fn execute_show(ctx: &CommandContext) -> Result<()> {
    let formatter = ctx.formatter();
    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if ctx.format.is_json() {
        let value = serde_json::to_value(&ctx.config)
            .context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&value);
        return Ok(());
    }

    formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
    formatter.info("");
    let yaml =
        serde_yaml::to_string(&ctx.config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        formatter.info(line);
    }
    Ok(())
}

fn execute_validate(ctx: &CommandContext) -> Result<()> {
    let formatter = ctx.formatter();
    let path = ctx.config_path.as_path();
    info!(config_path = %path.display(), "Validating configuration");

    let errors = match validate_file(path) {
        Ok(errors) => errors,
        Err(message) => {
            if ctx.format.is_json() {
                formatter.print_json(&json!({
                    "valid": false,
                    "config_path": path.display().to_string(),
                    "errors": [message],
                }));
            } else {
                formatter.error(&message);
                formatter.info(&format!("File: {}", path.display()));
            }
            bail!(message)
        }
    };

    if ctx.format.is_json() {
        let messages: Vec<String> = errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        formatter.print_json(&json!({
            "valid": errors.is_empty(),
            "config_path": path.display().to_string(),
            "errors": messages,
        }));
    } else if errors.is_empty() {
        formatter.success(&format!("Configuration is valid ({})", path.display()));
    } else {
        formatter.error(&format!("{} problem(s) in {}", errors.len(), path.display()));
        for e in &errors {
            formatter.info(&format!("{}: {}", e.field, e.message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Configuration is invalid")
    }
}

/// Loads `path` strictly and returns its validation errors.
///
/// A missing or unparsable file is an error message rather than defaults.
fn validate_file(path: &Path) -> Result<Vec<ValidationError>, String> {
    if !path.exists() {
        return Err(format!("Configuration file not found: {}", path.display()));
    }
    let config =
        Config::load(path).map_err(|e| format!("Failed to parse configuration: {e}"))?;
    Ok(config.validate())
}
