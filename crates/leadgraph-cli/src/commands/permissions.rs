//! Permissions command - Check the token's scopes and page tasks

use anyhow::{bail, Result};
use clap::Args;
use leadgraph_core::domain::PermissionSet;
use leadgraph_graph::permissions::{PermissionCheck, PermissionReport};
use serde_json::json;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PermissionsCommand {
    /// Scope to require (repeatable); defaults to the configured scopes
    #[arg(long = "scope")]
    pub scopes: Vec<String>,

    /// Also require the lead access task on at least one page
    #[arg(long)]
    pub leads: bool,
}

impl PermissionsCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let token = ctx.token()?;
        let formatter = ctx.formatter();

        let validator = ctx.validator();
        let required: PermissionSet = if self.scopes.is_empty() {
            validator.required_scopes().clone()
        } else {
            self.scopes.iter().cloned().collect()
        };
        let check = if self.leads {
            PermissionCheck::LeadAccess
        } else {
            PermissionCheck::Scopes
        };

        let report = validator
            .validate(token, &required, check)
            .await
            .map_err(|err| ctx.fail(err))?;

        if let PermissionReport::Granted = report {
            if ctx.format.is_json() {
                formatter.print_json(&json!({
                    "success": true,
                    "report": report,
                    "required": required,
                }));
            } else {
                formatter.success(&format!("All required permissions granted: {required}"));
            }
            return Ok(());
        }

        let summary = match &report {
            PermissionReport::MissingScopes { missing } => format!("Missing permissions: {missing}"),
            PermissionReport::MissingPageTask { task } => format!("No page grants {task}"),
            PermissionReport::Granted => String::new(),
        };
        if let Err(err) = report.into_result() {
            formatter.graph_failure(&err);
        }
        bail!(summary)
    }
}
