//! CLI subcommands and the context they share

pub mod collect;
pub mod config;
pub mod leads;
pub mod pages;
pub mod permissions;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use leadgraph_core::{config::Config, domain::AccessToken};
use leadgraph_graph::{client::GraphClient, permissions::PermissionValidator, GraphError};
use leadgraph_telemetry::{ErrorReporter, MetricsRegistry};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Everything a subcommand needs, built once in `main`.
pub struct CommandContext {
    pub config: Config,
    pub config_path: std::path::PathBuf,
    pub format: OutputFormat,
    pub client: Arc<GraphClient>,
    pub reporter: Arc<ErrorReporter>,
    pub metrics: Arc<MetricsRegistry>,
    token: Option<AccessToken>,
}

impl CommandContext {
    pub fn new(
        config: Config,
        config_path: std::path::PathBuf,
        format: OutputFormat,
        token: Option<String>,
        reporter: Arc<ErrorReporter>,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self> {
        let client = GraphClient::from_config(&config)
            .map_err(|e| anyhow!("Invalid retry configuration: {e}"))?
            .with_reporter(Arc::clone(&reporter))
            .with_metrics(Arc::clone(&metrics));
        let token = token
            .map(AccessToken::new)
            .transpose()
            .map_err(|e| anyhow!("Invalid access token: {e}"))?;

        Ok(Self {
            config,
            config_path,
            format,
            client: Arc::new(client),
            reporter,
            metrics,
            token,
        })
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format)
    }

    /// Validator for the configured scopes and page task, reporting gaps.
    pub fn validator(&self) -> PermissionValidator {
        PermissionValidator::new(Arc::clone(&self.client), &self.config.permissions)
            .with_reporter(Arc::clone(&self.reporter))
    }

    /// The user token, or a 401-style failure when none was given.
    pub fn token(&self) -> Result<&AccessToken> {
        match &self.token {
            Some(token) => Ok(token),
            None => {
                let formatter = self.formatter();
                if self.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "status": 401,
                        "error": "Not authenticated",
                    }));
                } else {
                    formatter.error("Not authenticated");
                    formatter.info("Pass --token or set LEADGRAPH_ACCESS_TOKEN.");
                }
                Err(anyhow!("Not authenticated"))
            }
        }
    }

    /// Prints a Graph failure and turns it into the command's error.
    pub fn fail(&self, err: GraphError) -> anyhow::Error {
        self.formatter().graph_failure(&err);
        anyhow::Error::new(err)
    }
}
