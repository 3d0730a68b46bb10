//! LeadGraph CLI - Command-line interface for the Graph access layer
//!
//! Provides commands for:
//! - Listing the pages the signed-in user manages
//! - Reading lead forms and leads of a page
//! - Checking granted permissions and page tasks
//! - Inspecting the configuration
//! - Running the local error report collector

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leadgraph_core::config::{Config, LoggingConfig};
use leadgraph_telemetry::{ErrorContext, ErrorReporter, MetricsRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    collect::CollectCommand,
    config::ConfigCommand,
    leads::{FormsCommand, LeadsCommand},
    pages::PagesCommand,
    permissions::PermissionsCommand,
    CommandContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "leadgraph", version, about = "Facebook lead retrieval from the command line")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User access token
    #[arg(long, global = true, env = "LEADGRAPH_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the signed-in user and their pages
    Pages(PagesCommand),
    /// List the lead forms of a page
    Forms(FormsCommand),
    /// Read leads of a page or a single form
    Leads(LeadsCommand),
    /// Check granted permissions and page tasks
    Permissions(PermissionsCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Run the local error report collector
    Collect(CollectCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Pages(_) => "pages",
            Commands::Forms(_) => "forms",
            Commands::Leads(_) => "leads",
            Commands::Permissions(_) => "permissions",
            Commands::Config(_) => "config",
            Commands::Collect(_) => "collect",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_path) = match &cli.config {
        Some(path) => {
            let config = if matches!(cli.command, Commands::Config(ConfigCommand::Validate)) {
                Config::load_or_default(path)
            } else {
                Config::load(path)
                    .with_context(|| format!("Failed to load configuration from {}", path.display()))?
            };
            (config, path.clone())
        }
        None => {
            let path = Config::default_path();
            (Config::load_or_default(&path), path)
        }
    };

    init_tracing(&config.logging, cli.verbose);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let metrics = Arc::new(MetricsRegistry::new()?);
    let reporter = Arc::new(
        ErrorReporter::from_config(&config.reporting)?
            .with_origin("cli")
            .with_metrics(Arc::clone(&metrics)),
    );
    reporter.capture_unhandled();

    let shutdown = CancellationToken::new();
    let flush_task = reporter.spawn_flush_task(
        Duration::from_secs(config.reporting.flush_interval_secs),
        shutdown.clone(),
    );

    let ctx = CommandContext::new(config, config_path, format, cli.token, reporter, metrics)?;
    let result = match &cli.command {
        Commands::Pages(cmd) => cmd.execute(&ctx).await,
        Commands::Forms(cmd) => cmd.execute(&ctx).await,
        Commands::Leads(cmd) => cmd.execute(&ctx).await,
        Commands::Permissions(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Collect(cmd) => cmd.execute(&ctx).await,
    };

    if let Err(e) = &result {
        ctx.reporter
            .report_api_error(&**e, cli.command.name(), ErrorContext::new());
    }

    shutdown.cancel();
    if let Err(e) = flush_task.await {
        warn!(error = %e, "Error report flush task failed");
    }
    debug!(dropped = ctx.reporter.dropped_count(), "Exiting");

    result
}

fn init_tracing(logging: &LoggingConfig, verbose: u8) {
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
