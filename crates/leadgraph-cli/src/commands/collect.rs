//! Collect command - Run the local error report collector

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use leadgraph_telemetry::{server::ERROR_REPORTING_PATH, ReportCollector};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct CollectCommand {
    /// Address to bind (default: metrics.endpoint from the configuration)
    #[arg(long)]
    pub addr: Option<String>,

    /// Number of received reports kept in memory
    #[arg(long)]
    pub retain: Option<usize>,
}

impl CollectCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let endpoint = self
            .addr
            .as_deref()
            .unwrap_or(ctx.config.metrics.endpoint.as_str());

        let mut collector = ReportCollector::new(Arc::clone(&ctx.metrics), endpoint)?;
        if let Some(retain) = self.retain {
            collector = collector.with_retention(retain);
        }

        let formatter = ctx.formatter();
        formatter.success(&format!(
            "Collecting error reports on http://{}{}",
            collector.addr(),
            ERROR_REPORTING_PATH
        ));
        formatter.info(&format!("Metrics on http://{}/metrics", collector.addr()));
        formatter.info("Press Ctrl+C to stop.");

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.cancel();
            }
        });

        collector.run(shutdown).await?;
        info!(received = collector.received().len(), "Collector stopped");
        Ok(())
    }
}
