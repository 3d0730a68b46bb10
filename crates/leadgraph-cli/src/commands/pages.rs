//! Pages command - Show the signed-in user and the pages they manage

use anyhow::Result;
use clap::Args;
use leadgraph_core::domain::ACCESS_LEAD_GEN;
use serde_json::json;
use tracing::info;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PagesCommand {
    /// Only list pages granting lead access
    #[arg(long)]
    pub leads_only: bool,
}

impl PagesCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let token = ctx.token()?;
        let formatter = ctx.formatter();

        let (me, mut pages) =
            match tokio::try_join!(ctx.client.get_me(token), ctx.client.get_pages(token)) {
                Ok(result) => result,
                Err(err) => return Err(ctx.fail(err)),
            };
        if self.leads_only {
            pages.retain(|p| p.has_task(ACCESS_LEAD_GEN));
        }
        info!(user = %me.id, pages = pages.len(), "Listed pages");

        if ctx.format.is_json() {
            let pages: Vec<_> = pages
                .iter()
                .map(|p| {
                    json!({
                        "id": p.id,
                        "name": p.name,
                        "category": p.category,
                        "tasks": p.tasks,
                        "lead_access": p.has_task(ACCESS_LEAD_GEN),
                    })
                })
                .collect();
            formatter.print_json(&json!({ "user": me, "pages": pages }));
            return Ok(());
        }

        formatter.success(&format!("Signed in as {} ({})", me.name, me.id));
        if pages.is_empty() {
            formatter.info("No pages found.");
            return Ok(());
        }

        println!();
        println!("{:<20} {:<32} {:<6}", "ID", "Name", "Leads");
        println!("{}", "-".repeat(60));
        for page in &pages {
            let leads = if page.has_task(ACCESS_LEAD_GEN) {
                "\u{2713}"
            } else {
                "-"
            };
            println!("{:<20} {:<32} {:<6}", page.id.as_str(), page.name, leads);
        }
        println!();
        println!("Total: {} page(s)", pages.len());
        Ok(())
    }
}
