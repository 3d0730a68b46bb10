//! Forms and leads commands
//!
//! Both check the configured account scopes and then resolve the page among
//! the user's managed pages, so a missing scope or a page without the lead
//! access task fails before any form is read.

use anyhow::Result;
use clap::Args;
use leadgraph_core::domain::{GraphId, Lead};
use leadgraph_graph::leads;
use serde_json::json;

use super::CommandContext;
use crate::output::OutputFormatter;

#[derive(Debug, Args)]
pub struct FormsCommand {
    /// Page ID
    pub page_id: GraphId,
}

impl FormsCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let token = ctx.token()?;
        let formatter = ctx.formatter();

        let validator = ctx.validator();
        let forms = async {
            let (page, page_token) = leads::open_lead_page(&validator, token, &self.page_id).await?;
            leads::get_leadgen_forms(&ctx.client, &page.id, &page_token).await
        }
        .await
        .map_err(|err| ctx.fail(err))?;

        if ctx.format.is_json() {
            formatter.print_json(&json!({ "page_id": self.page_id, "forms": forms }));
            return Ok(());
        }

        if forms.is_empty() {
            formatter.info("No lead forms on this page.");
            return Ok(());
        }
        println!("{:<20} {:<32} {:<10} {:>8}", "ID", "Name", "Status", "Leads");
        println!("{}", "-".repeat(73));
        for form in &forms {
            println!(
                "{:<20} {:<32} {:<10} {:>8}",
                form.id.as_str(),
                form.name,
                form.status.as_deref().unwrap_or("-"),
                form.leads_count.map(|n| n.to_string()).unwrap_or_default(),
            );
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct LeadsCommand {
    /// Page ID
    pub page_id: GraphId,

    /// Only read leads of this form
    #[arg(long)]
    pub form: Option<GraphId>,
}

impl LeadsCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let token = ctx.token()?;
        let formatter = ctx.formatter();
        let validator = ctx.validator();

        if let Some(form_id) = &self.form {
            let leads = leads::fetch_form_leads(&validator, token, &self.page_id, form_id)
                .await
                .map_err(|err| ctx.fail(err))?;
            if ctx.format.is_json() {
                formatter.print_json(&json!({ "form_id": form_id, "leads": leads }));
            } else {
                print_leads(formatter.as_ref(), &leads);
            }
            return Ok(());
        }

        let result = leads::fetch_page_leads(&validator, token, &self.page_id)
            .await
            .map_err(|err| ctx.fail(err))?;

        if ctx.format.is_json() {
            let value = serde_json::to_value(&result)?;
            formatter.print_json(&value);
            return Ok(());
        }

        formatter.success(&format!(
            "{} lead(s) from {} form(s) on {}",
            result.total_leads(),
            result.forms.len(),
            result.page_name
        ));
        for form in &result.forms {
            println!();
            println!("{} ({})", form.form_name, form.form_id);
            match &form.error {
                Some(failure) => formatter.warn(&format!(
                    "Could not read leads: {} (code {})",
                    failure.message, failure.code
                )),
                None => print_leads(formatter.as_ref(), &form.leads),
            }
        }
        Ok(())
    }
}

fn print_leads(formatter: &dyn OutputFormatter, leads: &[Lead]) {
    if leads.is_empty() {
        formatter.info("No leads.");
        return;
    }
    for lead in leads {
        let answers: Vec<String> = lead
            .field_data
            .iter()
            .map(|f| format!("{}={}", f.name, f.values.join("|")))
            .collect();
        formatter.info(&format!("{}  {}  {}", lead.id, lead.created_time, answers.join(", ")));
    }
}
