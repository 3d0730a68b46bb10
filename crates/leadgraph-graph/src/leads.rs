//! Lead retrieval
//!
//! Leads are read with page-scoped tokens. The flow for one page is:
//!
//! 1. Require the configured account scopes (`me/permissions`)
//! 2. Find the page among the user's `me/accounts` (this also yields the
//!    page token and the user's tasks on it)
//! 3. Require the lead access task on that page
//! 4. List the page's lead forms
//! 5. Fetch leads for every form concurrently
//!
//! Step 5 never fails as a whole: a form whose leads cannot be read carries
//! its error next to the forms that succeeded.

use futures_util::future::join_all;
use leadgraph_core::domain::{
    AccessToken, DomainError, GraphId, Lead, LeadgenForm, Page, ACCESS_LEAD_GEN,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    client::{GraphClient, GraphRequest},
    permissions::{require_page_task, PermissionValidator},
    ErrorKind, GraphError,
};

/// Fields requested for lead forms
pub const FORM_FIELDS: &[&str] = &["id", "name", "status", "leads_count", "created_time"];

/// Fields requested for leads
pub const LEAD_FIELDS: &[&str] = &["id", "created_time", "ad_id", "form_id", "field_data"];

/// A failure attached to one entry of a fan-out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchFailure {
    pub kind: ErrorKind,
    pub code: i64,
    pub message: String,
    pub transient: bool,
    pub status: u16,
}

impl From<&GraphError> for FetchFailure {
    fn from(err: &GraphError) -> Self {
        Self {
            kind: err.kind,
            code: err.code,
            message: err.message.clone(),
            transient: err.transient,
            status: err.http_status(),
        }
    }
}

/// Leads of one form, or why they could not be read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormLeads {
    pub form_id: GraphId,
    pub form_name: String,
    pub leads: Vec<Lead>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchFailure>,
}

/// Everything read for one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageLeads {
    pub page_id: GraphId,
    pub page_name: String,
    pub forms: Vec<FormLeads>,
}

impl PageLeads {
    pub fn total_leads(&self) -> usize {
        self.forms.iter().map(|f| f.leads.len()).sum()
    }

    /// Forms whose leads could not be read.
    pub fn failed_forms(&self) -> impl Iterator<Item = &FormLeads> {
        self.forms.iter().filter(|f| f.error.is_some())
    }
}

/// A page id and the page token to read it with
#[derive(Debug, Clone)]
pub struct PageAccess {
    pub page_id: GraphId,
    pub token: AccessToken,
}

/// Leads read directly from one page in a multi-page fan-out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageLeadsResult {
    pub page_id: GraphId,
    pub leads: Vec<Lead>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchFailure>,
}

/// Zips page ids with their tokens, rejecting lists of different length.
pub fn pair_page_tokens(
    page_ids: Vec<GraphId>,
    tokens: Vec<AccessToken>,
) -> Result<Vec<PageAccess>, DomainError> {
    if page_ids.len() != tokens.len() {
        return Err(DomainError::LengthMismatch {
            left: page_ids.len(),
            right: tokens.len(),
        });
    }
    Ok(page_ids
        .into_iter()
        .zip(tokens)
        .map(|(page_id, token)| PageAccess { page_id, token })
        .collect())
}

/// Lead forms of a page.
pub async fn get_leadgen_forms(
    client: &GraphClient,
    page_id: &GraphId,
    page_token: &AccessToken,
) -> Result<Vec<LeadgenForm>, GraphError> {
    let request = GraphRequest::get(format!("{page_id}/leadgen_forms"))
        .fields(FORM_FIELDS.iter().copied())
        .param("limit", client.page_limit().to_string());
    client.fetch_all(&request, page_token).await
}

/// Leads submitted through a form.
pub async fn get_form_leads(
    client: &GraphClient,
    form_id: &GraphId,
    page_token: &AccessToken,
) -> Result<Vec<Lead>, GraphError> {
    let request = GraphRequest::get(format!("{form_id}/leads"))
        .fields(LEAD_FIELDS.iter().copied())
        .param("limit", client.page_limit().to_string());
    client.fetch_all(&request, page_token).await
}

/// Looks `page_id` up among the user's pages and checks lead access on it.
///
/// Returns the page together with its page token.
pub async fn find_lead_page(
    client: &GraphClient,
    user_token: &AccessToken,
    page_id: &GraphId,
) -> Result<(Page, AccessToken), GraphError> {
    let pages = client.get_pages(user_token).await?;
    let page = pages
        .into_iter()
        .find(|p| &p.id == page_id)
        .ok_or_else(|| GraphError::page_not_accessible(page_id.as_str()))?;

    require_page_task(&page, ACCESS_LEAD_GEN)?;

    let token = page.access_token.clone().ok_or_else(|| {
        let mut err = GraphError::page_not_accessible(page_id.as_str());
        err.message = format!("Graph returned no page token for page {page_id}");
        err
    })?;
    Ok((page, token))
}

/// Checks the user's account scopes, then finds `page_id` as
/// [`find_lead_page`] does.
///
/// Missing scopes short-circuit before any page is requested.
pub async fn open_lead_page(
    validator: &PermissionValidator,
    user_token: &AccessToken,
    page_id: &GraphId,
) -> Result<(Page, AccessToken), GraphError> {
    validator.require_scopes(user_token).await?;
    find_lead_page(validator.client(), user_token, page_id).await
}

/// Leads of each form, fetched concurrently. One form failing does not
/// affect the others.
pub async fn fetch_leads_for_forms(
    client: &GraphClient,
    page_token: &AccessToken,
    forms: &[LeadgenForm],
) -> Vec<FormLeads> {
    let fetches = forms.iter().map(|form| async move {
        match get_form_leads(client, &form.id, page_token).await {
            Ok(leads) => {
                debug!(form_id = %form.id, count = leads.len(), "Fetched form leads");
                FormLeads {
                    form_id: form.id.clone(),
                    form_name: form.name.clone(),
                    leads,
                    error: None,
                }
            }
            Err(err) => {
                warn!(form_id = %form.id, code = err.code, "Failed to fetch form leads");
                FormLeads {
                    form_id: form.id.clone(),
                    form_name: form.name.clone(),
                    leads: Vec::new(),
                    error: Some(FetchFailure::from(&err)),
                }
            }
        }
    });
    join_all(fetches).await
}

/// Page → forms → leads for one page the user manages.
pub async fn fetch_page_leads(
    validator: &PermissionValidator,
    user_token: &AccessToken,
    page_id: &GraphId,
) -> Result<PageLeads, GraphError> {
    let client = validator.client();
    let (page, page_token) = open_lead_page(validator, user_token, page_id).await?;
    let forms = get_leadgen_forms(client, &page.id, &page_token).await?;
    let forms = fetch_leads_for_forms(client, &page_token, &forms).await;

    let result = PageLeads {
        page_id: page.id,
        page_name: page.name,
        forms,
    };
    info!(
        page_id = %result.page_id,
        forms = result.forms.len(),
        leads = result.total_leads(),
        failed_forms = result.failed_forms().count(),
        "Fetched page leads"
    );
    Ok(result)
}

/// Leads of a single form on a page the user manages.
pub async fn fetch_form_leads(
    validator: &PermissionValidator,
    user_token: &AccessToken,
    page_id: &GraphId,
    form_id: &GraphId,
) -> Result<Vec<Lead>, GraphError> {
    let (_, page_token) = open_lead_page(validator, user_token, page_id).await?;
    get_form_leads(validator.client(), form_id, &page_token).await
}

/// Reads `{page}/leads` for several pages at once, each with its own token.
pub async fn fetch_leads_for_pages(
    client: &GraphClient,
    pages: &[PageAccess],
) -> Vec<PageLeadsResult> {
    let fetches = pages.iter().map(|access| async move {
        let request = GraphRequest::get(format!("{}/leads", access.page_id))
            .fields(LEAD_FIELDS.iter().copied());
        match client.fetch_all::<Lead>(&request, &access.token).await {
            Ok(leads) => PageLeadsResult {
                page_id: access.page_id.clone(),
                leads,
                error: None,
            },
            Err(err) => {
                warn!(page_id = %access.page_id, code = err.code, "Failed to fetch page leads");
                PageLeadsResult {
                    page_id: access.page_id.clone(),
                    leads: Vec::new(),
                    error: Some(FetchFailure::from(&err)),
                }
            }
        }
    });
    join_all(fetches).await
}
