//! Permission validation
//!
//! Lead access needs two independent grants: OAuth scopes on the user's
//! authorization of the app (read from `me/permissions`) and the
//! `ACCESS_LEAD_GEN` task on at least one managed page (read from the
//! `tasks` field of `me/accounts`). Scopes are checked first; the page task
//! check only runs when every scope is present.

use std::sync::Arc;

use leadgraph_core::{
    config::PermissionsConfig,
    domain::{AccessToken, Page, PermissionEntry, PermissionSet},
};
use leadgraph_telemetry::{ErrorContext, ErrorReporter};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    client::{GraphClient, GraphRequest},
    GraphError,
};

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PermissionReport {
    /// Every required scope (and page task, when checked) is present
    Granted,
    /// Account-level scopes the user has not granted
    MissingScopes { missing: PermissionSet },
    /// No managed page grants the task
    MissingPageTask { task: String },
}

impl PermissionReport {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionReport::Granted)
    }

    /// Converts a failed check into a validation error.
    pub fn into_result(self) -> Result<(), GraphError> {
        match self {
            PermissionReport::Granted => Ok(()),
            PermissionReport::MissingScopes { missing } => {
                Err(GraphError::missing_scopes(missing.to_vec()))
            }
            PermissionReport::MissingPageTask { task } => {
                Err(GraphError::missing_page_task(task, None))
            }
        }
    }
}

/// Which checks [`PermissionValidator::validate`] performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCheck {
    /// Account scopes only
    Scopes,
    /// Account scopes, then the page task needed to read leads
    LeadAccess,
}

/// Fails with a page-level validation error unless `page` grants `task`.
pub fn require_page_task(page: &Page, task: &str) -> Result<(), GraphError> {
    if page.has_task(task) {
        Ok(())
    } else {
        Err(GraphError::missing_page_task(task, Some(page.id.as_str())))
    }
}

/// Checks a token's scopes and page tasks against configured requirements.
pub struct PermissionValidator {
    client: Arc<GraphClient>,
    required_scopes: PermissionSet,
    required_page_task: String,
    reporter: Option<Arc<ErrorReporter>>,
}

impl PermissionValidator {
    pub fn new(client: Arc<GraphClient>, config: &PermissionsConfig) -> Self {
        Self {
            client,
            required_scopes: config.required_scopes.iter().cloned().collect(),
            required_page_task: config.required_page_task.clone(),
            reporter: None,
        }
    }

    /// Sends `missing_permissions` diagnostics to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn required_scopes(&self) -> &PermissionSet {
        &self.required_scopes
    }

    pub fn required_page_task(&self) -> &str {
        &self.required_page_task
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    /// Scopes the token owner has granted.
    pub async fn granted_scopes(&self, token: &AccessToken) -> Result<PermissionSet, GraphError> {
        let entries: Vec<PermissionEntry> = self
            .client
            .fetch_data(&GraphRequest::get("me/permissions"), token)
            .await?;
        Ok(PermissionSet::granted_from(&entries))
    }

    /// Runs the requested checks in order, stopping at the first gap.
    ///
    /// Upstream failures propagate as errors; missing grants are reported
    /// as a diagnostic and returned as a [`PermissionReport`].
    pub async fn validate(
        &self,
        token: &AccessToken,
        required: &PermissionSet,
        check: PermissionCheck,
    ) -> Result<PermissionReport, GraphError> {
        let granted = self.granted_scopes(token).await?;
        let missing = granted.missing(required);
        if !missing.is_empty() {
            warn!(missing = %missing, "Missing required Facebook permissions");
            self.diagnose(
                "missing_permissions",
                "Missing required Facebook permissions",
                json!({
                    "missing": missing.to_vec(),
                    "granted": granted.to_vec(),
                    "level": "account",
                }),
            );
            return Ok(PermissionReport::MissingScopes { missing });
        }

        if check == PermissionCheck::LeadAccess {
            let request = GraphRequest::get("me/accounts")
                .fields(["id", "name", "tasks"])
                .param("limit", self.client.page_limit().to_string());
            let pages: Vec<Page> = self.client.fetch_all(&request, token).await?;
            let task = self.required_page_task.as_str();

            if !pages.iter().any(|page| page.has_task(task)) {
                warn!(task, pages = pages.len(), "No managed page grants the required task");
                self.diagnose(
                    "missing_page_task",
                    "No managed page grants the required task",
                    json!({
                        "task": task,
                        "pages": pages.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
                        "level": "page",
                    }),
                );
                return Ok(PermissionReport::MissingPageTask {
                    task: task.to_string(),
                });
            }
        }

        debug!(scopes = required.len(), ?check, "Permissions granted");
        Ok(PermissionReport::Granted)
    }

    /// Fails with a `missing_scopes` validation error unless every
    /// configured scope is granted.
    pub async fn require_scopes(&self, token: &AccessToken) -> Result<(), GraphError> {
        self.validate(token, &self.required_scopes, PermissionCheck::Scopes)
            .await?
            .into_result()
    }

    /// Configured scopes plus the configured page task.
    pub async fn validate_lead_access(
        &self,
        token: &AccessToken,
    ) -> Result<PermissionReport, GraphError> {
        self.validate(token, &self.required_scopes, PermissionCheck::LeadAccess)
            .await
    }

    /// `true` iff every scope in `required` (or the configured scopes) is
    /// granted. Upstream failures count as not granted.
    pub async fn validate_facebook_permissions(
        &self,
        token: &AccessToken,
        required: Option<&PermissionSet>,
    ) -> bool {
        let required = required.unwrap_or(&self.required_scopes);
        match self.validate(token, required, PermissionCheck::Scopes).await {
            Ok(report) => report.is_granted(),
            Err(err) => {
                info!(code = err.code, kind = %err.kind, "Permission check failed upstream");
                false
            }
        }
    }

    fn diagnose(&self, kind: &str, message: &str, details: serde_json::Value) {
        let Some(reporter) = &self.reporter else {
            return;
        };
        let mut context = ErrorContext::new();
        context.insert("details".to_string(), details);
        reporter.report_message(kind, message, context);
    }
}
