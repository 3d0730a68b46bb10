//! LeadGraph Graph - Facebook Graph API access layer
//!
//! Provides the async pieces every route handler goes through:
//! - Exponential backoff with jitter around single request attempts
//! - Classification of Graph's error envelopes into one [`GraphError`] shape
//! - An authenticated, versioned JSON client
//! - Two-tier permission validation (account scopes, then page tasks)
//! - Concurrent lead retrieval across forms and pages
//!
//! ## Modules
//!
//! - [`retry`] - Generic backoff retrier and retry policy
//! - [`classify`] - Error envelope parsing and transient/terminal classification
//! - [`client`] - Graph API HTTP client
//! - [`permissions`] - OAuth scope and page task validation
//! - [`leads`] - Page → forms → leads retrieval with per-form error capture

pub mod classify;
pub mod client;
pub mod leads;
pub mod permissions;
pub mod retry;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Broad failure category, resolved once at the HTTP boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No response was received (connect, TLS, timeout, reset)
    Network,
    /// Non-2xx response whose body is not a Graph error envelope
    Http,
    /// Graph error envelope (`{"error": {...}}` or top-level fields)
    Graph,
    /// Response body was not the JSON shape the caller expected
    Parse,
    /// The caller lacks a required scope or page task
    Validation,
    /// The request could not be built (bad path or base URL)
    InvalidRequest,
}

impl ErrorKind {
    /// Stable label used in logs, metrics and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network_error",
            ErrorKind::Http => "http_error",
            ErrorKind::Graph => "graph_error",
            ErrorKind::Parse => "parse_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a missing capability has to be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// OAuth scope on the user's app authorization
    Account,
    /// Task on a specific Facebook Page
    Page,
}

/// Graph error codes meaning the token is invalid, expired or revoked
pub const AUTH_ERROR_CODES: &[i64] = &[102, 190, 463, 467];

/// Graph error codes for rate limiting
pub const RATE_LIMIT_CODES: &[i64] = &[4, 17, 32, 613];

/// Help article for granting page tasks
pub const PAGE_TASK_HELP_URL: &str = "https://www.facebook.com/business/help/1869651226666390";

/// A failed Graph API interaction, normalized from every upstream shape.
///
/// `transient` is decided by the classifier from `(kind, code, subcode)` and
/// never from `message`.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind} (code {code}): {message}")]
pub struct GraphError {
    pub kind: ErrorKind,
    /// Vendor error code, HTTP status for bare HTTP failures, 0 otherwise
    pub code: i64,
    pub subcode: Option<i64>,
    pub message: String,
    /// Vendor error type, e.g. `OAuthException`
    pub error_type: Option<String>,
    pub trace_id: Option<String>,
    /// HTTP status of the response, if one was received
    pub status: Option<u16>,
    pub transient: bool,
    /// Capabilities the caller is missing (`Validation` only)
    pub missing: Vec<String>,
    pub permission_level: Option<PermissionLevel>,
}

impl GraphError {
    fn bare(kind: ErrorKind, code: i64, message: impl Into<String>, transient: bool) -> Self {
        Self {
            kind,
            code,
            subcode: None,
            message: message.into(),
            error_type: None,
            trace_id: None,
            status: None,
            transient,
            missing: Vec::new(),
            permission_level: None,
        }
    }

    /// No response was received. Always transient.
    pub fn network(message: impl Into<String>) -> Self {
        Self::bare(ErrorKind::Network, 0, message, true)
    }

    /// Malformed or unexpected JSON. Always terminal.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::bare(ErrorKind::Parse, 0, message, false)
    }

    /// The request could not be built. Always terminal.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::bare(ErrorKind::InvalidRequest, 0, message, false)
    }

    /// Account-level scopes are missing.
    pub fn missing_scopes<I, S>(missing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let missing: Vec<String> = missing.into_iter().map(Into::into).collect();
        let mut err = Self::bare(
            ErrorKind::Validation,
            0,
            format!("Missing required permissions: {}", missing.join(", ")),
            false,
        );
        err.missing = missing;
        err.permission_level = Some(PermissionLevel::Account);
        err
    }

    /// A page-level task is missing.
    pub fn missing_page_task(task: impl Into<String>, page: Option<&str>) -> Self {
        let task = task.into();
        let message = match page {
            Some(page) => format!("Missing page task {task} on page {page}"),
            None => format!("No managed page grants the {task} task"),
        };
        let mut err = Self::bare(ErrorKind::Validation, 0, message, false);
        err.missing = vec![task];
        err.permission_level = Some(PermissionLevel::Page);
        err
    }

    /// The page is not among the pages the user manages.
    pub fn page_not_accessible(page: &str) -> Self {
        let mut err = Self::bare(
            ErrorKind::Validation,
            0,
            format!("Page {page} not found or no access"),
            false,
        );
        err.permission_level = Some(PermissionLevel::Page);
        err
    }

    /// Invalid, expired or revoked token.
    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Graph && AUTH_ERROR_CODES.contains(&self.code)
    }

    /// The upstream refused the call for lack of permission, or validation
    /// found a missing capability.
    pub fn is_permission(&self) -> bool {
        match self.kind {
            ErrorKind::Validation => true,
            ErrorKind::Graph => self.code == 10 || (200..=299).contains(&self.code),
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == ErrorKind::Graph && RATE_LIMIT_CODES.contains(&self.code)
    }

    /// HTTP status a route layer should answer with.
    ///
    /// 401 for auth failures, 403 for permission and validation failures,
    /// 404 for unknown objects, 429 when rate limiting survived every retry,
    /// 500 for everything else.
    pub fn http_status(&self) -> u16 {
        if self.is_auth() {
            401
        } else if self.is_permission() {
            403
        } else if self.kind == ErrorKind::Graph && self.code == 100 && self.subcode == Some(33) {
            404
        } else if self.is_rate_limited() {
            429
        } else {
            500
        }
    }

    /// What the user can do about this failure.
    pub fn remediation(&self) -> String {
        if self.is_auth() {
            return "Facebook session expired. Please sign in again.".to_string();
        }
        match (self.kind, self.permission_level) {
            (ErrorKind::Validation, Some(PermissionLevel::Account)) => format!(
                "Grant the following permissions to the app when signing in: {}",
                self.missing.join(", ")
            ),
            (ErrorKind::Validation, Some(PermissionLevel::Page)) if !self.missing.is_empty() => {
                format!(
                    "To access leads you need the \"{}\" task on this Facebook Page.\n\
                     Steps to fix:\n\
                     1. Go to Facebook Page Settings\n\
                     2. Click Tasks/Roles\n\
                     3. Find your account\n\
                     4. Click Edit\n\
                     5. Enable \"Access Lead Gen\"\n\
                     If you don't see this option, ask a Page Admin to grant it.\n\
                     Help: {}",
                    self.missing.join(", "),
                    PAGE_TASK_HELP_URL
                )
            }
            (ErrorKind::Validation, _) => {
                "Make sure you are an admin of this page.".to_string()
            }
            _ => classify::friendly_message(self.code)
                .unwrap_or("An error occurred with Facebook. Please try again.")
                .to_string(),
        }
    }
}
