//! Graph API error classification
//!
//! Graph reports failures in three shapes: the documented
//! `{"error": {...}}` envelope, the same fields at the top level of the
//! body, and plain HTTP failures with no usable body. [`parse_failure`]
//! resolves a response into a [`RawFailure`] once, and [`ErrorClassifier`]
//! turns that into a [`GraphError`] with a transient/terminal verdict.
//!
//! The verdict is a lookup on `(code, subcode)`. Message text is never
//! inspected.

use std::collections::HashSet;

use leadgraph_core::config::{
    ClassificationConfig, DEFAULT_TRANSIENT_CODES, DEFAULT_TRANSIENT_SUBCODES,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{ErrorKind, GraphError};

/// Codes that are never retried, whatever the configured tables say:
/// session key invalid, permission denied, invalid token, unsupported API
/// version. The `200..=299` permission range is checked separately.
const TERMINAL_CODES: &[i64] = &[10, 102, 190, 2500];

/// Longest body excerpt kept on synthesized HTTP failures
const BODY_EXCERPT_LIMIT: usize = 256;

// ============================================================================
// Raw failure shapes
// ============================================================================

/// Error fields as Graph sends them
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VendorError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    pub code: i64,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
}

/// A failed exchange before classification
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// No response was received
    Network { message: String },
    /// Non-2xx response without a vendor envelope
    Http { status: u16, body_excerpt: String },
    /// Vendor error in either the wrapped or top-level shape
    Vendor { status: u16, error: VendorError },
}

/// Resolves a response body into one of the [`RawFailure`] shapes.
///
/// Looks for `{"error": {"code": ..}}` first, then for a numeric `code` at
/// the top level. Anything else (including non-JSON) is an HTTP failure.
pub fn parse_failure(status: u16, body: &[u8]) -> RawFailure {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        if let Some(error) = extract_vendor_error(&value) {
            return RawFailure::Vendor { status, error };
        }
    }

    let text = String::from_utf8_lossy(body);
    let body_excerpt: String = text.chars().take(BODY_EXCERPT_LIMIT).collect();
    RawFailure::Http {
        status,
        body_excerpt,
    }
}

/// Pulls vendor error fields out of a decoded body, if it carries any.
pub fn extract_vendor_error(value: &Value) -> Option<VendorError> {
    let candidate = match value.get("error") {
        Some(inner) if inner.is_object() => inner,
        _ => value,
    };
    if !candidate.get("code").map(Value::is_i64).unwrap_or(false) {
        return None;
    }
    serde_json::from_value(candidate.clone()).ok()
}

// ============================================================================
// Classifier
// ============================================================================

/// Decides transient vs terminal for Graph failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassifier {
    transient_codes: HashSet<i64>,
    transient_subcodes: HashSet<i64>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            transient_codes: DEFAULT_TRANSIENT_CODES.iter().copied().collect(),
            transient_subcodes: DEFAULT_TRANSIENT_SUBCODES.iter().copied().collect(),
        }
    }
}

impl ErrorClassifier {
    /// Creates a classifier with explicit lookup tables
    pub fn new(
        transient_codes: impl IntoIterator<Item = i64>,
        transient_subcodes: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            transient_codes: transient_codes.into_iter().collect(),
            transient_subcodes: transient_subcodes.into_iter().collect(),
        }
    }

    pub fn from_config(config: &ClassificationConfig) -> Self {
        Self::new(
            config.transient_codes.iter().copied(),
            config.transient_subcodes.iter().copied(),
        )
    }

    /// Whether a vendor `(code, subcode)` pair is worth retrying.
    pub fn is_transient_code(&self, code: i64, subcode: Option<i64>) -> bool {
        if is_terminal_code(code) {
            return false;
        }
        self.transient_codes.contains(&code)
            || subcode.is_some_and(|s| self.transient_subcodes.contains(&s))
    }

    /// Classifies a response body received with the given status.
    pub fn classify(&self, status: u16, body: &[u8]) -> GraphError {
        self.classify_raw(parse_failure(status, body))
    }

    /// Classifies a transport failure. The URL is stripped from the error
    /// since it carries the access token.
    pub fn classify_network(&self, err: reqwest::Error) -> GraphError {
        let err = err.without_url();
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        self.classify_raw(RawFailure::Network { message })
    }

    pub fn classify_raw(&self, failure: RawFailure) -> GraphError {
        match failure {
            RawFailure::Network { message } => GraphError::network(message),
            RawFailure::Http { status, .. } => GraphError {
                kind: ErrorKind::Http,
                code: i64::from(status),
                subcode: None,
                message: format!("HTTP error! status: {status}"),
                error_type: None,
                trace_id: None,
                status: Some(status),
                transient: status >= 500,
                missing: Vec::new(),
                permission_level: None,
            },
            RawFailure::Vendor { status, error } => GraphError {
                kind: ErrorKind::Graph,
                code: error.code,
                subcode: error.error_subcode,
                transient: self.is_transient_code(error.code, error.error_subcode),
                message: error
                    .message
                    .unwrap_or_else(|| "Facebook API Error".to_string()),
                error_type: error.error_type,
                trace_id: error.fbtrace_id,
                status: Some(status),
                missing: Vec::new(),
                permission_level: None,
            },
        }
    }
}

fn is_terminal_code(code: i64) -> bool {
    TERMINAL_CODES.contains(&code) || (200..=299).contains(&code)
}

/// User-facing explanation for well-known Graph error codes.
pub fn friendly_message(code: i64) -> Option<&'static str> {
    let message = match code {
        1 => "An unknown error occurred with Facebook. Please try again.",
        2 => "Facebook service is temporarily unavailable. Please try again later.",
        4 => "Too many requests to Facebook. Please wait a moment and try again.",
        17 => "User request limit reached. Please wait a moment and try again.",
        190 => "Facebook session expired. Please sign in again.",
        200 => "Permission denied. Please make sure you have granted the necessary permissions.",
        341 => "Application limit reached. Please try again later.",
        368 => "The action was blocked as potentially abusive. Please try again later.",
        803 => "Some of the requested aliases do not exist.",
        _ => return None,
    };
    Some(message)
}
