//! Destinations for flushed error report batches

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::error_report::ErrorReport;

/// Failures while delivering a batch
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Invalid report sink URL '{url}': {reason}")]
    InvalidSinkUrl { url: String, reason: String },

    #[error("Report sink request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Report sink rejected batch with status {0}")]
    Rejected(u16),

    #[error("Report sink unavailable: {0}")]
    Unavailable(String),
}

/// Receives batches drained from the [`ErrorReporter`](crate::ErrorReporter) queue.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn send(&self, batch: &[ErrorReport]) -> Result<(), ReportError>;
}

// ============================================================================
// HttpSink
// ============================================================================

/// Upper bound on a single batch delivery, connect included
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs `{"errors": [...]}` to a collector endpoint.
pub struct HttpSink {
    client: Client,
    url: Url,
}

impl HttpSink {
    pub fn new(url: &str) -> Result<Self, ReportError> {
        Self::with_timeout(url, DEFAULT_SINK_TIMEOUT)
    }

    /// Like [`HttpSink::new`], failing any delivery that takes longer than `timeout`.
    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self, ReportError> {
        let parsed = Url::parse(url).map_err(|e| ReportError::InvalidSinkUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: parsed,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ReportSink for HttpSink {
    async fn send(&self, batch: &[ErrorReport]) -> Result<(), ReportError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({ "errors": batch }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

// ============================================================================
// LogSink
// ============================================================================

/// Emits each report through `tracing`. Used when no collector is configured.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn send(&self, batch: &[ErrorReport]) -> Result<(), ReportError> {
        for report in batch {
            warn!(
                id = %report.id,
                kind = %report.kind,
                code = ?report.error_code,
                error_type = ?report.error_type,
                trace_id = ?report.trace_id,
                message = %report.message,
                "Error report"
            );
        }
        Ok(())
    }
}

// ============================================================================
// MemorySink
// ============================================================================

/// Keeps delivered batches in memory. Can be told to fail.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<ErrorReport>>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every `send` fails and nothing is stored.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<ErrorReport>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All delivered reports, oldest first.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn send(&self, batch: &[ErrorReport]) -> Result<(), ReportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReportError::Unavailable("memory sink set to fail".into()));
        }
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch.to_vec());
        Ok(())
    }
}
