//! Non-fatal error reports and the bounded reporting queue
//!
//! Reports are sanitized on the way in, held in a drop-oldest queue and
//! handed to a [`ReportSink`] in batches, either on demand through
//! [`ErrorReporter::flush`] or periodically by the task started with
//! [`ErrorReporter::spawn_flush_task`].

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use chrono::Utc;
use leadgraph_core::config::ReportingConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    metrics::MetricsRegistry,
    sanitize::{sanitize_context, sanitize_message},
    sink::{HttpSink, LogSink, ReportError, ReportSink},
};

/// Structured context attached to a report
pub type ErrorContext = BTreeMap<String, Value>;

/// Default queue capacity
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 50;

/// Default period of the background flush task
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Origin recorded on reports when none is configured
const DEFAULT_ORIGIN: &str = "server";

/// A structured error report (non-fatal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub id: String,
    pub timestamp: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
    /// Where the report was produced
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub context: ErrorContext,
}

impl ErrorReport {
    /// Create a new error report.
    pub fn new(kind: &str, message: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            kind: kind.to_string(),
            message: message.to_string(),
            stack: None,
            chain: Vec::new(),
            url: DEFAULT_ORIGIN.to_string(),
            error_code: None,
            error_type: None,
            trace_id: None,
            context: ErrorContext::new(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Add the error's source chain.
    pub fn with_chain(mut self, chain: Vec<String>) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_error_code(mut self, code: i64) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn with_error_type(mut self, error_type: Option<String>) -> Self {
        self.error_type = error_type;
        self
    }

    pub fn with_trace_id(mut self, trace_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context.extend(context);
        self
    }

    pub fn with_context_value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    /// Redacts credentials from every free-text field and the context.
    pub fn sanitized(mut self) -> Self {
        self.message = sanitize_message(&self.message);
        self.stack = self.stack.as_deref().map(sanitize_message);
        self.chain = self.chain.iter().map(|c| sanitize_message(c)).collect();
        self.url = sanitize_message(&self.url);
        self.context = sanitize_context(&self.context);
        self
    }
}

/// Fields pulled from a raw Graph error body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacebookErrorDetails {
    pub message: Option<String>,
    pub code: Option<i64>,
    pub subcode: Option<i64>,
    pub error_type: Option<String>,
    pub trace_id: Option<String>,
}

/// Reads error fields from either `{"error": {...}}` or the top level.
pub fn extract_facebook_error(raw: &Value) -> FacebookErrorDetails {
    let source = match raw.get("error") {
        Some(inner) if inner.is_object() => inner,
        _ => raw,
    };
    let text = |key: &str| source.get(key).and_then(Value::as_str).map(str::to_string);

    FacebookErrorDetails {
        message: text("message"),
        code: source.get("code").and_then(Value::as_i64),
        subcode: source.get("error_subcode").and_then(Value::as_i64),
        error_type: text("type"),
        trace_id: text("fbtrace_id"),
    }
}

// ============================================================================
// ErrorReporter
// ============================================================================

/// Collects error reports and delivers them to a sink.
///
/// The queue lock is only held for pushes, evictions and drains, never
/// across an `.await`.
pub struct ErrorReporter {
    queue: Mutex<VecDeque<ErrorReport>>,
    capacity: usize,
    origin: String,
    sink: Arc<dyn ReportSink>,
    metrics: Option<Arc<MetricsRegistry>>,
    dropped: AtomicU64,
}

impl ErrorReporter {
    /// Creates a reporter with the default capacity.
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: DEFAULT_MAX_QUEUE_SIZE,
            origin: DEFAULT_ORIGIN.to_string(),
            sink,
            metrics: None,
            dropped: AtomicU64::new(0),
        }
    }

    /// Builds a reporter from configuration.
    ///
    /// Reports go to the configured collector when reporting is enabled and
    /// a sink URL is set, otherwise they are written to the log.
    pub fn from_config(config: &ReportingConfig) -> Result<Self, ReportError> {
        let sink: Arc<dyn ReportSink> = match (&config.sink_url, config.enabled) {
            (Some(url), true) => Arc::new(HttpSink::new(url)?),
            _ => Arc::new(LogSink),
        };
        Ok(Self::new(sink).with_capacity(config.max_queue_size))
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the origin recorded in each report's `url` field.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<ErrorReport>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sanitizes and queues a report, evicting the oldest entry when full.
    pub fn submit(&self, report: ErrorReport) {
        let mut report = report.sanitized();
        if report.url == DEFAULT_ORIGIN {
            report.url = self.origin.clone();
        }

        debug!(id = %report.id, kind = %report.kind, "Error queued");
        if let Some(metrics) = &self.metrics {
            metrics.record_error_report(&report.kind);
        }

        let evicted = {
            let mut queue = self.lock_queue();
            queue.push_back(report);
            trim_front(&mut queue, self.capacity)
        };
        self.note_dropped(evicted);
    }

    /// Report an error with its source chain.
    ///
    /// The report kind is taken from a `type` string in `context`, falling
    /// back to `unknown`.
    pub fn report(&self, error: &(dyn std::error::Error + 'static), context: ErrorContext) {
        let kind = context
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        self.submit(
            ErrorReport::new(&kind, &error.to_string())
                .with_chain(source_chain(error))
                .with_context(context),
        );
    }

    /// Report a failure that is not a Rust error value.
    pub fn report_message(&self, kind: &str, message: &str, context: ErrorContext) {
        self.submit(ErrorReport::new(kind, message).with_context(context));
    }

    /// Report a failure of one of our own endpoints or commands.
    pub fn report_api_error(
        &self,
        error: &(dyn std::error::Error + 'static),
        endpoint: &str,
        context: ErrorContext,
    ) {
        self.submit(
            ErrorReport::new("api_error", &error.to_string())
                .with_chain(source_chain(error))
                .with_context(context)
                .with_context_value("endpoint", endpoint),
        );
    }

    /// Report a raw Graph error body in either of its shapes.
    pub fn report_facebook_error(&self, raw: &Value, context: ErrorContext) {
        let details = extract_facebook_error(raw);
        let message = details
            .message
            .unwrap_or_else(|| "Facebook API Error".to_string());

        let mut report = ErrorReport::new("facebook_error", &message)
            .with_error_type(details.error_type)
            .with_trace_id(details.trace_id)
            .with_context(context);
        if let Some(code) = details.code {
            report = report.with_error_code(code);
        }
        if let Some(subcode) = details.subcode {
            report = report.with_context_value("errorSubcode", subcode);
        }
        self.submit(report);
    }

    /// Snapshot of the queued reports, oldest first.
    pub fn queued(&self) -> Vec<ErrorReport> {
        self.lock_queue().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_queue().is_empty()
    }

    /// Reports evicted because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drains the queue into the sink.
    ///
    /// On failure the batch goes back in front of anything queued meanwhile
    /// and the capacity is enforced again, dropping the oldest entries.
    pub async fn flush(&self) -> Result<usize, ReportError> {
        let batch: Vec<ErrorReport> = self.lock_queue().drain(..).collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        match self.sink.send(&batch).await {
            Ok(()) => {
                debug!(count, "Flushed error reports");
                if let Some(metrics) = &self.metrics {
                    metrics.record_reports_flushed(count as u64);
                }
                Ok(count)
            }
            Err(e) => {
                let evicted = {
                    let mut queue = self.lock_queue();
                    for report in batch.into_iter().rev() {
                        queue.push_front(report);
                    }
                    trim_front(&mut queue, self.capacity)
                };
                self.note_dropped(evicted);
                Err(e)
            }
        }
    }

    /// Starts the periodic flush task.
    ///
    /// The task flushes every `interval` until `shutdown` is cancelled, then
    /// flushes once more before exiting.
    pub fn spawn_flush_task(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let reporter = Arc::clone(self);
        let period = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = reporter.flush().await {
                            warn!(error = %e, queued = reporter.len(), "Error report flush failed");
                        }
                    }
                }
            }

            match reporter.flush().await {
                Ok(count) => info!(count, "Final error report flush"),
                Err(e) => warn!(error = %e, "Final error report flush failed"),
            }
        })
    }

    /// Records unhandled panics as `panic` reports.
    pub fn capture_unhandled(self: &Arc<Self>) {
        crate::crash_report::install_panic_reporter(Arc::clone(self));
    }

    fn note_dropped(&self, evicted: usize) {
        if evicted == 0 {
            return;
        }
        self.dropped.fetch_add(evicted as u64, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.record_reports_dropped(evicted as u64);
        }
        debug!(evicted, "Error queue full, dropped oldest reports");
    }
}

/// Pops from the front until `queue` fits `capacity`. Returns how many went.
fn trim_front(queue: &mut VecDeque<ErrorReport>, capacity: usize) -> usize {
    let excess = queue.len().saturating_sub(capacity);
    queue.drain(..excess);
    excess
}

fn source_chain(error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer(#[source] Inner);

    #[derive(Debug, thiserror::Error)]
    #[error("inner cause")]
    struct Inner;

    fn reporter_with_sink(capacity: usize) -> (Arc<ErrorReporter>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let reporter = ErrorReporter::new(sink.clone()).with_capacity(capacity);
        (Arc::new(reporter), sink)
    }

    fn messages(reports: &[ErrorReport]) -> Vec<String> {
        reports.iter().map(|r| r.message.clone()).collect()
    }

    #[test]
    fn test_error_report_creation() {
        let report = ErrorReport::new("graph_error", "boom");
        assert!(!report.id.is_empty());
        assert_eq!(report.kind, "graph_error");
        assert_eq!(report.url, "server");
        assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());
    }

    #[test]
    fn test_report_serializes_with_wire_names() {
        let report = ErrorReport::new("facebook_error", "x")
            .with_error_code(190)
            .with_trace_id(Some("T1".into()));
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["type"], json!("facebook_error"));
        assert_eq!(value["errorCode"], json!(190));
        assert_eq!(value["traceId"], json!("T1"));
        assert!(value.get("stack").is_none());
    }

    #[test]
    fn test_report_records_source_chain_and_context_type() {
        let (reporter, _) = reporter_with_sink(10);
        let mut context = ErrorContext::new();
        context.insert("type".into(), json!("sync_failure"));

        reporter.report(&Outer(Inner), context);

        let queued = reporter.queued();
        assert_eq!(queued[0].kind, "sync_failure");
        assert_eq!(queued[0].message, "outer failure");
        assert_eq!(queued[0].chain, vec!["caused by: inner cause".to_string()]);
    }

    #[test]
    fn test_report_without_type_is_unknown() {
        let (reporter, _) = reporter_with_sink(10);
        reporter.report(&Inner, ErrorContext::new());
        assert_eq!(reporter.queued()[0].kind, "unknown");
    }

    #[test]
    fn test_submit_sanitizes_message_and_context() {
        let (reporter, _) = reporter_with_sink(10);
        let mut context = ErrorContext::new();
        context.insert("accessToken".into(), json!("EAAGm0PX4ZCpsBAKZB0"));

        reporter.report_message(
            "graph_error",
            "GET /me?access_token=XYZ123 failed",
            context,
        );

        let report = &reporter.queued()[0];
        assert_eq!(report.message, "GET /me?access_token=[REDACTED] failed");
        assert_eq!(report.context["accessToken"], json!("[REDACTED]"));
    }

    #[test]
    fn test_report_api_error_sets_kind_and_endpoint() {
        let (reporter, _) = reporter_with_sink(10);
        reporter.report_api_error(&Inner, "leads", ErrorContext::new());

        let report = &reporter.queued()[0];
        assert_eq!(report.kind, "api_error");
        assert_eq!(report.context["endpoint"], json!("leads"));
    }

    #[test]
    fn test_report_facebook_error_wrapped_shape() {
        let (reporter, _) = reporter_with_sink(10);
        reporter.report_facebook_error(
            &json!({"error": {
                "message": "Invalid OAuth access token.",
                "type": "OAuthException",
                "code": 190,
                "error_subcode": 463,
                "fbtrace_id": "AbC"
            }}),
            ErrorContext::new(),
        );

        let report = &reporter.queued()[0];
        assert_eq!(report.kind, "facebook_error");
        assert_eq!(report.message, "Invalid OAuth access token.");
        assert_eq!(report.error_code, Some(190));
        assert_eq!(report.error_type.as_deref(), Some("OAuthException"));
        assert_eq!(report.trace_id.as_deref(), Some("AbC"));
        assert_eq!(report.context["errorSubcode"], json!(463));
    }

    #[test]
    fn test_report_facebook_error_top_level_shape() {
        let (reporter, _) = reporter_with_sink(10);
        reporter.report_facebook_error(&json!({"code": 4, "type": "OAuthException"}), ErrorContext::new());

        let report = &reporter.queued()[0];
        assert_eq!(report.message, "Facebook API Error");
        assert_eq!(report.error_code, Some(4));
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let (reporter, _) = reporter_with_sink(3);
        for i in 0..5 {
            reporter.report_message("test", &format!("m{i}"), ErrorContext::new());
        }

        assert_eq!(reporter.len(), 3);
        assert_eq!(messages(&reporter.queued()), vec!["m2", "m3", "m4"]);
        assert_eq!(reporter.dropped_count(), 2);
    }

    #[test]
    fn test_origin_is_applied() {
        let sink = Arc::new(MemorySink::new());
        let reporter = ErrorReporter::new(sink).with_origin("cli");
        reporter.report_message("test", "x", ErrorContext::new());
        assert_eq!(reporter.queued()[0].url, "cli");
    }

    #[tokio::test]
    async fn test_flush_delivers_and_empties_queue() {
        let (reporter, sink) = reporter_with_sink(10);
        reporter.report_message("test", "a", ErrorContext::new());
        reporter.report_message("test", "b", ErrorContext::new());

        assert_eq!(reporter.flush().await.unwrap(), 2);
        assert!(reporter.is_empty());
        assert_eq!(messages(&sink.reports()), vec!["a", "b"]);

        assert_eq!(reporter.flush().await.unwrap(), 0);
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_requeues_in_order() {
        let (reporter, sink) = reporter_with_sink(10);
        reporter.report_message("test", "a", ErrorContext::new());
        reporter.report_message("test", "b", ErrorContext::new());

        sink.set_failing(true);
        assert!(reporter.flush().await.is_err());
        reporter.report_message("test", "c", ErrorContext::new());
        assert_eq!(messages(&reporter.queued()), vec!["a", "b", "c"]);

        sink.set_failing(false);
        assert_eq!(reporter.flush().await.unwrap(), 3);
        assert_eq!(messages(&sink.reports()), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_flush_reapplies_capacity() {
        let (reporter, sink) = reporter_with_sink(2);
        reporter.report_message("test", "a", ErrorContext::new());
        reporter.report_message("test", "b", ErrorContext::new());
        sink.set_failing(true);

        assert!(reporter.flush().await.is_err());
        assert_eq!(messages(&reporter.queued()), vec!["a", "b"]);
        assert_eq!(reporter.dropped_count(), 0);

        reporter.report_message("test", "c", ErrorContext::new());
        assert_eq!(messages(&reporter.queued()), vec!["b", "c"]);
        assert_eq!(reporter.dropped_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_task_runs_periodically() {
        let (reporter, sink) = reporter_with_sink(10);
        let shutdown = CancellationToken::new();
        let handle = reporter.spawn_flush_task(Duration::from_secs(60), shutdown.clone());

        reporter.report_message("test", "periodic", ErrorContext::new());
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(messages(&sink.reports()), vec!["periodic"]);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_task_flushes_on_shutdown() {
        let (reporter, sink) = reporter_with_sink(10);
        let shutdown = CancellationToken::new();
        let handle = reporter.spawn_flush_task(Duration::from_secs(3600), shutdown.clone());

        reporter.report_message("test", "last words", ErrorContext::new());
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(messages(&sink.reports()), vec!["last words"]);
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_from_config_without_sink_uses_log() {
        let config = ReportingConfig::default();
        let reporter = ErrorReporter::from_config(&config).unwrap();
        assert_eq!(reporter.capacity(), config.max_queue_size);
    }

    #[test]
    fn test_from_config_rejects_bad_sink_url() {
        let config = ReportingConfig {
            enabled: true,
            sink_url: Some("::not a url::".into()),
            ..ReportingConfig::default()
        };
        assert!(ErrorReporter::from_config(&config).is_err());
    }

    #[test]
    fn test_extract_facebook_error_missing_fields() {
        let details = extract_facebook_error(&json!({"unexpected": true}));
        assert_eq!(details, FacebookErrorDetails::default());
    }
}
