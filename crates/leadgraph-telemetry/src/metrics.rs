//! Prometheus metrics registry for LeadGraph
//!
//! Counts Graph API requests and retries per endpoint, and error reports by
//! kind, including the ones lost to queue overflow.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: Graph API request attempts by (endpoint, status)
    pub graph_requests_total: IntCounterVec,
    /// Counter: retried Graph API attempts by endpoint
    pub graph_retries_total: IntCounterVec,
    /// Counter: error reports queued by kind
    pub error_reports_total: IntCounterVec,
    /// Counter: error reports evicted from a full queue
    pub error_reports_dropped_total: IntCounter,
    /// Counter: error reports delivered to a sink
    pub error_reports_flushed_total: IntCounter,
    /// Counter: error reports accepted by the collector
    pub collector_reports_received_total: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("leadgraph".to_string()), None)?;

        let graph_requests_total = IntCounterVec::new(
            Opts::new("graph_requests_total", "Total Graph API request attempts"),
            &["endpoint", "status"],
        )?;
        registry.register(Box::new(graph_requests_total.clone()))?;

        let graph_retries_total = IntCounterVec::new(
            Opts::new("graph_retries_total", "Total retried Graph API attempts"),
            &["endpoint"],
        )?;
        registry.register(Box::new(graph_retries_total.clone()))?;

        let error_reports_total = IntCounterVec::new(
            Opts::new("error_reports_total", "Total error reports queued"),
            &["kind"],
        )?;
        registry.register(Box::new(error_reports_total.clone()))?;

        let error_reports_dropped_total = IntCounter::new(
            "error_reports_dropped_total",
            "Error reports evicted from a full queue",
        )?;
        registry.register(Box::new(error_reports_dropped_total.clone()))?;

        let error_reports_flushed_total = IntCounter::new(
            "error_reports_flushed_total",
            "Error reports delivered to a sink",
        )?;
        registry.register(Box::new(error_reports_flushed_total.clone()))?;

        let collector_reports_received_total = IntCounter::new(
            "collector_reports_received_total",
            "Error reports accepted by the collector",
        )?;
        registry.register(Box::new(collector_reports_received_total.clone()))?;

        Ok(Self {
            registry,
            graph_requests_total,
            graph_retries_total,
            error_reports_total,
            error_reports_dropped_total,
            error_reports_flushed_total,
            collector_reports_received_total,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record one Graph API attempt and its outcome.
    pub fn record_api_request(&self, endpoint: &str, status: &str) {
        self.graph_requests_total
            .with_label_values(&[endpoint, status])
            .inc();
    }

    pub fn record_retry(&self, endpoint: &str) {
        self.graph_retries_total.with_label_values(&[endpoint]).inc();
    }

    pub fn record_error_report(&self, kind: &str) {
        self.error_reports_total.with_label_values(&[kind]).inc();
    }

    pub fn record_reports_dropped(&self, count: u64) {
        self.error_reports_dropped_total.inc_by(count);
    }

    pub fn record_reports_flushed(&self, count: u64) {
        self.error_reports_flushed_total.inc_by(count);
    }

    pub fn record_reports_received(&self, count: u64) {
        self.collector_reports_received_total.inc_by(count);
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Collapses numeric path segments so per-object paths share one label.
///
/// `123456/leadgen_forms` becomes `{id}/leadgen_forms`.
pub fn endpoint_label(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit() || b == b'_') {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
