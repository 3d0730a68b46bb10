//! Error report collector
//!
//! A small HTTP/1 server that accepts report batches from [`HttpSink`]s and
//! exposes the metrics registry for Prometheus scraping.
//!
//! - `POST /api/error-reporting` with `{"errors": [...]}`
//! - `GET /metrics`
//!
//! [`HttpSink`]: crate::sink::HttpSink

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    body::{Bytes, Incoming},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{error_report::ErrorReport, metrics::MetricsRegistry};

/// Path accepting report batches
pub const ERROR_REPORTING_PATH: &str = "/api/error-reporting";

/// Reports kept in memory by default
pub const DEFAULT_RETAINED_REPORTS: usize = 500;

/// Largest report batch body accepted by default
pub const MAX_BATCH_BYTES: usize = 1024 * 1024;

/// Body of a report submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBatch {
    pub errors: Vec<ErrorReport>,
}

struct CollectorState {
    received: Mutex<VecDeque<ErrorReport>>,
    retain: usize,
    max_batch_bytes: usize,
}

impl CollectorState {
    fn new(retain: usize, max_batch_bytes: usize) -> Self {
        Self {
            received: Mutex::new(VecDeque::new()),
            retain: retain.max(1),
            max_batch_bytes,
        }
    }

    fn accept(&self, reports: Vec<ErrorReport>) -> usize {
        let count = reports.len();
        let mut received = self.received.lock().unwrap_or_else(PoisonError::into_inner);
        for report in reports {
            let report = report.sanitized();
            info!(
                id = %report.id,
                kind = %report.kind,
                code = ?report.error_code,
                origin = %report.url,
                message = %report.message,
                "Error report received"
            );
            received.push_back(report);
        }
        let excess = received.len().saturating_sub(self.retain);
        received.drain(..excess);
        count
    }
}

/// HTTP server collecting error reports and serving metrics.
pub struct ReportCollector {
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
    state: Arc<CollectorState>,
}

impl ReportCollector {
    /// Creates a new `ReportCollector`.
    ///
    /// # Arguments
    /// * `metrics` - The shared metrics registry
    /// * `endpoint` - Address to bind, e.g. `"127.0.0.1:9464"`
    pub fn new(metrics: Arc<MetricsRegistry>, endpoint: &str) -> anyhow::Result<Self> {
        let addr: SocketAddr = endpoint.parse()?;
        Ok(Self {
            metrics,
            addr,
            state: Arc::new(CollectorState::new(DEFAULT_RETAINED_REPORTS, MAX_BATCH_BYTES)),
        })
    }

    /// Sets how many received reports are kept in memory.
    pub fn with_retention(self, retain: usize) -> Self {
        Self {
            state: Arc::new(CollectorState::new(retain, self.state.max_batch_bytes)),
            ..self
        }
    }

    /// Sets the largest batch body accepted; bigger ones get `413`.
    pub fn with_max_batch_bytes(self, max_batch_bytes: usize) -> Self {
        Self {
            state: Arc::new(CollectorState::new(self.state.retain, max_batch_bytes)),
            ..self
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Reports received so far, oldest first.
    pub fn received(&self) -> Vec<ErrorReport> {
        self.state
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Binds the configured address and serves until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "Report collector listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = result?;
                    let io = TokioIo::new(stream);
                    let metrics = Arc::clone(&self.metrics);
                    let state = Arc::clone(&self.state);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let metrics = Arc::clone(&metrics);
                            let state = Arc::clone(&state);
                            async move { handle_request(req, &metrics, &state).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!(error = %e, "Collector HTTP connection error");
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    info!("Report collector shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn respond_json(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    respond(status, "application/json", body.to_string())
}

/// Handle a single HTTP request.
async fn handle_request(
    req: Request<Incoming>,
    metrics: &MetricsRegistry,
    state: &CollectorState,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => Ok(match metrics.encode() {
            Ok(body) => respond(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                body,
            ),
            Err(e) => respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                format!("Failed to encode metrics: {e}"),
            ),
        }),
        (&Method::POST, ERROR_REPORTING_PATH) => {
            let body = match Limited::new(req.into_body(), state.max_batch_bytes)
                .collect()
                .await
            {
                Ok(collected) => collected.to_bytes(),
                Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                    warn!(limit = state.max_batch_bytes, "Rejected oversized error report batch");
                    return Ok(respond_json(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        json!({ "error": "Error report batch too large" }),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read error report batch");
                    return Ok(respond_json(
                        StatusCode::BAD_REQUEST,
                        json!({ "error": "Unreadable error report batch" }),
                    ));
                }
            };
            match serde_json::from_slice::<ReportBatch>(&body) {
                Ok(batch) => {
                    let count = state.accept(batch.errors);
                    metrics.record_reports_received(count as u64);
                    Ok(respond_json(
                        StatusCode::OK,
                        json!({ "success": true, "received": count }),
                    ))
                }
                Err(e) => {
                    warn!(error = %e, "Rejected malformed error report batch");
                    Ok(respond_json(
                        StatusCode::BAD_REQUEST,
                        json!({ "error": "Invalid error report format" }),
                    ))
                }
            }
        }
        _ => Ok(respond(StatusCode::NOT_FOUND, "text/plain", "Not Found")),
    }
}
