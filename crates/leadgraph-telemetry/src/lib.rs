//! LeadGraph Telemetry - Error reporting and observability
//!
//! Provides:
//! - `ErrorReporter`: Bounded, sanitized queue of error reports with periodic flushing
//! - `ReportSink`: Destinations for flushed batches (HTTP, tracing, in-memory)
//! - `sanitize`: Credential redaction for messages and context maps
//! - `install_panic_reporter`: Panic hook that records unhandled panics
//! - `MetricsRegistry`: Prometheus counters for Graph requests and reports
//! - `ReportCollector`: HTTP endpoint receiving report batches and serving metrics

pub mod crash_report;
pub mod error_report;
pub mod metrics;
pub mod sanitize;
pub mod server;
pub mod sink;

pub use crash_report::install_panic_reporter;
pub use error_report::{ErrorContext, ErrorReport, ErrorReporter};
pub use metrics::MetricsRegistry;
pub use server::ReportCollector;
pub use sink::{HttpSink, LogSink, MemorySink, ReportError, ReportSink};
