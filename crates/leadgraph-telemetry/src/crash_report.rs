//! Unhandled panic capture
//!
//! Turns panics into `panic` error reports queued on an [`ErrorReporter`],
//! so they are delivered with the next flush.

use std::sync::Arc;

use crate::error_report::{ErrorReport, ErrorReporter};

/// Report kind used for panics
pub const PANIC_KIND: &str = "panic";

/// Builds a report from panic details.
pub fn panic_report(message: &str, location: &str, backtrace: &str) -> ErrorReport {
    let mut report = ErrorReport::new(PANIC_KIND, message).with_stack(backtrace);
    if !location.is_empty() {
        report = report.with_context_value("location", location);
    }
    report
}

/// Installs a panic hook that queues a report on `reporter`.
///
/// Chains with the existing panic hook so default behavior (stderr output)
/// is preserved.
pub fn install_panic_reporter(reporter: Arc<ErrorReporter>) {
    let previous_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();
        let backtrace = std::backtrace::Backtrace::force_capture().to_string();

        reporter.submit(panic_report(&message, &location, &backtrace));

        previous_hook(panic_info);
    }));
}
