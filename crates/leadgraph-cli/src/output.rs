use leadgraph_graph::GraphError;
use serde_json::json;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
    /// A failed Graph call with its route status and remediation.
    fn graph_failure(&self, err: &GraphError);
}

/// Human-readable output with check marks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
    fn graph_failure(&self, err: &GraphError) {
        eprintln!("\u{2717} Error: {}", err.message);
        eprintln!("  Status: {} ({})", err.http_status(), err.kind);
        if let Some(trace_id) = &err.trace_id {
            eprintln!("  Trace:  {}", trace_id);
        }
        eprintln!();
        for line in err.remediation().lines() {
            eprintln!("  {}", line);
        }
    }
}

/// One JSON document per message
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", json!({"success": true, "message": message}));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", json!({"success": false, "error": message}));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", json!({"level": "warning", "message": message}));
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
    fn graph_failure(&self, err: &GraphError) {
        let value = json!({
            "success": false,
            "status": err.http_status(),
            "error": {
                "kind": err.kind,
                "code": err.code,
                "subcode": err.subcode,
                "message": err.message,
                "transient": err.transient,
                "missing": err.missing,
                "trace_id": err.trace_id,
            },
            "remediation": err.remediation(),
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}
