//! LeadGraph configuration
//!
//! One YAML file holds the Graph endpoint, the retry policy, the
//! classification tables, the required permissions and the reporting,
//! logging and metrics settings. Every section has defaults, so a file only
//! needs the keys it overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for LeadGraph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graph: GraphConfig,
    pub retry: RetryConfig,
    pub classification: ClassificationConfig,
    pub permissions: PermissionsConfig,
    pub reporting: ReportingConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Upstream Graph API location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Scheme and host of the Graph API, without a trailing slash.
    pub base_url: String,
    /// Version path segment, e.g. `v22.0`.
    pub api_version: String,
    /// Maximum number of `paging.next` pages followed by a single listing.
    pub max_pages: u32,
    /// Page size requested from list endpoints (`limit` query parameter).
    pub page_limit: u32,
}

/// Backoff policy for transient Graph failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries including the first one (`3` = 1 initial + 2 retries).
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay before jitter, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied per additional attempt.
    pub backoff_factor: f64,
}

/// Fixed tables deciding which vendor errors are worth retrying.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Vendor error codes treated as transient.
    pub transient_codes: Vec<i64>,
    /// Vendor error subcodes treated as transient regardless of code.
    pub transient_subcodes: Vec<i64>,
}

/// Capabilities the caller must hold before leads are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// OAuth scopes that must all be granted.
    pub required_scopes: Vec<String>,
    /// Page task required on at least one managed page.
    pub required_page_task: String,
}

/// Error report queue and sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Whether reports are forwarded to `sink_url`. When false they are only logged.
    pub enabled: bool,
    /// Maximum number of queued reports; the oldest are dropped beyond this.
    pub max_queue_size: usize,
    /// Seconds between background flushes.
    pub flush_interval_secs: u64,
    /// Collector endpoint receiving `POST {"errors": [...]}` batches.
    pub sink_url: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Metrics / collector server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address the report collector binds, e.g. `127.0.0.1:9464`.
    pub endpoint: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/leadgraph/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("leadgraph")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default Graph API host
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com";

/// Default Graph API version
pub const DEFAULT_GRAPH_API_VERSION: &str = "v22.0";

/// 1 unknown, 2 service, 4 app rate limit, 17 user rate limit,
/// 341 application limit, 368 temporary block
pub const DEFAULT_TRANSIENT_CODES: &[i64] = &[1, 2, 4, 17, 341, 368];

/// Request timeout and quota-exceeded subcode variants
pub const DEFAULT_TRANSIENT_SUBCODES: &[i64] = &[2108006, 1349245, 2446079, 1487390];

/// Scopes requested at sign-in that lead reads depend on
pub const DEFAULT_REQUIRED_SCOPES: &[&str] = &[
    "pages_show_list",
    "pages_read_engagement",
    "pages_manage_metadata",
    "leads_retrieval",
];

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            api_version: DEFAULT_GRAPH_API_VERSION.to_string(),
            max_pages: 10,
            page_limit: 100,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            transient_codes: DEFAULT_TRANSIENT_CODES.to_vec(),
            transient_subcodes: DEFAULT_TRANSIENT_SUBCODES.to_vec(),
        }
    }
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            required_scopes: DEFAULT_REQUIRED_SCOPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            required_page_task: crate::domain::ACCESS_LEAD_GEN.to_string(),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_queue_size: 50,
            flush_interval_secs: 60,
            sink_url: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:9464".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"retry.max_attempts"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- graph ---
        match url::Url::parse(&self.graph.base_url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            Ok(parsed) => errors.push(ValidationError {
                field: "graph.base_url".into(),
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            }),
            Err(e) => errors.push(ValidationError {
                field: "graph.base_url".into(),
                message: format!("not a valid URL: {e}"),
            }),
        }
        if self.graph.api_version.is_empty() || self.graph.api_version.contains('/') {
            errors.push(ValidationError {
                field: "graph.api_version".into(),
                message: "must be a single path segment such as 'v22.0'".into(),
            });
        }
        if self.graph.max_pages == 0 {
            errors.push(ValidationError {
                field: "graph.max_pages".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.graph.page_limit == 0 {
            errors.push(ValidationError {
                field: "graph.page_limit".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- retry ---
        if self.retry.max_attempts == 0 {
            errors.push(ValidationError {
                field: "retry.max_attempts".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.retry.initial_delay_ms == 0 {
            errors.push(ValidationError {
                field: "retry.initial_delay_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            errors.push(ValidationError {
                field: "retry.max_delay_ms".into(),
                message: format!(
                    "max_delay_ms ({}) must not be less than initial_delay_ms ({})",
                    self.retry.max_delay_ms, self.retry.initial_delay_ms
                ),
            });
        }
        if !(self.retry.backoff_factor >= 1.0 && self.retry.backoff_factor.is_finite()) {
            errors.push(ValidationError {
                field: "retry.backoff_factor".into(),
                message: "must be a finite number >= 1.0".into(),
            });
        }

        // --- permissions ---
        if self.permissions.required_page_task.trim().is_empty() {
            errors.push(ValidationError {
                field: "permissions.required_page_task".into(),
                message: "must not be empty".into(),
            });
        }
        if self
            .permissions
            .required_scopes
            .iter()
            .any(|s| s.trim().is_empty())
        {
            errors.push(ValidationError {
                field: "permissions.required_scopes".into(),
                message: "scope names must not be empty".into(),
            });
        }

        // --- reporting ---
        if self.reporting.max_queue_size == 0 {
            errors.push(ValidationError {
                field: "reporting.max_queue_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.reporting.flush_interval_secs == 0 {
            errors.push(ValidationError {
                field: "reporting.flush_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.reporting.enabled && self.reporting.sink_url.is_none() {
            errors.push(ValidationError {
                field: "reporting.sink_url".into(),
                message: "required when reporting.enabled is true".into(),
            });
        }
        if let Some(ref sink) = self.reporting.sink_url {
            if let Err(e) = url::Url::parse(sink) {
                errors.push(ValidationError {
                    field: "reporting.sink_url".into(),
                    message: format!("not a valid URL: {e}"),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- metrics ---
        if self.metrics.endpoint.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError {
                field: "metrics.endpoint".into(),
                message: format!("not a socket address: '{}'", self.metrics.endpoint),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use leadgraph_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .graph_api_version("v21.0")
///     .retry_max_attempts(5)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- graph ---

    pub fn graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.graph.base_url = url.into();
        self
    }

    pub fn graph_api_version(mut self, version: impl Into<String>) -> Self {
        self.config.graph.api_version = version.into();
        self
    }

    pub fn graph_max_pages(mut self, n: u32) -> Self {
        self.config.graph.max_pages = n;
        self
    }

    pub fn graph_page_limit(mut self, n: u32) -> Self {
        self.config.graph.page_limit = n;
        self
    }

    // --- retry ---

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_initial_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.initial_delay_ms = ms;
        self
    }

    pub fn retry_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.max_delay_ms = ms;
        self
    }

    pub fn retry_backoff_factor(mut self, factor: f64) -> Self {
        self.config.retry.backoff_factor = factor;
        self
    }

    // --- classification ---

    pub fn transient_codes(mut self, codes: Vec<i64>) -> Self {
        self.config.classification.transient_codes = codes;
        self
    }

    pub fn transient_subcodes(mut self, subcodes: Vec<i64>) -> Self {
        self.config.classification.transient_subcodes = subcodes;
        self
    }

    // --- permissions ---

    pub fn required_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.permissions.required_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn required_page_task(mut self, task: impl Into<String>) -> Self {
        self.config.permissions.required_page_task = task.into();
        self
    }

    // --- reporting ---

    pub fn reporting_enabled(mut self, enabled: bool) -> Self {
        self.config.reporting.enabled = enabled;
        self
    }

    pub fn reporting_max_queue_size(mut self, n: usize) -> Self {
        self.config.reporting.max_queue_size = n;
        self
    }

    pub fn reporting_flush_interval_secs(mut self, secs: u64) -> Self {
        self.config.reporting.flush_interval_secs = secs;
        self
    }

    pub fn reporting_sink_url(mut self, url: impl Into<String>) -> Self {
        self.config.reporting.sink_url = Some(url.into());
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- metrics ---

    pub fn metrics_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.metrics.endpoint = endpoint.into();
        self
    }

    /// Consume the builder and return the [`Config`] without validation.
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the [`Config`] or all errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
