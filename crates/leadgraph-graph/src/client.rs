//! Facebook Graph API client
//!
//! Builds versioned, token-authenticated URLs, runs every request through
//! the [`BackoffRetrier`], and classifies failures into [`GraphError`]s.
//! Each failed attempt is logged, counted and reported; successful bodies
//! are decoded into the caller's type.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use leadgraph_core::domain::AccessToken;
//! use leadgraph_graph::client::{GraphClient, GraphRequest};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = GraphClient::new();
//! let token = AccessToken::new("EAAB...")?;
//! let me: serde_json::Value = client
//!     .fetch(&GraphRequest::get("me").fields(["id", "name"]), &token)
//!     .await?;
//! println!("{me}");
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use leadgraph_core::{
    config::{Config, DEFAULT_GRAPH_API_VERSION, DEFAULT_GRAPH_BASE_URL},
    domain::{AccessToken, Page, UserProfile},
};
use leadgraph_telemetry::{metrics::endpoint_label, ErrorReport, ErrorReporter, MetricsRegistry};
use reqwest::{header::ACCEPT, Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::{
    classify::ErrorClassifier,
    retry::{BackoffRetrier, RetryPolicy, RetryPolicyError},
    GraphError,
};

/// Per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on pages followed by [`GraphClient::fetch_all`]
const DEFAULT_MAX_PAGES: u32 = 10;

/// Default `limit` for list endpoints
const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Fields requested for the user's pages
pub const PAGE_FIELDS: &[&str] = &[
    "id",
    "name",
    "access_token",
    "category",
    "fan_count",
    "link",
    "verification_status",
    "picture",
    "tasks",
];

/// Fields requested for the user profile
pub const PROFILE_FIELDS: &[&str] = &["id", "name", "email", "picture"];

// ============================================================================
// Requests and envelopes
// ============================================================================

/// A Graph API call, independent of the token and attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRequest {
    method: Method,
    path: String,
    fields: Vec<String>,
    params: Vec<(String, String)>,
}

impl GraphRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into().trim_matches('/').to_string(),
            fields: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Sets the `fields` selector.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn params<'a, I>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = &'a (&'a str, &'a str)>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameter names, without values. Safe to log and report.
    pub fn param_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.params.len() + 1);
        if !self.fields.is_empty() {
            keys.push("fields".to_string());
        }
        keys.extend(self.params.iter().map(|(k, _)| k.clone()));
        keys
    }

    fn validate(&self) -> Result<(), GraphError> {
        if self.path.is_empty() {
            return Err(GraphError::invalid_request("Graph path is empty"));
        }
        if self.path.contains(['?', '#']) || self.path.split('/').any(|s| s.is_empty() || s == "..") {
            return Err(GraphError::invalid_request(format!(
                "Invalid Graph path: {}",
                self.path
            )));
        }
        Ok(())
    }

    /// The request for the page a `paging.next` URL points at.
    ///
    /// Only the query is taken from `next`; the path, host and token always
    /// come from this client.
    fn follow(&self, next: &str) -> Result<Self, GraphError> {
        let url = Url::parse(next)
            .map_err(|e| GraphError::parse(format!("Invalid paging.next URL: {e}")))?;
        let params = url
            .query_pairs()
            .filter(|(k, _)| k != "access_token")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(Self {
            method: Method::GET,
            path: self.path.clone(),
            fields: Vec::new(),
            params,
        })
    }
}

/// Cursor pair from a list response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cursors {
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

/// Pagination block of a list response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub cursors: Option<Cursors>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
}

/// One page of a list response
#[derive(Debug, Clone, Deserialize)]
pub struct GraphPage<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

// ============================================================================
// GraphClient
// ============================================================================

/// HTTP client for Facebook Graph API calls
///
/// Tokens are passed per call, so one client serves user and page tokens
/// alike. Cheap to share behind an `Arc`.
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Scheme and host, e.g. `https://graph.facebook.com`
    base_url: String,
    /// Version path segment, e.g. `v22.0`
    api_version: String,
    timeout: Duration,
    policy: RetryPolicy<GraphError>,
    classifier: ErrorClassifier,
    reporter: Option<Arc<ErrorReporter>>,
    metrics: Option<Arc<MetricsRegistry>>,
    max_pages: u32,
    page_limit: u32,
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphClient {
    /// Creates a client for the public Graph API with default retry policy.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            api_version: DEFAULT_GRAPH_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
            policy: RetryPolicy::default(),
            classifier: ErrorClassifier::default(),
            reporter: None,
            metrics: None,
            max_pages: DEFAULT_MAX_PAGES,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    /// Creates a client from the `graph`, `retry` and `classification`
    /// configuration sections.
    pub fn from_config(config: &Config) -> Result<Self, RetryPolicyError> {
        Ok(Self::new()
            .with_base_url(config.graph.base_url.clone())
            .with_api_version(config.graph.api_version.clone())
            .with_max_pages(config.graph.max_pages)
            .with_page_limit(config.graph.page_limit)
            .with_policy(RetryPolicy::from_config(&config.retry)?)
            .with_classifier(ErrorClassifier::from_config(&config.classification)))
    }

    /// Points the client at another host (useful for testing)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy<GraphError>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Reports every failed attempt to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn policy(&self) -> &RetryPolicy<GraphError> {
        &self.policy
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn reporter(&self) -> Option<&Arc<ErrorReporter>> {
        self.reporter.as_ref()
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }

    /// Builds `{base_url}/{api_version}/{path}` with the token and every
    /// parameter in the query string.
    pub fn endpoint_url(
        &self,
        request: &GraphRequest,
        token: &AccessToken,
    ) -> Result<Url, GraphError> {
        request.validate()?;
        let raw = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_version.trim_matches('/'),
            request.path
        );
        let mut url = Url::parse(&raw).map_err(|e| {
            GraphError::invalid_request(format!("Invalid Graph URL for {}: {e}", request.path))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("access_token", token.expose());
            if !request.fields.is_empty() {
                query.append_pair("fields", &request.fields.join(","));
            }
            for (key, value) in &request.params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    // ========================================================================
    // Request execution
    // ========================================================================

    /// Runs `request` with retries and returns the decoded JSON body.
    pub async fn execute(
        &self,
        request: &GraphRequest,
        token: &AccessToken,
    ) -> Result<Value, GraphError> {
        let label = endpoint_label(request.path());
        let endpoint = label.as_str();

        BackoffRetrier::execute(&self.policy, move |attempt| async move {
            if attempt > 1 {
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry(endpoint);
                }
            }

            let result = self.send_once(request, token).await;
            match &result {
                Ok(_) => {
                    debug!(path = %request.path(), attempt, "Graph request succeeded");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_api_request(endpoint, "ok");
                    }
                }
                Err(err) => self.record_failure(request, endpoint, err, attempt),
            }
            result
        })
        .await
    }

    /// One attempt: send, read the body, classify anything that isn't a
    /// clean JSON success.
    async fn send_once(
        &self,
        request: &GraphRequest,
        token: &AccessToken,
    ) -> Result<Value, GraphError> {
        let url = self.endpoint_url(request, token)?;

        let response = self
            .client
            .request(request.method.clone(), url)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classifier.classify_network(e))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.classifier.classify_network(e))?;

        if !(200..300).contains(&status) {
            return Err(self.classifier.classify(status, &body));
        }

        let value: Value = serde_json::from_slice(&body).map_err(|e| {
            let mut err = GraphError::parse(format!(
                "Invalid JSON in response from {}: {e}",
                request.path()
            ));
            err.status = Some(status);
            err
        })?;

        if value.get("error").is_some() {
            return Err(self.classifier.classify(status, &body));
        }
        Ok(value)
    }

    fn record_failure(&self, request: &GraphRequest, endpoint: &str, err: &GraphError, attempt: u32) {
        warn!(
            path = %request.path(),
            attempt,
            kind = %err.kind,
            code = err.code,
            subcode = ?err.subcode,
            transient = err.transient,
            trace_id = ?err.trace_id,
            "Graph request failed"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_api_request(endpoint, err.kind.as_str());
        }

        if let Some(reporter) = &self.reporter {
            let mut report = ErrorReport::new(err.kind.as_str(), &err.message)
                .with_error_code(err.code)
                .with_error_type(err.error_type.clone())
                .with_trace_id(err.trace_id.clone())
                .with_context_value("path", request.path())
                .with_context_value("params", request.param_keys())
                .with_context_value("attempt", attempt)
                .with_context_value("transient", err.transient);
            if let Some(subcode) = err.subcode {
                report = report.with_context_value("subcode", subcode);
            }
            if let Some(status) = err.status {
                report = report.with_context_value("status", status);
            }
            reporter.submit(report);
        }
    }

    // ========================================================================
    // Decoding helpers
    // ========================================================================

    /// Whole response body as `T`.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        request: &GraphRequest,
        token: &AccessToken,
    ) -> Result<T, GraphError> {
        let value = self.execute(request, token).await?;
        decode(request, value)
    }

    /// The envelope's `data` member as `T`. A missing `data` is a parse error.
    pub async fn fetch_data<T: DeserializeOwned>(
        &self,
        request: &GraphRequest,
        token: &AccessToken,
    ) -> Result<T, GraphError> {
        let mut value = self.execute(request, token).await?;
        match value.get_mut("data") {
            Some(data) => decode(request, data.take()),
            None => Err(GraphError::parse(format!(
                "Response from {} has no data field",
                request.path()
            ))),
        }
    }

    /// One page of a list endpoint.
    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        request: &GraphRequest,
        token: &AccessToken,
    ) -> Result<GraphPage<T>, GraphError> {
        self.fetch(request, token).await
    }

    /// Every item of a list endpoint, following `paging.next` up to the
    /// client's page cap.
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        request: &GraphRequest,
        token: &AccessToken,
    ) -> Result<Vec<T>, GraphError> {
        let mut items = Vec::new();
        let mut page: GraphPage<T> = self.fetch_page(request, token).await?;
        let mut pages = 1;

        loop {
            items.append(&mut page.data);

            let Some(next) = page.paging.take().and_then(|p| p.next) else {
                break;
            };
            if pages >= self.max_pages {
                warn!(
                    path = %request.path(),
                    pages,
                    "Page cap reached, remaining results not fetched"
                );
                break;
            }

            let next_request = request.follow(&next)?;
            page = self.fetch_page(&next_request, token).await?;
            pages += 1;
        }

        debug!(path = %request.path(), pages, items = items.len(), "Fetched list");
        Ok(items)
    }

    /// POSTs `params` to `path` and decodes the whole response.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &AccessToken,
        params: &[(&str, &str)],
    ) -> Result<T, GraphError> {
        self.fetch(&GraphRequest::post(path).params(params), token)
            .await
    }

    // ========================================================================
    // Typed resources
    // ========================================================================

    /// The token owner's profile (`me`).
    pub async fn get_me(&self, token: &AccessToken) -> Result<UserProfile, GraphError> {
        self.fetch(&GraphRequest::get("me").fields(PROFILE_FIELDS.iter().copied()), token)
            .await
    }

    /// Pages the token owner manages (`me/accounts`), with page tokens and
    /// tasks.
    pub async fn get_pages(&self, token: &AccessToken) -> Result<Vec<Page>, GraphError> {
        let request = GraphRequest::get("me/accounts")
            .fields(PAGE_FIELDS.iter().copied())
            .param("limit", self.page_limit.to_string());
        self.fetch_all(&request, token).await
    }
}

fn decode<T: DeserializeOwned>(request: &GraphRequest, value: Value) -> Result<T, GraphError> {
    serde_json::from_value(value).map_err(|e| {
        GraphError::parse(format!(
            "Unexpected response shape from {}: {e}",
            request.path()
        ))
    })
}
