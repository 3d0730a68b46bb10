//! Shared test helpers for Graph API integration tests
//!
//! Provides a wiremock server standing in for graph.facebook.com and a
//! GraphClient pointed at it, with a fast retry policy and an in-memory
//! error report sink.

use std::{sync::Arc, time::Duration};

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use leadgraph_core::domain::AccessToken;
use leadgraph_graph::{client::GraphClient, retry::RetryPolicy, GraphError};
use leadgraph_telemetry::{ErrorReporter, MemorySink};

pub const USER_TOKEN: &str = "EAAuserToken1234567890";
pub const PAGE_TOKEN: &str = "EAApageToken0987654321";
pub const API_VERSION: &str = "v22.0";

pub struct TestGraph {
    pub server: MockServer,
    pub client: Arc<GraphClient>,
    pub reporter: Arc<ErrorReporter>,
    pub sink: Arc<MemorySink>,
}

/// Three attempts, millisecond backoff.
pub fn fast_policy() -> RetryPolicy<GraphError> {
    RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20), 2.0).unwrap()
}

/// Starts a mock Graph API and a client wired to it.
pub async fn setup_graph_mock() -> TestGraph {
    let server = MockServer::start().await;
    let sink = Arc::new(MemorySink::new());
    let reporter = Arc::new(ErrorReporter::new(sink.clone()));

    let client = GraphClient::new()
        .with_base_url(server.uri())
        .with_api_version(API_VERSION)
        .with_policy(fast_policy())
        .with_reporter(Arc::clone(&reporter));

    TestGraph {
        server,
        client: Arc::new(client),
        reporter,
        sink,
    }
}

pub fn user_token() -> AccessToken {
    AccessToken::new(USER_TOKEN).unwrap()
}

pub fn page_token() -> AccessToken {
    AccessToken::new(PAGE_TOKEN).unwrap()
}

/// Versioned path as the client requests it.
pub fn graph_path(resource: &str) -> String {
    format!("/{API_VERSION}/{resource}")
}

/// A Graph error envelope.
pub fn graph_error(code: i64, subcode: Option<i64>, message: &str) -> Value {
    let mut error = json!({
        "message": message,
        "type": "OAuthException",
        "code": code,
        "fbtrace_id": "TRACE123"
    });
    if let Some(subcode) = subcode {
        error["error_subcode"] = json!(subcode);
    }
    json!({ "error": error })
}

/// Mounts `GET me/accounts` for the user token.
pub async fn mount_accounts(server: &MockServer, pages: Value) {
    Mock::given(method("GET"))
        .and(path(graph_path("me/accounts")))
        .and(query_param("access_token", USER_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": pages })))
        .mount(server)
        .await;
}

/// Mounts `GET me/permissions` with the given `(scope, status)` entries.
pub async fn mount_permissions(server: &MockServer, entries: &[(&str, &str)]) {
    let data: Vec<Value> = entries
        .iter()
        .map(|(permission, status)| json!({ "permission": permission, "status": status }))
        .collect();

    Mock::given(method("GET"))
        .and(path(graph_path("me/permissions")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
        .mount(server)
        .await;
}
