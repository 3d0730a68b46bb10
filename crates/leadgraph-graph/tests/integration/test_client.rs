//! Integration tests for GraphClient retry, classification and reporting

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use leadgraph_core::domain::UserProfile;
use leadgraph_graph::{client::GraphRequest, ErrorKind};

use crate::common::{self, graph_error, graph_path, user_token, USER_TOKEN};

#[tokio::test]
async fn test_transient_error_then_success() {
    let graph = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(graph_path("me")))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(graph_error(4, None, "Application request limit reached")),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&graph.server)
        .await;
    Mock::given(method("GET"))
        .and(path(graph_path("me")))
        .and(query_param("access_token", USER_TOKEN))
        .and(query_param("fields", "id,name"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1001",
            "name": "Test User"
        })))
        .expect(1)
        .mount(&graph.server)
        .await;

    let me: UserProfile = graph
        .client
        .fetch(&GraphRequest::get("me").fields(["id", "name"]), &user_token())
        .await
        .expect("fetch should succeed after one retry");
    assert_eq!(me.name, "Test User");

    let reports = graph.reporter.queued();
    assert_eq!(reports.len(), 1, "the failed attempt is reported once");
    let report = &reports[0];
    assert_eq!(report.kind, "graph_error");
    assert_eq!(report.error_code, Some(4));
    assert_eq!(report.context["path"], json!("me"));
    assert_eq!(report.context["params"], json!(["fields"]));
    assert_eq!(report.context["attempt"], json!(1));
    assert_eq!(report.context["transient"], json!(true));
}

#[tokio::test]
async fn test_expired_token_is_not_retried() {
    let graph = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(graph_path("me")))
        .respond_with(ResponseTemplate::new(400).set_body_json(graph_error(
            190,
            Some(463),
            "Error validating access token: Session has expired",
        )))
        .expect(1)
        .mount(&graph.server)
        .await;

    let err = graph
        .client
        .get_me(&user_token())
        .await
        .expect_err("expired token must fail");

    assert_eq!(err.kind, ErrorKind::Graph);
    assert_eq!(err.code, 190);
    assert_eq!(err.subcode, Some(463));
    assert_eq!(err.trace_id.as_deref(), Some("TRACE123"));
    assert!(!err.transient);
    assert_eq!(err.http_status(), 401);
    assert_eq!(graph.reporter.len(), 1);
}

#[tokio::test]
async fn test_server_errors_exhaust_attempts() {
    let graph = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(graph_path("me")))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>Service Unavailable</html>"))
        .expect(3)
        .mount(&graph.server)
        .await;

    let err = graph.client.get_me(&user_token()).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Http);
    assert_eq!(err.code, 503);
    assert!(err.transient);
    assert_eq!(err.http_status(), 500);

    let attempts: Vec<Value> = graph
        .reporter
        .queued()
        .iter()
        .map(|r| r.context["attempt"].clone())
        .collect();
    assert_eq!(attempts, vec![json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn test_client_error_without_envelope_is_terminal() {
    let graph = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(graph_path("me")))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .expect(1)
        .mount(&graph.server)
        .await;

    let err = graph.client.get_me(&user_token()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Http);
    assert_eq!(err.code, 404);
    assert!(!err.transient);
}

#[tokio::test]
async fn test_error_envelope_in_success_response_is_classified() {
    let graph = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(graph_path("me")))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_error(200, None, "Permissions error")))
        .expect(1)
        .mount(&graph.server)
        .await;

    let err = graph.client.get_me(&user_token()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Graph);
    assert_eq!(err.code, 200);
    assert_eq!(err.http_status(), 403);
}

#[tokio::test]
async fn test_malformed_json_is_parse_error() {
    let graph = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(graph_path("me")))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .expect(1)
        .mount(&graph.server)
        .await;

    let err = graph.client.get_me(&user_token()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse);
    assert!(!err.transient);
}

#[tokio::test]
async fn test_fetch_data_recovers_after_two_server_errors() {
    let graph = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(graph_path("me/settings")))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&graph.server)
        .await;
    Mock::given(method("GET"))
        .and(path(graph_path("me/settings")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "id": "1" } })))
        .expect(1)
        .mount(&graph.server)
        .await;

    let data: Value = graph
        .client
        .fetch_data(&GraphRequest::get("me/settings"), &user_token())
        .await
        .expect("third attempt should succeed");
    assert_eq!(data, json!({ "id": "1" }));

    let requests = graph.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    let attempts: Vec<Value> = graph
        .reporter
        .queued()
        .iter()
        .map(|r| r.context["attempt"].clone())
        .collect();
    assert_eq!(attempts, vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn test_fetch_data_requires_data_member() {
    let graph = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(graph_path("me/permissions")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "summary": {} })))
        .mount(&graph.server)
        .await;

    let err = graph
        .client
        .fetch_data::<Vec<Value>>(&GraphRequest::get("me/permissions"), &user_token())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse);
}

#[tokio::test]
async fn test_fetch_all_follows_cursors() {
    let graph = common::setup_graph_mock().await;
    let next = format!(
        "{}{}?access_token={}&limit=1&after=CURSOR2",
        graph.server.uri(),
        graph_path("me/accounts"),
        USER_TOKEN
    );

    Mock::given(method("GET"))
        .and(path(graph_path("me/accounts")))
        .and(query_param_is_missing("after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "101", "name": "First"}],
            "paging": {"cursors": {"after": "CURSOR2"}, "next": next}
        })))
        .expect(1)
        .mount(&graph.server)
        .await;
    Mock::given(method("GET"))
        .and(path(graph_path("me/accounts")))
        .and(query_param("after", "CURSOR2"))
        .and(query_param("access_token", USER_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "102", "name": "Second"}],
            "paging": {"cursors": {"before": "CURSOR2"}}
        })))
        .expect(1)
        .mount(&graph.server)
        .await;

    let pages = graph.client.get_pages(&user_token()).await.unwrap();
    let names: Vec<&str> = pages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["First", "Second"]);
}

#[tokio::test]
async fn test_fetch_all_stops_at_page_cap() {
    let graph = common::setup_graph_mock().await;
    let client = leadgraph_graph::client::GraphClient::new()
        .with_base_url(graph.server.uri())
        .with_policy(common::fast_policy())
        .with_max_pages(1);
    let next = format!("{}{}?after=MORE", graph.server.uri(), graph_path("me/accounts"));

    Mock::given(method("GET"))
        .and(path(graph_path("me/accounts")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "101", "name": "Only"}],
            "paging": {"next": next}
        })))
        .expect(1)
        .mount(&graph.server)
        .await;

    let pages = client.get_pages(&user_token()).await.unwrap();
    assert_eq!(pages.len(), 1);
}

#[tokio::test]
async fn test_reports_never_contain_token() {
    let graph = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(graph_path("me")))
        .respond_with(ResponseTemplate::new(400).set_body_json(graph_error(
            100,
            None,
            &format!("Invalid parameter in request ?access_token={USER_TOKEN}"),
        )))
        .mount(&graph.server)
        .await;

    let _ = graph.client.get_me(&user_token()).await.unwrap_err();
    graph.reporter.flush().await.unwrap();

    let delivered = serde_json::to_string(&graph.sink.reports()).unwrap();
    assert!(!delivered.contains(USER_TOKEN));
    assert!(delivered.contains("access_token=[REDACTED]"));
}

#[tokio::test]
async fn test_post_sends_params() {
    let graph = common::setup_graph_mock().await;

    Mock::given(method("POST"))
        .and(path(graph_path("101/subscribed_apps")))
        .and(query_param("subscribed_fields", "leadgen"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&graph.server)
        .await;

    let body: Value = graph
        .client
        .post(
            "101/subscribed_apps",
            &common::page_token(),
            &[("subscribed_fields", "leadgen")],
        )
        .await
        .unwrap();
    assert_eq!(body["success"], json!(true));
}
