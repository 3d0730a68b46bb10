//! Integration tests for the page → forms → leads flow

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use leadgraph_core::{
    config::{PermissionsConfig, DEFAULT_REQUIRED_SCOPES},
    domain::{GraphId, ACCESS_LEAD_GEN},
};
use leadgraph_graph::{
    leads::{self, PageAccess},
    permissions::PermissionValidator,
    ErrorKind, PermissionLevel,
};

use crate::common::{self, graph_error, graph_path, page_token, user_token, TestGraph, PAGE_TOKEN};

fn id(s: &str) -> GraphId {
    GraphId::new(s).unwrap()
}

fn validator(graph: &TestGraph) -> PermissionValidator {
    PermissionValidator::new(Arc::clone(&graph.client), &PermissionsConfig::default())
        .with_reporter(Arc::clone(&graph.reporter))
}

/// Grants every scope the default configuration requires.
async fn grant_required_scopes(server: &MockServer) {
    let entries: Vec<(&str, &str)> = DEFAULT_REQUIRED_SCOPES
        .iter()
        .map(|scope| (*scope, "granted"))
        .collect();
    common::mount_permissions(server, &entries).await;
}

fn lead(lead_id: &str, email: &str) -> Value {
    json!({
        "id": lead_id,
        "created_time": "2024-03-01T10:00:00+0000",
        "field_data": [{"name": "email", "values": [email]}]
    })
}

async fn mount_lead_page(server: &MockServer, tasks: Value) {
    common::mount_accounts(
        server,
        json!([{
            "id": "101",
            "name": "Acme",
            "access_token": PAGE_TOKEN,
            "tasks": tasks
        }]),
    )
    .await;
}

async fn mount_forms(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(graph_path("101/leadgen_forms")))
        .and(query_param("access_token", PAGE_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "201", "name": "Spring signup", "status": "ACTIVE"},
                {"id": "202", "name": "Archived", "status": "ARCHIVED"}
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_one_form_failure_keeps_other_leads() {
    let graph = common::setup_graph_mock().await;
    grant_required_scopes(&graph.server).await;
    mount_lead_page(&graph.server, json!(["ADVERTISE", ACCESS_LEAD_GEN])).await;
    mount_forms(&graph.server).await;

    Mock::given(method("GET"))
        .and(path(graph_path("201/leads")))
        .and(query_param("access_token", PAGE_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [lead("301", "a@example.com"), lead("302", "b@example.com")]
        })))
        .expect(1)
        .mount(&graph.server)
        .await;
    Mock::given(method("GET"))
        .and(path(graph_path("202/leads")))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(graph_error(100, None, "Unsupported get request")),
        )
        .expect(1)
        .mount(&graph.server)
        .await;

    let result = leads::fetch_page_leads(&validator(&graph), &user_token(), &id("101"))
        .await
        .unwrap();

    assert_eq!(result.page_name, "Acme");
    assert_eq!(result.forms.len(), 2);
    assert_eq!(result.total_leads(), 2);

    let ok = &result.forms[0];
    assert_eq!(ok.form_id, id("201"));
    assert!(ok.error.is_none());
    assert_eq!(ok.leads[1].field("email"), Some("b@example.com"));

    let failed: Vec<_> = result.failed_forms().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].form_id, id("202"));
    let failure = failed[0].error.as_ref().unwrap();
    assert_eq!(failure.code, 100);
    assert!(!failure.transient);
}

#[tokio::test]
async fn test_middle_form_failure_keeps_order() {
    let graph = common::setup_graph_mock().await;
    grant_required_scopes(&graph.server).await;
    mount_lead_page(&graph.server, json!([ACCESS_LEAD_GEN])).await;
    Mock::given(method("GET"))
        .and(path(graph_path("101/leadgen_forms")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "201", "name": "First"},
                {"id": "202", "name": "Second"},
                {"id": "203", "name": "Third"}
            ]
        })))
        .mount(&graph.server)
        .await;
    Mock::given(method("GET"))
        .and(path(graph_path("201/leads")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [lead("301", "a@example.com")]
        })))
        .mount(&graph.server)
        .await;
    Mock::given(method("GET"))
        .and(path(graph_path("202/leads")))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(graph_error(100, None, "Unsupported get request")),
        )
        .expect(1)
        .mount(&graph.server)
        .await;
    Mock::given(method("GET"))
        .and(path(graph_path("203/leads")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [lead("303", "c@example.com"), lead("304", "d@example.com")]
        })))
        .mount(&graph.server)
        .await;

    let result = leads::fetch_page_leads(&validator(&graph), &user_token(), &id("101"))
        .await
        .unwrap();

    let order: Vec<_> = result.forms.iter().map(|f| f.form_id.as_str()).collect();
    assert_eq!(order, vec!["201", "202", "203"]);

    assert!(result.forms[0].error.is_none());
    assert_eq!(result.forms[0].leads.len(), 1);
    assert!(result.forms[1].leads.is_empty());
    assert_eq!(result.forms[1].error.as_ref().unwrap().code, 100);
    assert!(result.forms[2].error.is_none());
    assert_eq!(result.forms[2].leads[1].id, id("304"));
    assert_eq!(result.total_leads(), 3);
}

#[tokio::test]
async fn test_missing_scopes_stop_before_pages_are_read() {
    let graph = common::setup_graph_mock().await;
    common::mount_permissions(&graph.server, &[("pages_show_list", "granted")]).await;
    Mock::given(method("GET"))
        .and(path(graph_path("me/accounts")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "101",
                "name": "Acme",
                "access_token": PAGE_TOKEN,
                "tasks": [ACCESS_LEAD_GEN]
            }]
        })))
        .expect(0)
        .mount(&graph.server)
        .await;
    for resource in ["101/leadgen_forms", "201/leads"] {
        Mock::given(method("GET"))
            .and(path(graph_path(resource)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .expect(0)
            .mount(&graph.server)
            .await;
    }

    let validator = validator(&graph);
    let err = leads::fetch_page_leads(&validator, &user_token(), &id("101"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.permission_level, Some(PermissionLevel::Account));
    assert_eq!(
        err.missing,
        vec!["leads_retrieval", "pages_manage_metadata", "pages_read_engagement"]
    );
    assert!(!err.missing.contains(&"pages_show_list".to_string()));

    let err = leads::fetch_form_leads(&validator, &user_token(), &id("101"), &id("201"))
        .await
        .unwrap_err();
    assert!(err.missing.contains(&"leads_retrieval".to_string()));

    let reports = graph.reporter.queued();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.kind == "missing_permissions"));
    assert_eq!(reports[0].context["details"]["level"], json!("account"));
    assert_eq!(reports[0].context["details"]["granted"], json!(["pages_show_list"]));
}

#[tokio::test]
async fn test_page_without_lead_task_is_forbidden() {
    let graph = common::setup_graph_mock().await;
    grant_required_scopes(&graph.server).await;
    mount_lead_page(&graph.server, json!(["ADVERTISE"])).await;
    Mock::given(method("GET"))
        .and(path(graph_path("101/leadgen_forms")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(0)
        .mount(&graph.server)
        .await;

    let err = leads::fetch_page_leads(&validator(&graph), &user_token(), &id("101"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.missing, vec![ACCESS_LEAD_GEN.to_string()]);
    assert_eq!(err.http_status(), 403);
    assert!(err.remediation().contains("Access Lead Gen"));
}

#[tokio::test]
async fn test_unknown_page_is_not_accessible() {
    let graph = common::setup_graph_mock().await;
    grant_required_scopes(&graph.server).await;
    mount_lead_page(&graph.server, json!([ACCESS_LEAD_GEN])).await;

    let err = leads::fetch_page_leads(&validator(&graph), &user_token(), &id("999"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(err.message.contains("999"));
    assert_eq!(err.http_status(), 403);
}

#[tokio::test]
async fn test_fetch_single_form() {
    let graph = common::setup_graph_mock().await;
    grant_required_scopes(&graph.server).await;
    mount_lead_page(&graph.server, json!([ACCESS_LEAD_GEN])).await;
    Mock::given(method("GET"))
        .and(path(graph_path("201/leads")))
        .and(query_param("access_token", PAGE_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [lead("301", "a@example.com")]
        })))
        .expect(1)
        .mount(&graph.server)
        .await;

    let leads = leads::fetch_form_leads(&validator(&graph), &user_token(), &id("101"), &id("201"))
        .await
        .unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].id, id("301"));
}

#[tokio::test]
async fn test_fetch_leads_for_pages_mixed_outcomes() {
    let graph = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path(graph_path("101/leads")))
        .and(query_param("access_token", PAGE_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [lead("301", "a@example.com")]
        })))
        .mount(&graph.server)
        .await;
    Mock::given(method("GET"))
        .and(path(graph_path("102/leads")))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(graph_error(200, None, "Requires leads_retrieval")),
        )
        .expect(1)
        .mount(&graph.server)
        .await;

    let pages = leads::pair_page_tokens(
        vec![id("101"), id("102")],
        vec![page_token(), user_token()],
    )
    .unwrap();
    let results = leads::fetch_leads_for_pages(&graph.client, &pages).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].page_id, id("101"));
    assert_eq!(results[0].leads.len(), 1);
    assert!(results[0].error.is_none());

    let failure = results[1].error.as_ref().unwrap();
    assert_eq!(failure.code, 200);
    assert_eq!(failure.status, 403);
    assert!(results[1].leads.is_empty());
}

#[tokio::test]
async fn test_fetch_leads_for_no_pages() {
    let graph = common::setup_graph_mock().await;
    let pages: Vec<PageAccess> = Vec::new();
    assert!(leads::fetch_leads_for_pages(&graph.client, &pages).await.is_empty());
}
