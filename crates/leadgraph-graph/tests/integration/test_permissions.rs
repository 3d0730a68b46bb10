//! Integration tests for PermissionValidator

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use leadgraph_core::{
    config::PermissionsConfig,
    domain::{PermissionSet, ACCESS_LEAD_GEN},
};
use leadgraph_graph::permissions::{PermissionCheck, PermissionReport, PermissionValidator};

use crate::common::{self, graph_error, graph_path, user_token, TestGraph};

fn validator(graph: &TestGraph) -> PermissionValidator {
    PermissionValidator::new(Arc::clone(&graph.client), &PermissionsConfig::default())
        .with_reporter(Arc::clone(&graph.reporter))
}

fn required(scopes: &[&str]) -> PermissionSet {
    scopes.iter().copied().collect()
}

#[tokio::test]
async fn test_missing_scope_skips_page_check() {
    let graph = common::setup_graph_mock().await;
    common::mount_permissions(
        &graph.server,
        &[
            ("pages_show_list", "granted"),
            ("pages_manage_ads", "granted"),
            ("leads_retrieval", "declined"),
        ],
    )
    .await;
    Mock::given(method("GET"))
        .and(path(graph_path("me/accounts")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(0)
        .mount(&graph.server)
        .await;

    let report = validator(&graph)
        .validate(
            &user_token(),
            &required(&["pages_show_list", "pages_manage_ads", "leads_retrieval"]),
            PermissionCheck::LeadAccess,
        )
        .await
        .unwrap();

    assert_eq!(
        report,
        PermissionReport::MissingScopes {
            missing: required(&["leads_retrieval"])
        }
    );

    let reports = graph.reporter.queued();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, "missing_permissions");
    assert_eq!(reports[0].context["details"]["missing"], json!(["leads_retrieval"]));
    assert_eq!(reports[0].context["details"]["level"], json!("account"));
}

#[tokio::test]
async fn test_no_page_with_task() {
    let graph = common::setup_graph_mock().await;
    common::mount_permissions(&graph.server, &[("leads_retrieval", "granted")]).await;
    common::mount_accounts(
        &graph.server,
        json!([
            {"id": "101", "name": "Acme", "tasks": ["ADVERTISE", "ANALYZE"]},
            {"id": "102", "name": "Beta", "tasks": ["MODERATE"]}
        ]),
    )
    .await;

    let report = validator(&graph)
        .validate(&user_token(), &required(&["leads_retrieval"]), PermissionCheck::LeadAccess)
        .await
        .unwrap();

    assert_eq!(
        report,
        PermissionReport::MissingPageTask {
            task: ACCESS_LEAD_GEN.to_string()
        }
    );
    let err = report.into_result().unwrap_err();
    assert_eq!(err.http_status(), 403);
    assert!(err.remediation().contains("Tasks"));

    let reports = graph.reporter.queued();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, "missing_page_task");
    assert_eq!(reports[0].context["details"]["pages"], json!(["101", "102"]));
}

#[tokio::test]
async fn test_all_granted() {
    let graph = common::setup_graph_mock().await;
    let config = PermissionsConfig::default();
    let entries: Vec<(&str, &str)> = config
        .required_scopes
        .iter()
        .map(|scope| (scope.as_str(), "granted"))
        .collect();
    common::mount_permissions(&graph.server, &entries).await;
    common::mount_accounts(
        &graph.server,
        json!([{"id": "101", "name": "Acme", "tasks": [ACCESS_LEAD_GEN]}]),
    )
    .await;

    let validator = validator(&graph);
    let report = validator.validate_lead_access(&user_token()).await.unwrap();
    assert!(report.is_granted());
    assert!(validator.validate_facebook_permissions(&user_token(), None).await);
    assert!(graph.reporter.is_empty());
}

#[tokio::test]
async fn test_scope_only_check_ignores_pages() {
    let graph = common::setup_graph_mock().await;
    common::mount_permissions(&graph.server, &[("leads_retrieval", "granted")]).await;
    Mock::given(method("GET"))
        .and(path(graph_path("me/accounts")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(0)
        .mount(&graph.server)
        .await;

    let report = validator(&graph)
        .validate(&user_token(), &required(&["leads_retrieval"]), PermissionCheck::Scopes)
        .await
        .unwrap();
    assert_eq!(report, PermissionReport::Granted);
}

#[tokio::test]
async fn test_upstream_failure_is_not_granted() {
    let graph = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path(graph_path("me/permissions")))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(graph_error(190, None, "Invalid OAuth access token")),
        )
        .expect(2)
        .mount(&graph.server)
        .await;

    let validator = validator(&graph);
    let err = validator
        .validate(&user_token(), &required(&["leads_retrieval"]), PermissionCheck::Scopes)
        .await
        .unwrap_err();
    assert!(err.is_auth());

    let required = required(&["leads_retrieval"]);
    assert!(
        !validator
            .validate_facebook_permissions(&user_token(), Some(&required))
            .await
    );
}
