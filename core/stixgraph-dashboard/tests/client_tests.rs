use pretty_assertions::assert_eq;
use serde_json::json;
use stixgraph_dashboard::{
    DashboardError, DistributionPoint, DistributionSource, GraphqlClient, RadarProps, RadarView,
    RadarWidget,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn props() -> RadarProps {
    RadarProps::new("e-42", "entity_type").with_entity_type("tool")
}

#[tokio::test]
async fn sends_the_query_with_token_and_variables() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "variables": { "fromId": "e-42", "toTypes": ["tool"], "operation": "count" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "stixRelationsDistribution": [
                { "label": "tool", "value": 2.0 },
                { "label": "malware", "value": 1.0 }
            ] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GraphqlClient::new(&format!("{}/", server.uri()))
        .unwrap()
        .with_token("secret");
    assert_eq!(client.endpoint(), format!("{}/graphql", server.uri()));

    let points = client.distribution(&props().variables()).await.unwrap();
    assert_eq!(
        points,
        vec![
            DistributionPoint { label: "tool".into(), value: 2.0 },
            DistributionPoint { label: "malware".into(), value: 1.0 },
        ]
    );
}

#[tokio::test]
async fn graphql_errors_become_the_error_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "forbidden", "extensions": { "code": "FORBIDDEN" } }]
        })))
        .mount(&server)
        .await;

    let client = GraphqlClient::new(&server.uri()).unwrap();
    let mut widget = RadarWidget::new(props());
    widget.load(&client).await;
    assert_eq!(
        widget.view(),
        &RadarView::Error {
            message: "query failed: forbidden".into()
        }
    );
}

#[tokio::test]
async fn http_failures_carry_the_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("missing token"))
        .mount(&server)
        .await;

    let client = GraphqlClient::new(&server.uri()).unwrap();
    let err = client.distribution(&props().variables()).await.unwrap_err();
    match err {
        DashboardError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "missing token");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn an_empty_distribution_is_empty_not_loading() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "stixRelationsDistribution": [] }
        })))
        .mount(&server)
        .await;

    let client = GraphqlClient::new(&server.uri()).unwrap();
    let mut widget = RadarWidget::new(props());
    assert!(matches!(widget.load(&client).await, RadarView::Empty { .. }));
}
