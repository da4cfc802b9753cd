use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use stixgraph_model::Capability;
use stixgraph_server::App;
use stixgraph_server::config::{ServerConfig, UserConfig};

const ADMIN_TOKEN: &str = "admin-token";
const READER_TOKEN: &str = "reader-token";

fn test_config(database: &str) -> ServerConfig {
    let user = |name: &str, token: &str, capabilities: Vec<Capability>| UserConfig {
        id: None,
        name: name.to_string(),
        email: format!("{name}@example.com"),
        token: token.to_string(),
        capabilities,
    };
    ServerConfig {
        database: database.to_string(),
        users: vec![
            user("admin", ADMIN_TOKEN, vec![Capability::Admin]),
            user("reader", READER_TOKEN, vec![Capability::KnowledgeRead]),
        ],
        ..ServerConfig::default()
    }
}

/// Spin up the HTTP server on an OS-assigned port, returning the base URL.
async fn spawn_test_server(config: &ServerConfig) -> String {
    let app = App::build(config).unwrap();
    let router = app.router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

async fn post_graphql(base: &str, token: &str, query: &str, variables: Value) -> Value {
    let resp = reqwest::Client::new()
        .post(format!("{base}/graphql"))
        .bearer_auth(token)
        .json(&json!({ "query": query, "variables": variables }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

const ADD: &str = r#"
    mutation($input: StixDomainEntityAddInput!) {
        stixDomainEntityAdd(input: $input) { id name }
    }
"#;

#[tokio::test]
async fn health_returns_ok() {
    let base = spawn_test_server(&test_config(":memory:")).await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn graphiql_page_is_served() {
    let base = spawn_test_server(&test_config(":memory:")).await;
    let resp = reqwest::get(format!("{base}/graphql")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.contains("text/html"));
}

#[tokio::test]
async fn requests_without_a_known_token_are_rejected() {
    let base = spawn_test_server(&test_config(":memory:")).await;
    let client = reqwest::Client::new();
    let body = json!({ "query": "{ stixDomainEntitiesNumber { total } }" });

    let resp = client
        .post(format!("{base}/graphql"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(format!("{base}/graphql"))
        .bearer_auth("nope")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["errors"][0]["message"], "unknown token");
}

#[tokio::test]
async fn add_then_read_over_http() {
    let base = spawn_test_server(&test_config(":memory:")).await;
    let added = post_graphql(
        &base,
        ADMIN_TOKEN,
        ADD,
        json!({ "input": { "type": "threat-actor", "name": "APT29" } }),
    )
    .await;
    let id = added["data"]["stixDomainEntityAdd"]["id"].as_str().unwrap();

    let read = post_graphql(
        &base,
        READER_TOKEN,
        "query($id: ID!) { stixDomainEntity(id: $id) { __typename name } }",
        json!({ "id": id }),
    )
    .await;
    assert_eq!(
        read["data"]["stixDomainEntity"],
        json!({ "__typename": "ThreatActor", "name": "APT29" })
    );
}

#[tokio::test]
async fn capabilities_follow_the_token() {
    let base = spawn_test_server(&test_config(":memory:")).await;
    let out = post_graphql(
        &base,
        READER_TOKEN,
        ADD,
        json!({ "input": { "type": "malware", "name": "x" } }),
    )
    .await;
    assert_eq!(out["errors"][0]["extensions"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn entities_survive_a_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stixgraph.db");
    let config = test_config(path.to_str().unwrap());

    let base = spawn_test_server(&config).await;
    post_graphql(
        &base,
        ADMIN_TOKEN,
        ADD,
        json!({ "input": { "type": "campaign", "name": "SolarWinds" } }),
    )
    .await;

    let base = spawn_test_server(&config).await;
    let out = post_graphql(
        &base,
        ADMIN_TOKEN,
        "{ stixDomainEntities(search: \"solar\") { edges { node { name } } } }",
        json!({}),
    )
    .await;
    assert_eq!(
        out["data"]["stixDomainEntities"]["edges"],
        json!([{ "node": { "name": "SolarWinds" } }])
    );
}

#[tokio::test]
async fn the_exporter_completes_asked_exports() {
    let config = test_config(":memory:");
    let app = App::build(&config).unwrap();
    app.exporter.unwrap().spawn();
    let router = stixgraph_server::build_router(app.state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let added = post_graphql(
        &base,
        ADMIN_TOKEN,
        ADD,
        json!({ "input": { "type": "malware", "name": "Industroyer" } }),
    )
    .await;
    let id = added["data"]["stixDomainEntityAdd"]["id"].as_str().unwrap().to_string();

    let ask = r#"
        mutation($id: ID!) {
            stixDomainEntityEdit(id: $id) { exportAsk(format: "json") { id } }
        }
    "#;
    let out = post_graphql(&base, ADMIN_TOKEN, ask, json!({ "id": id })).await;
    let job = out["data"]["stixDomainEntityEdit"]["exportAsk"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let mut status = Value::Null;
    for _ in 0..100 {
        let out = post_graphql(
            &base,
            ADMIN_TOKEN,
            "query($id: ID!) { exportJob(id: $id) { status } }",
            json!({ "id": job }),
        )
        .await;
        status = out["data"]["exportJob"]["status"].clone();
        if status == "complete" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(status, "complete");
}
