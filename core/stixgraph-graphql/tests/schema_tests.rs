use async_graphql::{Request, Variables};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use stixgraph_domain::{Backends, StixDomainEntityService};
use stixgraph_graphql::{StixSchema, build_schema};
use stixgraph_model::{Capability, Entity, User};
use stixgraph_types::{EntityId, EntityType};

fn admin(name: &str) -> User {
    User::new(name, format!("{name}@example.com")).with_capabilities([Capability::Admin])
}

fn setup() -> (StixSchema, StixDomainEntityService, User) {
    let service = StixDomainEntityService::new(Backends::in_memory().unwrap());
    (build_schema(service.clone()), service, admin("alice"))
}

/// Runs a request as `user` and returns the serialized response.
async fn run(schema: &StixSchema, user: &User, query: &str, variables: Value) -> Value {
    let request = Request::new(query)
        .variables(Variables::from_json(variables))
        .data(user.clone());
    serde_json::to_value(schema.execute(request).await).unwrap()
}

/// Runs a request that must succeed and returns its `data`.
async fn data(schema: &StixSchema, user: &User, query: &str, variables: Value) -> Value {
    let response = run(schema, user, query, variables).await;
    let errors = response["errors"].as_array().map_or(0, Vec::len);
    assert_eq!(errors, 0, "unexpected errors: {response}");
    response["data"].clone()
}

fn error_code(response: &Value) -> &str {
    response["errors"][0]["extensions"]["code"].as_str().unwrap()
}

const ADD: &str = r#"
    mutation Add($input: StixDomainEntityAddInput!) {
        stixDomainEntityAdd(input: $input) { id __typename name entityType }
    }
"#;

async fn add(schema: &StixSchema, user: &User, input: Value) -> String {
    let out = data(schema, user, ADD, json!({ "input": input })).await;
    out["stixDomainEntityAdd"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn missing_entity_is_null() {
    let (schema, _, user) = setup();
    let query = "query($id: ID!) { stixDomainEntity(id: $id) { id } }";

    let missing = EntityId::new().to_string();
    let out = data(&schema, &user, query, json!({ "id": missing })).await;
    assert_eq!(out, json!({ "stixDomainEntity": null }));

    let out = data(&schema, &user, query, json!({ "id": "not-an-id" })).await;
    assert_eq!(out, json!({ "stixDomainEntity": null }));
}

#[tokio::test]
async fn type_tags_resolve_through_the_table() {
    let (schema, service, user) = setup();
    let id = add(&schema, &user, json!({ "type": "threat-actor", "name": "APT28" })).await;

    let mut stray = Entity::new(EntityType::Malware, "stray", user.id);
    stray.entity_type = "x-custom-thing".into();
    service.backends().entities.save_entity(&stray).unwrap();

    let query = "query($id: ID!) { stixDomainEntity(id: $id) { __typename entityType name } }";
    let out = data(&schema, &user, query, json!({ "id": id })).await;
    assert_eq!(
        out["stixDomainEntity"],
        json!({ "__typename": "ThreatActor", "entityType": "threat-actor", "name": "APT28" })
    );

    let out = data(&schema, &user, query, json!({ "id": stray.id.to_string() })).await;
    assert_eq!(out["stixDomainEntity"]["__typename"], "Unknown");
}

#[tokio::test]
async fn listing_filters_orders_and_resumes() {
    let (schema, service, user) = setup();
    let tag = Entity::new(EntityType::Tag, "apt", user.id);
    service.backends().entities.save_entity(&tag).unwrap();
    for name in ["delta", "alpha", "charlie"] {
        add(
            &schema,
            &user,
            json!({ "type": "Malware", "name": name, "tags": [tag.id.to_string()] }),
        )
        .await;
    }
    add(&schema, &user, json!({ "type": "malware", "name": "bravo" })).await;

    let query = r#"
        query($after: String, $mode: OrderingMode) {
            stixDomainEntities(
                first: 2, after: $after, orderBy: name, orderMode: $mode,
                filters: [{ key: tags, values: [$tag] }]
            ) {
                edges { node { name } cursor }
                pageInfo { endCursor hasNextPage globalCount }
            }
        }
    "#
    .replace("$tag", &format!("\"{}\"", tag.id));

    let first = data(&schema, &user, &query, json!({ "mode": "asc" })).await;
    let page = &first["stixDomainEntities"];
    let names: Vec<&str> = page["edges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["node"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alpha", "charlie"]);
    assert_eq!(page["pageInfo"]["hasNextPage"], true);
    assert_eq!(page["pageInfo"]["globalCount"], 3);

    let after = page["pageInfo"]["endCursor"].as_str().unwrap();
    let second = data(&schema, &user, &query, json!({ "after": after, "mode": "asc" })).await;
    let edges = second["stixDomainEntities"]["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["node"]["name"], "delta");

    let desc = data(&schema, &user, &query, json!({ "mode": "desc" })).await;
    assert_eq!(
        desc["stixDomainEntities"]["edges"][0]["node"]["name"],
        "delta"
    );
}

#[tokio::test]
async fn errors_carry_a_code() {
    let (schema, _, user) = setup();
    let response = run(&schema, &user, ADD, json!({ "input": { "type": "tag", "name": "x" } })).await;
    assert_eq!(error_code(&response), "VALIDATION");

    let reader = User::new("reader", "r@example.com")
        .with_capabilities([Capability::KnowledgeRead]);
    let response = run(
        &schema,
        &reader,
        ADD,
        json!({ "input": { "type": "malware", "name": "x" } }),
    )
    .await;
    assert_eq!(error_code(&response), "FORBIDDEN");

    let anonymous = schema
        .execute(Request::new("{ stixDomainEntitiesNumber { total } }"))
        .await;
    let anonymous = serde_json::to_value(anonymous).unwrap();
    assert_eq!(error_code(&anonymous), "UNAUTHENTICATED");
}

#[tokio::test]
async fn edit_namespace_patches_and_relates() {
    let (schema, _, user) = setup();
    let actor = add(&schema, &user, json!({ "type": "intrusion-set", "name": "Sofacy" })).await;
    let tool = add(&schema, &user, json!({ "type": "tool", "name": "Responder" })).await;

    let patch = r#"
        mutation($id: ID!, $input: EditInput!) {
            stixDomainEntityEdit(id: $id) { fieldPatch(input: $input) { name data } }
        }
    "#;
    let out = data(
        &schema,
        &user,
        patch,
        json!({ "id": actor, "input": { "key": "aliases", "value": ["APT28", "Fancy Bear"] } }),
    )
    .await;
    assert_eq!(
        out["stixDomainEntityEdit"]["fieldPatch"]["data"]["aliases"],
        json!(["APT28", "Fancy Bear"])
    );

    let relate = r#"
        mutation($id: ID!, $to: ID!) {
            stixDomainEntityEdit(id: $id) {
                relationAdd(input: { toId: $to, through: "uses" }) { relationshipType toId }
            }
        }
    "#;
    let out = data(&schema, &user, relate, json!({ "id": actor, "to": tool })).await;
    assert_eq!(
        out["stixDomainEntityEdit"]["relationAdd"],
        json!({ "relationshipType": "uses", "toId": tool })
    );

    let distribution = r#"
        query($id: ID!) {
            stixRelationsDistribution(
                fromId: $id, relationType: "uses", field: "entity_type", operation: count
            ) { label value }
        }
    "#;
    let out = data(&schema, &user, distribution, json!({ "id": actor })).await;
    assert_eq!(
        out["stixRelationsDistribution"],
        json!([{ "label": "tool", "value": 1.0 }])
    );

    let delete = "mutation($id: ID!) { stixDomainEntityEdit(id: $id) { delete } }";
    let out = data(&schema, &user, delete, json!({ "id": tool })).await;
    assert_eq!(out["stixDomainEntityEdit"]["delete"], tool);
}

#[tokio::test]
async fn export_ask_then_push_shows_a_complete_file() {
    let (schema, _, user) = setup();
    let id = add(&schema, &user, json!({ "type": "campaign", "name": "Grizzly Steppe" })).await;

    let ask = r#"
        mutation($id: ID!) {
            stixDomainEntityEdit(id: $id) { exportAsk(format: "application/json") { id status } }
        }
    "#;
    let out = data(&schema, &user, ask, json!({ "id": id })).await;
    let job = &out["stixDomainEntityEdit"]["exportAsk"];
    assert_eq!(job["status"], "pending");
    let job_id = job["id"].as_str().unwrap().to_string();

    let push = r#"
        mutation($id: ID!, $job: ID!, $file: FileInput!) {
            stixDomainEntityEdit(id: $id) { exportPush(jobId: $job, file: $file) { status } }
        }
    "#;
    let file = json!({
        "name": "bundle.json",
        "mimeType": "application/json",
        "content": STANDARD.encode(br#"{"type":"bundle"}"#),
    });
    let out = data(&schema, &user, push, json!({ "id": id, "job": job_id, "file": file })).await;
    assert_eq!(out["stixDomainEntityEdit"]["exportPush"]["status"], "complete");

    let files = r#"
        query($id: ID!) {
            stixDomainEntity(id: $id) { exportFiles(first: 10) { uploadStatus size jobId } }
        }
    "#;
    let out = data(&schema, &user, files, json!({ "id": id })).await;
    assert_eq!(
        out["stixDomainEntity"]["exportFiles"],
        json!([{ "uploadStatus": "complete", "size": 17, "jobId": job_id }])
    );

    let status = "query($job: ID!) { exportJob(id: $job) { status entityId } }";
    let out = data(&schema, &user, status, json!({ "job": job_id })).await;
    assert_eq!(out["exportJob"], json!({ "status": "complete", "entityId": id }));
}

#[tokio::test]
async fn list_exports_are_listed_per_type() {
    let (schema, _, user) = setup();
    add(&schema, &user, json!({ "type": "report", "name": "r1" })).await;

    let ask = r#"
        mutation {
            stixDomainEntitiesExportAsk(type: "report", format: "csv", exportType: "simple") {
                status entityId fileId
            }
        }
    "#;
    let out = data(&schema, &user, ask, json!({})).await;
    let job = &out["stixDomainEntitiesExportAsk"];
    assert_eq!(job["entityId"], Value::Null);
    assert!(job["fileId"].as_str().unwrap().starts_with("export/report/list/"));

    let files = r#"{ stixDomainEntitiesExportFiles(type: "Report") { uploadStatus mimeType } }"#;
    let out = data(&schema, &user, files, json!({})).await;
    assert_eq!(
        out["stixDomainEntitiesExportFiles"],
        json!([{ "uploadStatus": "progress", "mimeType": "text/csv" }])
    );
}

#[tokio::test]
async fn number_counts_the_family() {
    let (schema, service, user) = setup();
    add(&schema, &user, json!({ "type": "malware", "name": "a" })).await;
    add(&schema, &user, json!({ "type": "tool", "name": "b" })).await;
    let tag = Entity::new(EntityType::Tag, "not counted", user.id);
    service.backends().entities.save_entity(&tag).unwrap();

    let out = data(
        &schema,
        &user,
        "{ all: stixDomainEntitiesNumber { total count } tools: stixDomainEntitiesNumber(types: [\"tool\"]) { total } }",
        json!({}),
    )
    .await;
    assert_eq!(out["all"], json!({ "total": 2, "count": 2 }));
    assert_eq!(out["tools"]["total"], 1);
}

#[tokio::test]
async fn nested_fields_check_the_caller_can_read() {
    let (schema, _, _) = setup();
    let writer = User::new("writer", "w@example.com")
        .with_capabilities([Capability::KnowledgeUpdate]);

    for selection in [
        "tags { id }",
        "markingDefinitions { id }",
        "createdByRef { id }",
        "relations { id }",
        "editContext { name }",
    ] {
        let mutation = format!(
            "mutation Add($input: StixDomainEntityAddInput!) {{ stixDomainEntityAdd(input: $input) {{ id {selection} }} }}"
        );
        let response = run(
            &schema,
            &writer,
            &mutation,
            json!({ "input": { "type": "malware", "name": "x" } }),
        )
        .await;
        assert_eq!(error_code(&response), "FORBIDDEN", "{selection}: {response}");
    }

    // The same entity is readable in full by someone who may read.
    let reader = User::new("reader", "r@example.com")
        .with_capabilities([Capability::KnowledgeRead, Capability::KnowledgeUpdate]);
    let mutation = "mutation Add($input: StixDomainEntityAddInput!) { stixDomainEntityAdd(input: $input) { id tags { id } relations { id } editContext { name } } }";
    let out = data(
        &schema,
        &reader,
        mutation,
        json!({ "input": { "type": "malware", "name": "y" } }),
    )
    .await;
    assert_eq!(out["stixDomainEntityAdd"]["tags"], json!([]));
}
