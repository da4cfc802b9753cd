//! HTTP GraphQL client for the dashboard.

use crate::DistributionSource;
use crate::error::{DashboardError, DashboardResult};
use crate::radar::{DistributionPoint, DistributionVariables};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// The query the radar widget runs.
pub const DISTRIBUTION_QUERY: &str = r#"
query StixRelationsDistribution(
    $fromId: ID
    $toTypes: [String!]
    $relationType: String
    $resolveInferences: Boolean
    $resolveRelationType: String
    $field: String!
    $operation: StatsOperation!
) {
    stixRelationsDistribution(
        fromId: $fromId
        toTypes: $toTypes
        relationType: $relationType
        resolveInferences: $resolveInferences
        resolveRelationType: $resolveRelationType
        field: $field
        operation: $operation
    ) {
        label
        value
    }
}
"#;

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlErrorBody>,
}

#[derive(Deserialize)]
struct GraphqlErrorBody {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DistributionData {
    stix_relations_distribution: Vec<DistributionPoint>,
}

/// Talks to a stixgraph server's `/graphql` endpoint.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    endpoint: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl GraphqlClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:4000`.
    pub fn new(base_url: &str) -> DashboardResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            endpoint: format!("{}/graphql", base_url.trim_end_matches('/')),
            token: None,
            http,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Executes `query` and returns its `data`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> DashboardResult<T> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DashboardError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GraphqlResponse<T> = response.json().await?;
        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(DashboardError::Graphql(messages.join("; ")));
        }
        body.data.ok_or(DashboardError::MissingData)
    }
}

#[async_trait]
impl DistributionSource for GraphqlClient {
    async fn distribution(
        &self,
        variables: &DistributionVariables,
    ) -> DashboardResult<Vec<DistributionPoint>> {
        debug!(endpoint = %self.endpoint, from = %variables.from_id, "querying distribution");
        let variables = serde_json::to_value(variables)?;
        let data: DistributionData = self.execute(DISTRIBUTION_QUERY, variables).await?;
        Ok(data.stix_relations_distribution)
    }
}
