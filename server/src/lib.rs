//! HTTP and WebSocket front of the stixgraph GraphQL API.

pub mod auth;
pub mod config;

use async_graphql::Data;
use async_graphql::http::{ALL_WEBSOCKET_PROTOCOLS, GraphiQLSource};
use async_graphql_axum::{GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket};
use auth::{AuthError, Authenticator};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{Html, Response};
use axum::routing::get;
use axum::Router;
use config::{ServerConfig, exporter_identity};
use std::sync::Arc;
use stixgraph_domain::{Backends, DomainResult, ExportQueue, ExportWorker, StixDomainEntityService};
use stixgraph_graphql::{StixSchema, build_schema};
use tracing::debug;

const GRAPHQL_PATH: &str = "/graphql";
const GRAPHQL_WS_PATH: &str = "/graphql/ws";

#[derive(Clone)]
pub struct AppState {
    pub schema: StixSchema,
    pub auth: Arc<Authenticator>,
}

/// Everything `serve` needs, wired from one configuration.
pub struct App {
    pub service: StixDomainEntityService,
    pub state: AppState,
    /// Present when the in-process exporter is enabled; spawn it on a runtime.
    pub exporter: Option<ExportWorker>,
}

impl App {
    pub fn build(config: &ServerConfig) -> DomainResult<Self> {
        let backends = Backends::open(&config.database, config.bus_capacity)?;
        let mut service = StixDomainEntityService::new(backends);
        let mut exporter = None;
        if config.exporter.enabled {
            let (queue, receiver) = ExportQueue::channel();
            service = service.with_export_queue(queue);
            exporter = Some(ExportWorker::new(
                service.clone(),
                exporter_identity(),
                receiver,
            ));
        }
        let state = AppState {
            schema: build_schema(service.clone()),
            auth: Arc::new(Authenticator::new(&config.users)),
        };
        Ok(Self {
            service,
            state,
            exporter,
        })
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(GRAPHQL_PATH, get(graphiql).post(graphql))
        .route(GRAPHQL_WS_PATH, get(graphql_ws))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

async fn graphql(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> Result<GraphQLResponse, AuthError> {
    let user = state.auth.from_headers(&headers)?;
    debug!(user = %user.id, "graphql request");
    Ok(state.schema.execute(request.into_inner().data(user)).await.into())
}

async fn graphiql() -> Html<String> {
    Html(
        GraphiQLSource::build()
            .endpoint(GRAPHQL_PATH)
            .subscription_endpoint(GRAPHQL_WS_PATH)
            .finish(),
    )
}

async fn graphql_ws(
    State(state): State<AppState>,
    protocol: GraphQLProtocol,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade
        .protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |socket| {
            let auth = state.auth.clone();
            GraphQLWebSocket::new(socket, state.schema.clone(), protocol)
                .on_connection_init(move |payload| async move {
                    let user = auth
                        .from_init_payload(&payload)
                        .map_err(|err| async_graphql::Error::new(err.to_string()))?;
                    debug!(user = %user.id, "websocket connection accepted");
                    let mut data = Data::default();
                    data.insert(user);
                    Ok(data)
                })
                .serve()
        })
}
