//! Bearer token authentication for HTTP requests and WebSocket connections.

use crate::config::UserConfig;
use axum::Json;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use std::collections::HashMap;
use stixgraph_model::User;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("unknown token")]
    UnknownToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "errors": [{ "message": self.to_string() }] }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Maps tokens to users.
#[derive(Debug, Default)]
pub struct Authenticator {
    users: HashMap<String, User>,
}

impl Authenticator {
    pub fn new(users: &[UserConfig]) -> Self {
        Self {
            users: users
                .iter()
                .map(|u| (u.token.clone(), u.to_user()))
                .collect(),
        }
    }

    pub fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.users.get(token).cloned().ok_or_else(|| {
            warn!("rejected unknown token");
            AuthError::UnknownToken
        })
    }

    /// Reads `Authorization: Bearer <token>`.
    pub fn from_headers(&self, headers: &HeaderMap) -> Result<User, AuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        self.authenticate(bearer(value).ok_or(AuthError::MissingToken)?)
    }

    /// Reads the `connection_init` payload of a WebSocket: either
    /// `{"authorization": "Bearer <token>"}` or `{"token": "<token>"}`.
    /// Key lookup ignores case, as clients disagree on it.
    pub fn from_init_payload(&self, payload: &Value) -> Result<User, AuthError> {
        let Some(fields) = payload.as_object() else {
            return Err(AuthError::MissingToken);
        };
        let field = |name: &str| {
            fields
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .and_then(|(_, value)| value.as_str())
        };
        if let Some(value) = field("authorization") {
            return self.authenticate(bearer(value).ok_or(AuthError::MissingToken)?);
        }
        field("token")
            .map(|token| self.authenticate(token))
            .unwrap_or(Err(AuthError::MissingToken))
    }
}

fn bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token)
}
