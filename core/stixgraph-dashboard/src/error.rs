//! Dashboard error types.

use thiserror::Error;

/// Result type for dashboard operations.
pub type DashboardResult<T> = Result<T, DashboardError>;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The GraphQL response carried errors.
    #[error("query failed: {0}")]
    Graphql(String),

    #[error("response has no data")]
    MissingData,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
