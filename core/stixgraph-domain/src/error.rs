//! Error types for the domain layer.

use stixgraph_bus::BusError;
use stixgraph_model::Capability;
use stixgraph_storage::StorageError;
use thiserror::Error;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error)]
pub enum DomainError {
    /// The input was rejected.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The actor lacks a capability.
    #[error("forbidden: missing capability {0:?}")]
    Forbidden(Capability),

    /// A record the operation needs does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("pub/sub error: {0}")]
    Bus(#[from] BusError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An export artifact could not be rendered.
    #[error("export failed: {0}")]
    Export(String),
}

impl DomainError {
    /// Stable code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "VALIDATION",
            DomainError::Forbidden(_) => "FORBIDDEN",
            DomainError::NotFound(_) => "NOT_FOUND",
            DomainError::Storage(StorageError::NotFound(_)) => "NOT_FOUND",
            DomainError::Storage(StorageError::InvalidData(_)) => "VALIDATION",
            DomainError::Storage(_)
            | DomainError::Bus(_)
            | DomainError::Serialization(_)
            | DomainError::Export(_) => "INTERNAL",
        }
    }
}
