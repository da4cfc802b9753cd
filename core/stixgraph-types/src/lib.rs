//! Core type definitions for stixgraph.
//!
//! This crate defines the fundamental, storage-agnostic types shared by every
//! layer of the platform:
//! - Entity, relation, user and export job identifiers (UUID v7)
//! - The exhaustive table of stored entity type tags and their schema names
//! - Entity families and the pub/sub topics they publish on

mod entity_type;
mod ids;
mod topic;

pub use entity_type::{EntityType, ResolvedType, UNKNOWN_TYPE_NAME};
pub use ids::{EntityId, JobId, RelationId, UserId};
pub use topic::{EntityFamily, Topic, TopicKind};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),
}
