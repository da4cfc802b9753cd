//! Knowledge graph model for stixgraph.
//!
//! Defines the types every layer above storage depends on:
//! - [`Entity`] and [`Relation`], the records of the knowledge graph
//! - [`ListQuery`], filters and orderings mapped onto storage paths
//! - aggregation queries and results ([`DistributionQuery`], [`TimeSeriesQuery`], ...)
//! - [`FileMeta`] and [`ExportJob`] for import/export artifacts
//! - [`EditContext`] and [`User`]
//! - [`EntityValidator`], the per-type validation seam used by the domain layer

mod context;
mod entity;
mod file;
mod handler;
mod input;
mod page;
mod relation;
mod schema;
mod stats;
mod user;

pub use context::EditContext;
pub use entity::Entity;
pub use file::{
    ExportFormat, ExportJob, ExportScope, ExportType, FileDirection, FileMeta, FileUpload,
    JobStatus, UploadStatus,
};
pub use handler::{EntityValidator, StandardValidator};
pub use input::{EditContextInput, EditInput, EntityAddInput, RelationAddInput, RelationsAddInput};
pub use page::{Cursor, Page};
pub use relation::{Relation, RelationRef};
pub use schema::{
    EntityFilter, EntityFilterKey, EntityOrderingKey, ListQuery, OrderMode, RelationAttribute,
    StoragePath, DEFAULT_PAGE_SIZE, REL_INDEX_PREFIX,
};
pub use stats::{
    CountQuery, CountResult, DistributionEntry, DistributionQuery, Interval,
    MAX_TIME_SERIES_BUCKETS, StatsOperation, TimeField, TimeSeriesEntry, TimeSeriesQuery,
};
pub use user::{Capability, User};
