//! GraphQL resolver layer for stixgraph.
//!
//! - [`QueryRoot`]: entity reads, listings, aggregates, export files and jobs
//! - [`MutationRoot`]: creation, list exports and the namespaced
//!   `stixDomainEntityEdit(id)` object
//! - [`SubscriptionRoot`]: live edits of one entity, holding an edit-context
//!   claim while the stream is open
//!
//! The acting `User` is per-request data; the transport puts it there after
//! authentication.

mod error;
mod input;
mod mutation;
mod objects;
mod query;
mod subscription;

pub use error::{graphql_error, invalid};
pub use input::{
    EditContextInput, FieldPatchInput, FileInput, OrderingMode, RelationAddInput,
    RelationsAddInput, StatsOperation, StixDomainEntitiesFiltering, StixDomainEntitiesFilter,
    StixDomainEntitiesOrdering, StixDomainEntityAddInput, TimeSeriesField, TimeSeriesInterval,
};
pub use mutation::{MutationRoot, StixDomainEntityEditMutations};
pub use objects::*;
pub use query::QueryRoot;
pub use subscription::SubscriptionRoot;

use async_graphql::{Context, ErrorExtensions, Schema};
use stixgraph_domain::StixDomainEntityService;

pub type StixSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Builds the schema around a family service.
pub fn build_schema(service: StixDomainEntityService) -> StixSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(service)
        .finish()
}

pub(crate) fn service<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a StixDomainEntityService> {
    ctx.data::<StixDomainEntityService>()
}

/// The authenticated user of the request.
pub(crate) fn actor<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a stixgraph_model::User> {
    ctx.data::<stixgraph_model::User>().map_err(|_| {
        async_graphql::Error::new("authentication required")
            .extend_with(|_, ext| ext.set("code", "UNAUTHENTICATED"))
    })
}
