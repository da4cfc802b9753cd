//! Domain layer for stixgraph.
//!
//! Every write goes through the same three steps: authorize the actor and
//! validate the input, persist through the storage adapter, then publish
//! `{ user, instance }` on the family's edit topic (or added topic for
//! creations) so live subscriptions see it.
//!
//! - [`Backends`] bundles the stores, the bus and the edit-context registry
//! - [`StixDomainEntityService`] implements the STIX domain entity family
//! - [`EditContextGuard`] is the claim a subscription holds while it is open
//! - [`ExportWorker`] turns pending export jobs into files

mod backends;
mod context;
mod error;
mod export;
mod stix_domain_entity;

pub use backends::Backends;
pub use context::{EditContextGuard, EditContextStore, InMemoryEditContexts};
pub use error::{DomainError, DomainResult};
pub use export::{ExportQueue, ExportWorker, render_export};
pub use stix_domain_entity::{ExportRequest, StixDomainEntityService};

use stixgraph_model::{Capability, User};

/// Fails with [`DomainError::Forbidden`] unless `user` holds `capability`.
pub fn authorize(user: &User, capability: Capability) -> DomainResult<()> {
    if user.can(capability) {
        Ok(())
    } else {
        tracing::warn!(user = %user.id, ?capability, "capability check failed");
        Err(DomainError::Forbidden(capability))
    }
}
