use crate::error::GraphqlResultExt;
use crate::input::parse_entity_id;
use crate::objects::StixDomainEntity;
use crate::{actor, service};
use async_graphql::{Context, ID, Result, Subscription};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use stixgraph_bus::EditFilter;
use tracing::debug;

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Edits of one entity made by other users.
    ///
    /// Subscribing marks the caller as editing the entity. The mark is removed
    /// once when the stream ends, whether the client stopped, the connection
    /// dropped or the bus disconnected.
    async fn stix_domain_entity(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> Result<BoxStream<'static, StixDomainEntity>> {
        let service = service(ctx)?;
        let user = actor(ctx)?;
        let id = parse_entity_id(&id)?;

        let claim = service.claim_context(user, id).gql()?;
        let edits = service
            .backends()
            .bus
            .edits(service.family().edit_topic(), EditFilter::for_subscriber(id, user.id))
            .gql()?;
        debug!(%id, user = %user.id, "edit subscription opened");

        // The claim lives in the stream state: it is dropped when the stream
        // ends or when the stream itself is dropped, whichever comes first.
        let stream = stream::unfold((edits, claim), |(mut edits, claim)| async move {
            let entity = edits.next().await?;
            Some((StixDomainEntity::from_entity(entity), (edits, claim)))
        });
        Ok(stream.boxed())
    }
}
