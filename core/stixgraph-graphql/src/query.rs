use crate::error::{GraphqlResultExt, invalid};
use crate::input::{
    OrderingMode, StatsOperation, StixDomainEntitiesFiltering, StixDomainEntitiesOrdering,
    TimeSeriesField, TimeSeriesInterval, parse_entity_id, parse_job_id, parse_types,
};
use crate::objects::{
    Distribution, ExportJobObject, File, Number, StixDomainEntity, StixDomainEntityConnection,
    TimeSeries,
};
use crate::{actor, service};
use async_graphql::{Context, ID, Object, Result};
use chrono::{DateTime, Utc};
use stixgraph_model::{
    CountQuery, Cursor, DEFAULT_PAGE_SIZE, DistributionQuery, EntityOrderingKey, FileDirection,
    ListQuery, TimeSeriesQuery,
};
use stixgraph_types::EntityId;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The entity, or `null` when no entity of the family has this id.
    async fn stix_domain_entity(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> Result<Option<StixDomainEntity>> {
        let Ok(id) = EntityId::parse(&id) else {
            return Ok(None);
        };
        let entity = service(ctx)?.find_by_id(actor(ctx)?, id).gql()?;
        Ok(entity.map(StixDomainEntity::from_entity))
    }

    #[allow(clippy::too_many_arguments)]
    async fn stix_domain_entities(
        &self,
        ctx: &Context<'_>,
        #[graphql(validator(minimum = 0, maximum = 5000))] first: Option<i32>,
        after: Option<String>,
        order_by: Option<StixDomainEntitiesOrdering>,
        order_mode: Option<OrderingMode>,
        search: Option<String>,
        types: Option<Vec<String>>,
        filters: Option<Vec<StixDomainEntitiesFiltering>>,
    ) -> Result<StixDomainEntityConnection> {
        let mut query = ListQuery::default().with_types(parse_types(types)?);
        query.first = first.map_or(DEFAULT_PAGE_SIZE, |n| n as usize);
        if let Some(after) = after {
            query.offset = Cursor::decode(&after)
                .ok_or_else(|| invalid(format!("invalid cursor: {after}")))?
                .offset();
        }
        query.search = search.filter(|s| !s.trim().is_empty());
        for filter in filters.unwrap_or_default() {
            query = query.with_filter(filter.key.into(), filter.values);
        }
        if let Some(order_by) = order_by {
            query = query.ordered_by(
                EntityOrderingKey::from(order_by),
                order_mode.unwrap_or_default().into(),
            );
        }
        let page = service(ctx)?.find_all(actor(ctx)?, &query).gql()?;
        Ok(page.into())
    }

    #[allow(clippy::too_many_arguments)]
    async fn stix_domain_entities_time_series(
        &self,
        ctx: &Context<'_>,
        field: TimeSeriesField,
        operation: StatsOperation,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        interval: TimeSeriesInterval,
        types: Option<Vec<String>>,
    ) -> Result<Vec<TimeSeries>> {
        let query = TimeSeriesQuery {
            types: parse_types(types)?,
            field: field.into(),
            operation: operation.into(),
            start_date,
            end_date,
            interval: interval.into(),
        };
        let entries = service(ctx)?.time_series(actor(ctx)?, &query).gql()?;
        Ok(entries.into_iter().map(TimeSeries::from).collect())
    }

    /// `total` counts every entity; `count` those created up to `endDate`.
    async fn stix_domain_entities_number(
        &self,
        ctx: &Context<'_>,
        types: Option<Vec<String>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Number> {
        let query = CountQuery {
            types: parse_types(types)?,
            end_date,
        };
        Ok(service(ctx)?.number(actor(ctx)?, &query).gql()?.into())
    }

    /// Export files of a type's list exports.
    async fn stix_domain_entities_export_files(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "type")] entity_type: String,
        first: Option<i32>,
    ) -> Result<Vec<File>> {
        let entity_type = entity_type
            .parse()
            .map_err(|err: stixgraph_types::Error| invalid(err.to_string()))?;
        let first = first.map_or(DEFAULT_PAGE_SIZE, |n| n.max(0) as usize);
        let files = service(ctx)?
            .files(actor(ctx)?, FileDirection::Export, entity_type, None, first)
            .gql()?;
        Ok(files.into_iter().map(File::from).collect())
    }

    /// Relation counts around `fromId`, grouped by `field` of the other end.
    #[allow(clippy::too_many_arguments)]
    async fn stix_relations_distribution(
        &self,
        ctx: &Context<'_>,
        from_id: Option<ID>,
        to_types: Option<Vec<String>>,
        relation_type: Option<String>,
        resolve_inferences: Option<bool>,
        resolve_relation_type: Option<String>,
        field: String,
        operation: StatsOperation,
    ) -> Result<Vec<Distribution>> {
        let query = DistributionQuery {
            from_id: from_id.as_ref().map(|id| parse_entity_id(id)).transpose()?,
            to_types: parse_types(to_types)?,
            relation_type,
            resolve_inferences: resolve_inferences.unwrap_or(false),
            resolve_relation_type,
            field,
            operation: operation.into(),
        };
        let entries = service(ctx)?
            .relation_distribution(actor(ctx)?, &query)
            .gql()?;
        Ok(entries.into_iter().map(Distribution::from).collect())
    }

    async fn export_job(&self, ctx: &Context<'_>, id: ID) -> Result<Option<ExportJobObject>> {
        let id = parse_job_id(&id)?;
        let job = service(ctx)?.export_job(actor(ctx)?, id).gql()?;
        Ok(job.map(ExportJobObject::from))
    }
}
