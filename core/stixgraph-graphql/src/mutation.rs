use crate::error::{GraphqlResultExt, invalid};
use crate::input::{
    EditContextInput, FieldPatchInput, FileInput, RelationAddInput, RelationsAddInput,
    StixDomainEntityAddInput, parse_entity_id, parse_job_id,
};
use crate::objects::{ExportJobObject, File, StixDomainEntity, StixRelation};
use crate::{actor, service};
use async_graphql::{Context, ID, Json, Object, Result};
use stixgraph_domain::ExportRequest;
use stixgraph_model::{ExportFormat, ExportType, ListQuery};
use stixgraph_types::{EntityId, EntityType, RelationId};

fn export_options(format: &str, export_type: Option<&str>) -> Result<(ExportFormat, ExportType)> {
    let format = format.parse::<ExportFormat>().map_err(invalid)?;
    let export_type = export_type
        .map(str::parse::<ExportType>)
        .transpose()
        .map_err(invalid)?
        .unwrap_or_default();
    Ok((format, export_type))
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Edit operations on one entity.
    async fn stix_domain_entity_edit(&self, id: ID) -> Result<StixDomainEntityEditMutations> {
        Ok(StixDomainEntityEditMutations {
            id: parse_entity_id(&id)?,
        })
    }

    async fn stix_domain_entity_add(
        &self,
        ctx: &Context<'_>,
        input: StixDomainEntityAddInput,
    ) -> Result<StixDomainEntity> {
        let entity = service(ctx)?
            .add(actor(ctx)?, input.into_model()?)
            .gql()?;
        Ok(StixDomainEntity::from_entity(entity))
    }

    /// Asks for an export of every entity of `type` matching `listArgs`.
    async fn stix_domain_entities_export_ask(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "type")] entity_type: String,
        format: String,
        export_type: Option<String>,
        list_args: Option<Json<serde_json::Value>>,
    ) -> Result<ExportJobObject> {
        let entity_type = entity_type
            .parse::<EntityType>()
            .map_err(|err| invalid(err.to_string()))?;
        let (format, export_type) = export_options(&format, export_type.as_deref())?;
        let list_args = match list_args {
            Some(Json(args)) => {
                serde_json::from_value::<ListQuery>(args.clone())
                    .map_err(|err| invalid(format!("invalid list arguments: {err}")))?;
                args
            }
            None => serde_json::to_value(ListQuery::default())
                .map_err(|err| invalid(err.to_string()))?,
        };
        let request = ExportRequest::list(entity_type, list_args, format, export_type);
        let job = service(ctx)?.export_ask(actor(ctx)?, request).gql()?;
        Ok(job.into())
    }

    /// Delivers the file of a list export job.
    async fn stix_domain_entities_export_push(
        &self,
        ctx: &Context<'_>,
        job_id: ID,
        file: FileInput,
    ) -> Result<ExportJobObject> {
        let job = service(ctx)?
            .export_push(actor(ctx)?, parse_job_id(&job_id)?, None, file.into_upload()?)
            .gql()?;
        Ok(job.into())
    }
}

/// `stixDomainEntityEdit(id) { ... }`
pub struct StixDomainEntityEditMutations {
    id: EntityId,
}

#[Object]
impl StixDomainEntityEditMutations {
    /// Deletes the entity and its relations; returns its id.
    async fn delete(&self, ctx: &Context<'_>) -> Result<ID> {
        let id = service(ctx)?.delete(actor(ctx)?, self.id).gql()?;
        Ok(ID::from(id))
    }

    async fn field_patch(
        &self,
        ctx: &Context<'_>,
        input: FieldPatchInput,
    ) -> Result<StixDomainEntity> {
        let entity = service(ctx)?
            .edit_field(actor(ctx)?, self.id, &input.into())
            .gql()?;
        Ok(StixDomainEntity::from_entity(entity))
    }

    async fn context_patch(
        &self,
        ctx: &Context<'_>,
        input: Option<EditContextInput>,
    ) -> Result<StixDomainEntity> {
        let entity = service(ctx)?
            .set_context(actor(ctx)?, self.id, input.unwrap_or_default().into())
            .gql()?;
        Ok(StixDomainEntity::from_entity(entity))
    }

    async fn context_clean(&self, ctx: &Context<'_>) -> Result<StixDomainEntity> {
        let entity = service(ctx)?.clean_context(actor(ctx)?, self.id).gql()?;
        Ok(StixDomainEntity::from_entity(entity))
    }

    async fn relation_add(
        &self,
        ctx: &Context<'_>,
        input: RelationAddInput,
    ) -> Result<StixRelation> {
        let relation = service(ctx)?
            .add_relation(actor(ctx)?, self.id, &input.into_model()?)
            .gql()?;
        Ok(relation.into())
    }

    async fn relations_add(
        &self,
        ctx: &Context<'_>,
        input: RelationsAddInput,
    ) -> Result<StixDomainEntity> {
        let entity = service(ctx)?
            .add_relations(actor(ctx)?, self.id, &input.into_model()?)
            .gql()?;
        Ok(StixDomainEntity::from_entity(entity))
    }

    async fn relation_delete(&self, ctx: &Context<'_>, relation_id: ID) -> Result<StixDomainEntity> {
        let relation_id = RelationId::parse(&relation_id)
            .map_err(|_| invalid(format!("invalid relation id: {}", relation_id.as_str())))?;
        let entity = service(ctx)?
            .delete_relation(actor(ctx)?, self.id, relation_id)
            .gql()?;
        Ok(StixDomainEntity::from_entity(entity))
    }

    async fn import_push(&self, ctx: &Context<'_>, file: FileInput) -> Result<File> {
        let meta = service(ctx)?
            .import_push(actor(ctx)?, self.id, file.into_upload()?)
            .gql()?;
        Ok(meta.into())
    }

    /// Registers an export job for this entity. `format` is a mime type or an
    /// extension; `exportType` is `simple` (default) or `full`.
    async fn export_ask(
        &self,
        ctx: &Context<'_>,
        format: String,
        export_type: Option<String>,
    ) -> Result<ExportJobObject> {
        let (format, export_type) = export_options(&format, export_type.as_deref())?;
        let request = ExportRequest::entity(self.id, format, export_type);
        let job = service(ctx)?.export_ask(actor(ctx)?, request).gql()?;
        Ok(job.into())
    }

    /// Delivers the file of an export job of this entity.
    async fn export_push(
        &self,
        ctx: &Context<'_>,
        job_id: ID,
        file: FileInput,
    ) -> Result<ExportJobObject> {
        let job = service(ctx)?
            .export_push(
                actor(ctx)?,
                parse_job_id(&job_id)?,
                Some(self.id),
                file.into_upload()?,
            )
            .gql()?;
        Ok(job.into())
    }
}
