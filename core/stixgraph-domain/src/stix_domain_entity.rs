//! The STIX domain entity family: threat actors, intrusion sets, campaigns,
//! malware, reports, identities and the other SDO types.

use crate::{
    Backends, DomainError, DomainResult, EditContextGuard, ExportQueue, authorize,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use stixgraph_model::{
    Capability, CountQuery, CountResult, DistributionEntry, DistributionQuery, EditContext,
    EditContextInput, EditInput, Entity, EntityAddInput, EntityValidator, ExportFormat, ExportJob,
    ExportScope, ExportType, FileDirection, FileMeta, FileUpload, JobStatus, ListQuery, Page,
    Relation, RelationAddInput, RelationRef, RelationsAddInput, StandardValidator,
    TimeSeriesEntry, TimeSeriesQuery, UploadStatus, User,
};
use stixgraph_types::{EntityFamily, EntityId, EntityType, JobId, RelationId};
use tracing::{debug, info, warn};

/// What to export and how.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub scope: ExportScope,
    /// Required for list exports; entity exports take the entity's type.
    pub entity_type: Option<EntityType>,
    pub format: ExportFormat,
    pub export_type: ExportType,
}

impl ExportRequest {
    pub fn entity(entity_id: EntityId, format: ExportFormat, export_type: ExportType) -> Self {
        Self {
            scope: ExportScope::Entity { entity_id },
            entity_type: None,
            format,
            export_type,
        }
    }

    pub fn list(
        entity_type: EntityType,
        list_args: Value,
        format: ExportFormat,
        export_type: ExportType,
    ) -> Self {
        Self {
            scope: ExportScope::List { list_args },
            entity_type: Some(entity_type),
            format,
            export_type,
        }
    }
}

/// Domain service of the STIX domain entity family.
#[derive(Clone)]
pub struct StixDomainEntityService {
    backends: Backends,
    validator: Arc<dyn EntityValidator>,
    exports: Option<ExportQueue>,
}

impl StixDomainEntityService {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            validator: Arc::new(StandardValidator),
            exports: None,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn EntityValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Export asks are handed to this queue once registered.
    pub fn with_export_queue(mut self, queue: ExportQueue) -> Self {
        self.exports = Some(queue);
        self
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn family(&self) -> EntityFamily {
        EntityFamily::StixDomainEntity
    }

    /// Every type of the family.
    pub fn family_types() -> Vec<EntityType> {
        EntityType::all()
            .filter(|t| t.is_stix_domain_entity())
            .collect()
    }

    fn scoped_types(types: &[EntityType]) -> DomainResult<Vec<EntityType>> {
        if types.is_empty() {
            return Ok(Self::family_types());
        }
        match types.iter().find(|t| !t.is_stix_domain_entity()) {
            Some(other) => Err(DomainError::Validation(format!(
                "{other} is not a STIX domain entity type"
            ))),
            None => Ok(types.to_vec()),
        }
    }

    /// Entities with a tag this build does not know still belong here; they
    /// resolve to the `Unknown` schema type.
    fn belongs(entity: &Entity) -> bool {
        entity.kind().is_none_or(EntityType::is_stix_domain_entity)
    }

    fn get(&self, id: EntityId) -> DomainResult<Option<Entity>> {
        let Some(mut entity) = self.backends.entities.get_entity(id)? else {
            return Ok(None);
        };
        if !Self::belongs(&entity) {
            return Ok(None);
        }
        self.validator.on_after_load(&mut entity);
        Ok(Some(entity))
    }

    fn load(&self, id: EntityId) -> DomainResult<Entity> {
        self.get(id)?
            .ok_or_else(|| DomainError::NotFound(format!("stix domain entity {id}")))
    }

    fn publish_edit(&self, user: &User, entity: &Entity) -> DomainResult<()> {
        self.backends
            .bus
            .publish_edit(self.family().edit_topic(), user.id, entity.clone())?;
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────

    /// The entity, or `None` when no entity of this family has that id.
    pub fn find_by_id(&self, user: &User, id: EntityId) -> DomainResult<Option<Entity>> {
        authorize(user, Capability::KnowledgeRead)?;
        debug!(%id, "find stix domain entity");
        self.get(id)
    }

    pub fn find_all(&self, user: &User, query: &ListQuery) -> DomainResult<Page<Entity>> {
        authorize(user, Capability::KnowledgeRead)?;
        let mut query = query.clone();
        query.types = Self::scoped_types(&query.types)?;
        let mut page = self.backends.entities.list_entities(&query)?;
        for entity in &mut page.items {
            self.validator.on_after_load(entity);
        }
        Ok(page)
    }

    pub fn time_series(
        &self,
        user: &User,
        query: &TimeSeriesQuery,
    ) -> DomainResult<Vec<TimeSeriesEntry>> {
        authorize(user, Capability::KnowledgeRead)?;
        let mut query = query.clone();
        query.types = Self::scoped_types(&query.types)?;
        Ok(self.backends.entities.time_series(&query)?)
    }

    pub fn number(&self, user: &User, query: &CountQuery) -> DomainResult<CountResult> {
        authorize(user, Capability::KnowledgeRead)?;
        let mut query = query.clone();
        query.types = Self::scoped_types(&query.types)?;
        Ok(self.backends.entities.count(&query)?)
    }

    pub fn relation_distribution(
        &self,
        user: &User,
        query: &DistributionQuery,
    ) -> DomainResult<Vec<DistributionEntry>> {
        authorize(user, Capability::KnowledgeRead)?;
        Ok(self.backends.entities.relation_distribution(query)?)
    }

    pub fn tags(&self, user: &User, entity: &Entity) -> DomainResult<Vec<Entity>> {
        authorize(user, Capability::KnowledgeRead)?;
        Ok(self
            .backends
            .entities
            .targets(entity.id, RelationRef::Tagged.as_str())?)
    }

    pub fn marking_definitions(&self, user: &User, entity: &Entity) -> DomainResult<Vec<Entity>> {
        authorize(user, Capability::KnowledgeRead)?;
        Ok(self
            .backends
            .entities
            .targets(entity.id, RelationRef::ObjectMarkingRefs.as_str())?)
    }

    pub fn created_by_ref(&self, user: &User, entity: &Entity) -> DomainResult<Option<Entity>> {
        authorize(user, Capability::KnowledgeRead)?;
        Ok(self
            .backends
            .entities
            .targets(entity.id, RelationRef::CreatedByRef.as_str())?
            .into_iter()
            .next())
    }

    pub fn relations(&self, user: &User, entity_id: EntityId) -> DomainResult<Vec<Relation>> {
        authorize(user, Capability::KnowledgeRead)?;
        Ok(self.backends.entities.relations_of(entity_id, None)?)
    }

    /// Edit contexts on `entity_id` as seen by `user`.
    pub fn editors(&self, user: &User, entity_id: EntityId) -> DomainResult<Vec<EditContext>> {
        authorize(user, Capability::KnowledgeRead)?;
        Ok(self.edit_contexts(entity_id))
    }

    pub fn edit_contexts(&self, entity_id: EntityId) -> Vec<EditContext> {
        self.backends.contexts.list(entity_id)
    }

    /// Files of an entity, or of the type itself when `entity_id` is `None`.
    pub fn files(
        &self,
        user: &User,
        direction: FileDirection,
        entity_type: EntityType,
        entity_id: Option<EntityId>,
        first: usize,
    ) -> DomainResult<Vec<FileMeta>> {
        authorize(user, Capability::KnowledgeRead)?;
        Ok(self
            .backends
            .files
            .list(direction, entity_type, entity_id, first)?)
    }

    pub fn file_content(&self, user: &User, file_id: &str) -> DomainResult<Option<Vec<u8>>> {
        authorize(user, Capability::KnowledgeRead)?;
        Ok(self.backends.files.content(file_id)?)
    }

    pub fn export_job(&self, user: &User, id: JobId) -> DomainResult<Option<ExportJob>> {
        authorize(user, Capability::KnowledgeRead)?;
        Ok(self.backends.jobs.get(id)?)
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Validates and creates an entity with its reference relations.
    pub fn add(&self, user: &User, input: EntityAddInput) -> DomainResult<Entity> {
        authorize(user, Capability::KnowledgeUpdate)?;
        if !input.entity_type.is_stix_domain_entity() {
            return Err(DomainError::Validation(format!(
                "{} is not a STIX domain entity type",
                input.entity_type
            )));
        }

        let mut entity = Entity::new(input.entity_type, input.name.trim(), user.id);
        if let Some(stix_id) = input.stix_id.as_deref().map(str::trim) {
            if self.backends.entities.find_by_stix_id(stix_id)?.is_some() {
                return Err(DomainError::Validation(format!(
                    "stix_id {stix_id} already exists"
                )));
            }
            entity.stix_id = stix_id.to_string();
        }
        entity.description = input.description.clone().filter(|d| !d.trim().is_empty());
        if let Some(created) = input.created {
            entity.created = created;
        }
        if let Some(modified) = input.modified {
            entity.modified = modified;
        }
        entity.data = Value::Object(input.data.clone());
        self.validator
            .validate(&entity)
            .map_err(DomainError::Validation)?;

        if let Some(author) = input.created_by_ref {
            self.expect_reference(author, "createdByRef", EntityType::is_identity)?;
        }
        for marking in &input.marking_definitions {
            self.expect_reference(*marking, "markingDefinition", |t| {
                t == EntityType::MarkingDefinition
            })?;
        }
        for tag in &input.tags {
            self.expect_reference(*tag, "tag", |t| t == EntityType::Tag)?;
        }

        self.backends.entities.save_entity(&entity)?;
        let references = input
            .created_by_ref
            .iter()
            .map(|id| (RelationRef::CreatedByRef, *id))
            .chain(
                input
                    .marking_definitions
                    .iter()
                    .map(|id| (RelationRef::ObjectMarkingRefs, *id)),
            )
            .chain(input.tags.iter().map(|id| (RelationRef::Tagged, *id)));
        for (kind, target) in references {
            let relation = Relation::new(kind.as_str(), entity.id, target, user.id);
            self.backends.entities.save_relation(&relation)?;
        }

        self.backends
            .bus
            .publish_edit(self.family().added_topic(), user.id, entity.clone())?;
        info!(id = %entity.id, entity_type = %entity.entity_type, user = %user.id, "entity created");
        Ok(entity)
    }

    fn expect_reference(
        &self,
        id: EntityId,
        role: &str,
        accepts: impl Fn(EntityType) -> bool,
    ) -> DomainResult<()> {
        match self.backends.entities.get_entity(id)? {
            Some(target) if target.kind().is_some_and(&accepts) => Ok(()),
            Some(target) => Err(DomainError::Validation(format!(
                "{role} {id} has type {}",
                target.entity_type
            ))),
            None => Err(DomainError::Validation(format!("{role} {id} does not exist"))),
        }
    }

    /// Patches one field. `name`, `description`, `created` and `modified` are
    /// promoted fields; anything else is written into `data`.
    pub fn edit_field(&self, user: &User, id: EntityId, input: &EditInput) -> DomainResult<Entity> {
        authorize(user, Capability::KnowledgeUpdate)?;
        let mut entity = self.load(id)?;
        self.validator
            .validate_patch(&entity, input)
            .map_err(DomainError::Validation)?;

        let first = input.value.first().map(|v| v.trim().to_string());
        match input.key.as_str() {
            "name" => entity.name = first.unwrap_or_default(),
            "description" => entity.description = first.filter(|d| !d.is_empty()),
            key @ ("created" | "modified") => {
                let raw = first.ok_or_else(|| {
                    DomainError::Validation(format!("{key} requires a value"))
                })?;
                let at = DateTime::parse_from_rfc3339(&raw)
                    .map_err(|err| DomainError::Validation(format!("invalid {key}: {err}")))?
                    .with_timezone(&Utc);
                if key == "created" {
                    entity.created = at;
                } else {
                    entity.modified = at;
                }
            }
            key => {
                if !entity.data.is_object() {
                    entity.data = Value::Object(Map::new());
                }
                if let Some(data) = entity.data.as_object_mut() {
                    match input.stored_value() {
                        Value::Null => {
                            data.remove(key);
                        }
                        value => {
                            data.insert(key.to_string(), value);
                        }
                    }
                }
            }
        }

        let now = Utc::now();
        entity.updated_at = now;
        if input.key != "modified" {
            entity.modified = now;
        }
        self.validator
            .validate(&entity)
            .map_err(DomainError::Validation)?;
        self.backends.entities.save_entity(&entity)?;
        self.publish_edit(user, &entity)?;
        info!(%id, key = %input.key, user = %user.id, "entity field edited");
        Ok(entity)
    }

    /// Deletes the entity and its relations.
    pub fn delete(&self, user: &User, id: EntityId) -> DomainResult<EntityId> {
        authorize(user, Capability::KnowledgeDelete)?;
        self.load(id)?;
        self.backends.entities.delete_entity(id)?;
        info!(%id, user = %user.id, "entity deleted");
        Ok(id)
    }

    /// Adds one relation from the entity. Adding an existing relation returns
    /// it unchanged.
    pub fn add_relation(
        &self,
        user: &User,
        id: EntityId,
        input: &RelationAddInput,
    ) -> DomainResult<Relation> {
        authorize(user, Capability::KnowledgeUpdate)?;
        let entity = self.load(id)?;
        let relation = self.create_relation(user, &entity, input)?;
        self.publish_edit(user, &entity)?;
        Ok(relation)
    }

    /// Adds the same relation type towards several entities.
    pub fn add_relations(
        &self,
        user: &User,
        id: EntityId,
        input: &RelationsAddInput,
    ) -> DomainResult<Entity> {
        authorize(user, Capability::KnowledgeUpdate)?;
        let entity = self.load(id)?;
        let missing = self.backends.entities.missing_ids(&input.to_ids)?;
        if let Some(first) = missing.first() {
            return Err(DomainError::Validation(format!(
                "relation target {first} does not exist"
            )));
        }
        for to_id in &input.to_ids {
            let single = RelationAddInput {
                to_id: *to_id,
                through: input.through.clone(),
                first_seen: None,
                last_seen: None,
            };
            self.create_relation(user, &entity, &single)?;
        }
        self.publish_edit(user, &entity)?;
        Ok(entity)
    }

    fn create_relation(
        &self,
        user: &User,
        entity: &Entity,
        input: &RelationAddInput,
    ) -> DomainResult<Relation> {
        let through = input.through.trim();
        if through.is_empty() {
            return Err(DomainError::Validation("relation type must not be empty".into()));
        }
        if input.to_id == entity.id {
            return Err(DomainError::Validation("an entity cannot relate to itself".into()));
        }
        if let (Some(first), Some(last)) = (input.first_seen, input.last_seen) {
            if first > last {
                return Err(DomainError::Validation(
                    "first_seen must not be after last_seen".into(),
                ));
            }
        }
        if self.backends.entities.get_entity(input.to_id)?.is_none() {
            return Err(DomainError::Validation(format!(
                "relation target {} does not exist",
                input.to_id
            )));
        }
        if let Some(existing) = self
            .backends
            .entities
            .find_relation(entity.id, input.to_id, through)?
        {
            return Ok(existing);
        }

        let mut relation = Relation::new(through, entity.id, input.to_id, user.id);
        relation.first_seen = input.first_seen;
        relation.last_seen = input.last_seen;
        self.backends.entities.save_relation(&relation)?;
        info!(
            relation = %relation.id,
            from = %entity.id,
            to = %input.to_id,
            through,
            "relation added"
        );
        Ok(relation)
    }

    pub fn delete_relation(
        &self,
        user: &User,
        id: EntityId,
        relation_id: RelationId,
    ) -> DomainResult<Entity> {
        authorize(user, Capability::KnowledgeUpdate)?;
        let entity = self.load(id)?;
        let touches = self
            .backends
            .entities
            .get_relation(relation_id)?
            .is_some_and(|r| r.other_end(id).is_some());
        if !touches {
            return Err(DomainError::NotFound(format!(
                "relation {relation_id} of entity {id}"
            )));
        }
        self.backends.entities.delete_relation(relation_id)?;
        self.publish_edit(user, &entity)?;
        info!(%id, relation = %relation_id, "relation deleted");
        Ok(entity)
    }

    // ── Edit contexts ────────────────────────────────────────────

    /// Records that `user` is editing `id` and notifies the other editors.
    pub fn set_context(
        &self,
        user: &User,
        id: EntityId,
        input: EditContextInput,
    ) -> DomainResult<Entity> {
        authorize(user, Capability::KnowledgeRead)?;
        let entity = self.load(id)?;
        self.backends.contexts.set(EditContext {
            entity_id: id,
            user_id: user.id,
            user_name: user.name.clone(),
            focus_on: input.focus_on,
            updated_at: Utc::now(),
        });
        self.publish_edit(user, &entity)?;
        Ok(entity)
    }

    pub fn clean_context(&self, user: &User, id: EntityId) -> DomainResult<Entity> {
        authorize(user, Capability::KnowledgeRead)?;
        self.backends.contexts.clear(id, user.id);
        let entity = self.load(id)?;
        self.publish_edit(user, &entity)?;
        Ok(entity)
    }

    /// Claims an edit context for the lifetime of the returned guard.
    pub fn claim_context(&self, user: &User, id: EntityId) -> DomainResult<EditContextGuard> {
        authorize(user, Capability::KnowledgeRead)?;
        self.backends.contexts.claim(EditContext {
            entity_id: id,
            user_id: user.id,
            user_name: user.name.clone(),
            focus_on: None,
            updated_at: Utc::now(),
        });
        debug!(%id, user = %user.id, "edit context claimed");
        self.notify_editors(user, id);
        Ok(EditContextGuard::new(self.clone(), id, user.clone()))
    }

    /// Releases one claim of `(id, user)`. The context stays while the user
    /// holds other claims on it. Never fails; notification problems are logged.
    pub(crate) fn release_context(&self, user: &User, id: EntityId) {
        let removed = self.backends.contexts.release(id, user.id);
        debug!(%id, user = %user.id, removed, "edit context released");
        self.notify_editors(user, id);
    }

    fn notify_editors(&self, user: &User, id: EntityId) {
        match self.get(id) {
            Ok(Some(entity)) => {
                if let Err(err) = self.publish_edit(user, &entity) {
                    warn!(%id, error = %err, "edit context notification not published");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%id, error = %err, "edit context notification skipped"),
        }
    }

    // ── Files and exports ────────────────────────────────────────

    pub fn import_push(&self, user: &User, id: EntityId, file: FileUpload) -> DomainResult<FileMeta> {
        authorize(user, Capability::Import)?;
        let entity = self.load(id)?;
        let kind = entity.kind().ok_or_else(|| {
            DomainError::Validation(format!("unknown entity type: {}", entity.entity_type))
        })?;
        let name = checked_file_name(&file.name)?;
        let meta = FileMeta {
            id: FileMeta::file_id(FileDirection::Import, kind, Some(id), name),
            name: name.to_string(),
            direction: FileDirection::Import,
            entity_type: kind,
            entity_id: Some(id),
            mime_type: file.mime_type,
            size: file.content.len() as u64,
            status: UploadStatus::Complete,
            uploaded_by: user.id,
            uploaded_at: Utc::now(),
            job_id: None,
            message: None,
        };
        self.backends.files.put(&meta, &file.content)?;
        self.publish_edit(user, &entity)?;
        info!(%id, file = %meta.id, size = meta.size, "file imported");
        Ok(meta)
    }

    /// Registers a pending export job with a placeholder file in progress and
    /// hands it to the exporter.
    pub fn export_ask(&self, user: &User, request: ExportRequest) -> DomainResult<ExportJob> {
        authorize(user, Capability::Export)?;
        let (entity_type, entity_id, subject) = match &request.scope {
            ExportScope::Entity { entity_id } => {
                let entity = self.load(*entity_id)?;
                let kind = entity.kind().ok_or_else(|| {
                    DomainError::Validation(format!("unknown entity type: {}", entity.entity_type))
                })?;
                (kind, Some(*entity_id), entity.name)
            }
            ExportScope::List { .. } => {
                let kind = request.entity_type.ok_or_else(|| {
                    DomainError::Validation("list exports need an entity type".into())
                })?;
                Self::scoped_types(&[kind])?;
                (kind, None, kind.as_tag().to_string())
            }
        };

        let job_id = JobId::new();
        let name = ExportJob::file_name(job_id, &subject, request.export_type, request.format);
        let file_id = FileMeta::file_id(FileDirection::Export, entity_type, entity_id, &name);
        let now = Utc::now();
        let job = ExportJob {
            id: job_id,
            scope: request.scope,
            entity_type,
            format: request.format,
            export_type: request.export_type,
            status: JobStatus::Pending,
            file_id: file_id.clone(),
            requested_by: user.id,
            created_at: now,
            updated_at: now,
            message: None,
        };
        let placeholder = FileMeta {
            id: file_id,
            name,
            direction: FileDirection::Export,
            entity_type,
            entity_id,
            mime_type: request.format.mime_type().to_string(),
            size: 0,
            status: UploadStatus::Progress,
            uploaded_by: user.id,
            uploaded_at: now,
            job_id: Some(job.id),
            message: None,
        };
        self.backends.files.put(&placeholder, &[])?;
        self.backends.jobs.insert(&job)?;

        match &self.exports {
            Some(queue) if queue.enqueue(job.id) => {}
            Some(_) => warn!(job = %job.id, "export queue closed, job left pending"),
            None => debug!(job = %job.id, "no exporter attached, job left pending"),
        }
        Ok(job)
    }

    /// Delivers the artifact of an export job. `owner` is the entity the push
    /// is made for, or `None` for list exports; it must match the job.
    pub fn export_push(
        &self,
        user: &User,
        job_id: JobId,
        owner: Option<EntityId>,
        file: FileUpload,
    ) -> DomainResult<ExportJob> {
        authorize(user, Capability::Export)?;
        let job = self
            .backends
            .jobs
            .get(job_id)?
            .ok_or_else(|| DomainError::NotFound(format!("export job {job_id}")))?;
        if job.entity_id() != owner {
            return Err(DomainError::Validation(format!(
                "export job {job_id} does not belong to this target"
            )));
        }
        if job.status.is_terminal() {
            return Err(DomainError::Validation(format!(
                "export job {job_id} is already {:?}",
                job.status
            )));
        }
        let placeholder = self
            .backends
            .files
            .get(&job.file_id)?
            .ok_or_else(|| DomainError::NotFound(format!("file {}", job.file_id)))?;

        let meta = FileMeta {
            mime_type: file.mime_type,
            size: file.content.len() as u64,
            status: UploadStatus::Complete,
            uploaded_by: user.id,
            uploaded_at: Utc::now(),
            message: None,
            ..placeholder
        };
        self.backends.files.put(&meta, &file.content)?;
        let job = self.backends.jobs.transition(job_id, JobStatus::Complete, None)?;

        if let Some(entity) = job.entity_id().map(|id| self.get(id)).transpose()?.flatten() {
            self.publish_edit(user, &entity)?;
        }
        info!(job = %job_id, file = %meta.id, size = meta.size, "export completed");
        Ok(job)
    }

    /// Marks a pending job as being worked on.
    pub fn export_started(&self, job_id: JobId) -> DomainResult<ExportJob> {
        Ok(self
            .backends
            .jobs
            .transition(job_id, JobStatus::Progress, None)?)
    }

    /// Marks a job and its placeholder file as failed. A missing placeholder
    /// does not keep the job from failing.
    pub fn export_failed(&self, job_id: JobId, message: &str) -> DomainResult<ExportJob> {
        let job = self
            .backends
            .jobs
            .transition(job_id, JobStatus::Error, Some(message))?;
        if let Err(err) =
            self.backends
                .files
                .set_status(&job.file_id, UploadStatus::Error, Some(message))
        {
            warn!(job = %job_id, error = %err, "placeholder file not marked as failed");
        }
        warn!(job = %job_id, message, "export failed");
        Ok(job)
    }
}

fn checked_file_name(name: &str) -> DomainResult<&str> {
    let name = name.trim();
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(DomainError::Validation(format!("invalid file name: {name:?}")));
    }
    Ok(name)
}
