//! Output types: the `StixDomainEntity` interface, one object per known type
//! plus `Unknown`, and the records hanging off an entity.

use crate::error::GraphqlResultExt;
use crate::{actor, service};
use async_graphql::{Context, Enum, ID, Interface, Json, Object, Result, SimpleObject};
use chrono::{DateTime, Utc};
use stixgraph_model::{
    CountResult, DistributionEntry, EditContext, Entity, ExportJob, FileDirection, FileMeta,
    JobStatus, Page, Relation, TimeSeriesEntry, UploadStatus,
};
use stixgraph_types::{EntityType, ResolvedType};

/// Page size of `importFiles` / `exportFiles` when `first` is omitted.
const DEFAULT_FILE_PAGE: usize = 25;

fn file_page(first: Option<i32>) -> usize {
    first
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_FILE_PAGE)
}

/// Shared field implementations behind every entity object.
pub struct EntityNode(Entity);

impl EntityNode {
    pub fn entity(&self) -> &Entity {
        &self.0
    }

    fn id(&self) -> ID {
        ID::from(self.0.id)
    }

    fn entity_type(&self) -> String {
        self.0.entity_type.clone()
    }

    fn stix_id(&self) -> String {
        self.0.stix_id.clone()
    }

    fn name(&self) -> String {
        self.0.name.clone()
    }

    fn description(&self) -> Option<String> {
        self.0.description.clone()
    }

    fn data(&self) -> Json<serde_json::Value> {
        Json(self.0.data.clone())
    }

    fn tags(&self, ctx: &Context<'_>) -> Result<Vec<Tag>> {
        let tags = service(ctx)?.tags(actor(ctx)?, &self.0).gql()?;
        Ok(tags.into_iter().map(Tag::from).collect())
    }

    fn marking_definitions(&self, ctx: &Context<'_>) -> Result<Vec<MarkingDefinition>> {
        let markings = service(ctx)?
            .marking_definitions(actor(ctx)?, &self.0)
            .gql()?;
        Ok(markings.into_iter().map(MarkingDefinition::from).collect())
    }

    fn created_by_ref(&self, ctx: &Context<'_>) -> Result<Option<StixDomainEntity>> {
        let author = service(ctx)?.created_by_ref(actor(ctx)?, &self.0).gql()?;
        Ok(author.map(StixDomainEntity::from_entity))
    }

    fn edit_context(&self, ctx: &Context<'_>) -> Result<Vec<EditUserContext>> {
        let contexts = service(ctx)?.editors(actor(ctx)?, self.0.id).gql()?;
        Ok(contexts.into_iter().map(EditUserContext::from).collect())
    }

    fn files(
        &self,
        ctx: &Context<'_>,
        direction: FileDirection,
        first: Option<i32>,
    ) -> Result<Vec<File>> {
        let Some(kind) = self.0.kind() else {
            return Ok(Vec::new());
        };
        let files = service(ctx)?
            .files(actor(ctx)?, direction, kind, Some(self.0.id), file_page(first))
            .gql()?;
        Ok(files.into_iter().map(File::from).collect())
    }

    fn relations(&self, ctx: &Context<'_>) -> Result<Vec<StixRelation>> {
        let relations = service(ctx)?.relations(actor(ctx)?, self.0.id).gql()?;
        Ok(relations.into_iter().map(StixRelation::from).collect())
    }
}

macro_rules! entity_objects {
    (@object $(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name(EntityNode);

        #[Object]
        impl $name {
            async fn id(&self) -> ID {
                self.0.id()
            }

            /// Stored type tag (`threat-actor`).
            async fn entity_type(&self) -> String {
                self.0.entity_type()
            }

            async fn parent_type(&self) -> String {
                PARENT_TYPE.to_string()
            }

            async fn stix_id(&self) -> String {
                self.0.stix_id()
            }

            async fn name(&self) -> String {
                self.0.name()
            }

            async fn description(&self) -> Option<String> {
                self.0.description()
            }

            async fn created(&self) -> DateTime<Utc> {
                self.0.entity().created
            }

            async fn modified(&self) -> DateTime<Utc> {
                self.0.entity().modified
            }

            async fn created_at(&self) -> DateTime<Utc> {
                self.0.entity().created_at
            }

            async fn updated_at(&self) -> DateTime<Utc> {
                self.0.entity().updated_at
            }

            /// Type-specific attributes.
            async fn data(&self) -> Json<serde_json::Value> {
                self.0.data()
            }

            async fn tags(&self, ctx: &Context<'_>) -> Result<Vec<Tag>> {
                self.0.tags(ctx)
            }

            async fn marking_definitions(
                &self,
                ctx: &Context<'_>,
            ) -> Result<Vec<MarkingDefinition>> {
                self.0.marking_definitions(ctx)
            }

            async fn created_by_ref(&self, ctx: &Context<'_>) -> Result<Option<StixDomainEntity>> {
                self.0.created_by_ref(ctx)
            }

            /// Users currently editing this entity.
            async fn edit_context(&self, ctx: &Context<'_>) -> Result<Vec<EditUserContext>> {
                self.0.edit_context(ctx)
            }

            async fn import_files(&self, ctx: &Context<'_>, first: Option<i32>) -> Result<Vec<File>> {
                self.0.files(ctx, FileDirection::Import, first)
            }

            async fn export_files(&self, ctx: &Context<'_>, first: Option<i32>) -> Result<Vec<File>> {
                self.0.files(ctx, FileDirection::Export, first)
            }

            async fn relations(&self, ctx: &Context<'_>) -> Result<Vec<StixRelation>> {
                self.0.relations(ctx)
            }
        }
    };

    ($($name:ident),+ $(,)?) => {
        $(entity_objects!(@object $name);)+

        entity_objects!(@object
            /// An entity whose stored type tag is absent or not in the type table.
            Unknown
        );

        /// Any entity of the STIX domain entity family.
        #[derive(Interface)]
        #[graphql(
            field(name = "id", ty = "ID"),
            field(name = "entity_type", ty = "String"),
            field(name = "parent_type", ty = "String"),
            field(name = "stix_id", ty = "String"),
            field(name = "name", ty = "String"),
            field(name = "description", ty = "Option<String>"),
            field(name = "created", ty = "DateTime<Utc>"),
            field(name = "modified", ty = "DateTime<Utc>"),
            field(name = "created_at", ty = "DateTime<Utc>"),
            field(name = "updated_at", ty = "DateTime<Utc>"),
            field(name = "data", ty = "Json<serde_json::Value>"),
            field(name = "tags", ty = "Vec<Tag>"),
            field(name = "marking_definitions", ty = "Vec<MarkingDefinition>"),
            field(name = "created_by_ref", ty = "Option<StixDomainEntity>"),
            field(name = "edit_context", ty = "Vec<EditUserContext>"),
            field(name = "import_files", ty = "Vec<File>", arg(name = "first", ty = "Option<i32>")),
            field(name = "export_files", ty = "Vec<File>", arg(name = "first", ty = "Option<i32>")),
            field(name = "relations", ty = "Vec<StixRelation>")
        )]
        pub enum StixDomainEntity {
            $($name($name),)+
            Unknown(Unknown),
        }

        impl StixDomainEntity {
            /// Picks the schema type from the stored tag through the type table.
            pub fn from_entity(entity: Entity) -> Self {
                let resolved = entity.resolved_type();
                let node = EntityNode(entity);
                match resolved {
                    $(ResolvedType::Known(EntityType::$name) => $name(node).into(),)+
                    _ => Unknown(node).into(),
                }
            }

            pub fn entity(&self) -> &Entity {
                match self {
                    $(StixDomainEntity::$name(object) => object.0.entity(),)+
                    StixDomainEntity::Unknown(object) => object.0.entity(),
                }
            }
        }
    };
}

const PARENT_TYPE: &str = "Stix-Domain-Entity";

entity_objects!(
    ThreatActor,
    IntrusionSet,
    Campaign,
    Incident,
    Malware,
    Tool,
    Vulnerability,
    AttackPattern,
    CourseOfAction,
    Report,
    Indicator,
    Sector,
    Organization,
    User,
    Region,
    Country,
    City,
);

#[derive(SimpleObject)]
pub struct Tag {
    pub id: ID,
    pub tag_type: Option<String>,
    pub value: String,
    pub color: Option<String>,
}

impl From<Entity> for Tag {
    fn from(entity: Entity) -> Self {
        Self {
            id: ID::from(entity.id),
            tag_type: entity.get_str("/tag_type").map(str::to_string),
            value: entity.field_label("value").unwrap_or_default(),
            color: entity.get_str("/color").map(str::to_string),
        }
    }
}

#[derive(SimpleObject)]
pub struct MarkingDefinition {
    pub id: ID,
    pub definition_type: Option<String>,
    pub definition: String,
    pub color: Option<String>,
}

impl From<Entity> for MarkingDefinition {
    fn from(entity: Entity) -> Self {
        Self {
            id: ID::from(entity.id),
            definition_type: entity.get_str("/definition_type").map(str::to_string),
            definition: entity.field_label("definition").unwrap_or_default(),
            color: entity.get_str("/color").map(str::to_string),
        }
    }
}

#[derive(SimpleObject)]
pub struct EditUserContext {
    pub name: String,
    pub focus_on: Option<String>,
}

impl From<EditContext> for EditUserContext {
    fn from(context: EditContext) -> Self {
        Self {
            name: context.user_name,
            focus_on: context.focus_on,
        }
    }
}

#[derive(SimpleObject)]
pub struct StixRelation {
    pub id: ID,
    pub relationship_type: String,
    pub from_id: ID,
    pub to_id: ID,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub inferred: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Relation> for StixRelation {
    fn from(relation: Relation) -> Self {
        Self {
            id: ID::from(relation.id),
            relationship_type: relation.relation_type,
            from_id: ID::from(relation.from_id),
            to_id: ID::from(relation.to_id),
            first_seen: relation.first_seen,
            last_seen: relation.last_seen,
            inferred: relation.inferred,
            created_at: relation.created_at,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(rename_items = "lowercase")]
pub enum FileStatus {
    Progress,
    Complete,
    Error,
}

impl From<UploadStatus> for FileStatus {
    fn from(status: UploadStatus) -> Self {
        match status {
            UploadStatus::Progress => FileStatus::Progress,
            UploadStatus::Complete => FileStatus::Complete,
            UploadStatus::Error => FileStatus::Error,
        }
    }
}

#[derive(SimpleObject)]
pub struct File {
    pub id: ID,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub upload_status: FileStatus,
    pub uploaded_at: DateTime<Utc>,
    pub job_id: Option<ID>,
    pub message: Option<String>,
}

impl From<FileMeta> for File {
    fn from(meta: FileMeta) -> Self {
        Self {
            id: ID(meta.id),
            name: meta.name,
            mime_type: meta.mime_type,
            size: meta.size,
            upload_status: meta.status.into(),
            uploaded_at: meta.uploaded_at,
            job_id: meta.job_id.map(ID::from),
            message: meta.message,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "JobStatus", rename_items = "lowercase")]
pub enum ExportJobStatus {
    Pending,
    Progress,
    Complete,
    Error,
}

impl From<JobStatus> for ExportJobStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => ExportJobStatus::Pending,
            JobStatus::Progress => ExportJobStatus::Progress,
            JobStatus::Complete => ExportJobStatus::Complete,
            JobStatus::Error => ExportJobStatus::Error,
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "ExportJob")]
pub struct ExportJobObject {
    pub id: ID,
    pub status: ExportJobStatus,
    pub entity_type: String,
    /// `None` for list exports.
    pub entity_id: Option<ID>,
    /// Mime type of the produced file.
    pub format: String,
    pub export_type: String,
    /// The file the job fills once pushed.
    pub file_id: ID,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ExportJob> for ExportJobObject {
    fn from(job: ExportJob) -> Self {
        Self {
            id: ID::from(job.id),
            status: job.status.into(),
            entity_type: job.entity_type.as_tag().to_string(),
            entity_id: job.entity_id().map(ID::from),
            format: job.format.mime_type().to_string(),
            export_type: job.export_type.as_str().to_string(),
            file_id: ID(job.file_id),
            message: job.message,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(SimpleObject)]
pub struct TimeSeries {
    pub date: DateTime<Utc>,
    pub value: f64,
}

impl From<TimeSeriesEntry> for TimeSeries {
    fn from(entry: TimeSeriesEntry) -> Self {
        Self {
            date: entry.date,
            value: entry.value,
        }
    }
}

#[derive(SimpleObject)]
pub struct Number {
    pub total: u64,
    pub count: u64,
}

impl From<CountResult> for Number {
    fn from(result: CountResult) -> Self {
        Self {
            total: result.total,
            count: result.count,
        }
    }
}

#[derive(SimpleObject)]
pub struct Distribution {
    pub label: String,
    pub value: f64,
}

impl From<DistributionEntry> for Distribution {
    fn from(entry: DistributionEntry) -> Self {
        Self {
            label: entry.label,
            value: entry.value,
        }
    }
}

#[derive(SimpleObject)]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub global_count: u64,
}

#[derive(SimpleObject)]
pub struct StixDomainEntityEdge {
    pub node: StixDomainEntity,
    pub cursor: String,
}

#[derive(SimpleObject)]
pub struct StixDomainEntityConnection {
    pub edges: Vec<StixDomainEntityEdge>,
    pub page_info: PageInfo,
}

impl From<Page<Entity>> for StixDomainEntityConnection {
    fn from(page: Page<Entity>) -> Self {
        let edges: Vec<StixDomainEntityEdge> = page
            .with_cursors()
            .map(|(cursor, entity)| StixDomainEntityEdge {
                node: StixDomainEntity::from_entity(entity.clone()),
                cursor: cursor.encode(),
            })
            .collect();
        let page_info = PageInfo {
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
            has_next_page: page.has_next_page(),
            has_previous_page: page.has_previous_page(),
            global_count: page.total as u64,
        };
        Self { edges, page_info }
    }
}
