//! Input objects and enums, and their conversion into model inputs.

use crate::error::invalid;
use async_graphql::{Enum, ID, InputObject, Json, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use stixgraph_model::{
    self as model, EntityFilterKey, EntityOrderingKey, FileUpload, Interval, OrderMode, TimeField,
};
use stixgraph_types::{EntityId, EntityType, JobId};

pub(crate) fn parse_entity_id(id: &str) -> Result<EntityId> {
    EntityId::parse(id).map_err(|_| invalid(format!("invalid entity id: {id}")))
}

pub(crate) fn parse_job_id(id: &str) -> Result<JobId> {
    JobId::parse(id).map_err(|_| invalid(format!("invalid job id: {id}")))
}

pub(crate) fn parse_entity_ids(ids: &[ID]) -> Result<Vec<EntityId>> {
    ids.iter().map(|id| parse_entity_id(id)).collect()
}

/// Accepts stored tags (`threat-actor`) and schema names (`ThreatActor`).
pub(crate) fn parse_types(types: Option<Vec<String>>) -> Result<Vec<EntityType>> {
    types
        .unwrap_or_default()
        .iter()
        .map(|t| t.parse::<EntityType>().map_err(|err| invalid(err.to_string())))
        .collect()
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(rename_items = "camelCase")]
pub enum StixDomainEntitiesFilter {
    Tags,
    CreatedBy,
    KnowledgeContains,
    ObservablesContains,
    HasExternalReference,
    Indicates,
}

impl From<StixDomainEntitiesFilter> for EntityFilterKey {
    fn from(key: StixDomainEntitiesFilter) -> Self {
        match key {
            StixDomainEntitiesFilter::Tags => EntityFilterKey::Tags,
            StixDomainEntitiesFilter::CreatedBy => EntityFilterKey::CreatedBy,
            StixDomainEntitiesFilter::KnowledgeContains => EntityFilterKey::KnowledgeContains,
            StixDomainEntitiesFilter::ObservablesContains => EntityFilterKey::ObservablesContains,
            StixDomainEntitiesFilter::HasExternalReference => {
                EntityFilterKey::HasExternalReference
            }
            StixDomainEntitiesFilter::Indicates => EntityFilterKey::Indicates,
        }
    }
}

/// Matches entities related to any of `values` through `key`.
#[derive(InputObject)]
pub struct StixDomainEntitiesFiltering {
    pub key: StixDomainEntitiesFilter,
    pub values: Vec<String>,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
pub enum StixDomainEntitiesOrdering {
    #[graphql(name = "name")]
    Name,
    #[graphql(name = "created")]
    Created,
    #[graphql(name = "modified")]
    Modified,
    #[graphql(name = "created_at")]
    CreatedAt,
    #[graphql(name = "updated_at")]
    UpdatedAt,
    #[graphql(name = "markingDefinitions")]
    MarkingDefinitions,
    #[graphql(name = "tags")]
    Tags,
}

impl From<StixDomainEntitiesOrdering> for EntityOrderingKey {
    fn from(key: StixDomainEntitiesOrdering) -> Self {
        match key {
            StixDomainEntitiesOrdering::Name => EntityOrderingKey::Name,
            StixDomainEntitiesOrdering::Created => EntityOrderingKey::Created,
            StixDomainEntitiesOrdering::Modified => EntityOrderingKey::Modified,
            StixDomainEntitiesOrdering::CreatedAt => EntityOrderingKey::CreatedAt,
            StixDomainEntitiesOrdering::UpdatedAt => EntityOrderingKey::UpdatedAt,
            StixDomainEntitiesOrdering::MarkingDefinitions => EntityOrderingKey::MarkingDefinitions,
            StixDomainEntitiesOrdering::Tags => EntityOrderingKey::Tags,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Default)]
#[graphql(rename_items = "lowercase")]
pub enum OrderingMode {
    #[default]
    Asc,
    Desc,
}

impl From<OrderingMode> for OrderMode {
    fn from(mode: OrderingMode) -> Self {
        match mode {
            OrderingMode::Asc => OrderMode::Asc,
            OrderingMode::Desc => OrderMode::Desc,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(rename_items = "snake_case")]
pub enum TimeSeriesField {
    Created,
    Modified,
    CreatedAt,
    UpdatedAt,
}

impl From<TimeSeriesField> for TimeField {
    fn from(field: TimeSeriesField) -> Self {
        match field {
            TimeSeriesField::Created => TimeField::Created,
            TimeSeriesField::Modified => TimeField::Modified,
            TimeSeriesField::CreatedAt => TimeField::CreatedAt,
            TimeSeriesField::UpdatedAt => TimeField::UpdatedAt,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(rename_items = "lowercase")]
pub enum TimeSeriesInterval {
    Day,
    Month,
    Year,
}

impl From<TimeSeriesInterval> for Interval {
    fn from(interval: TimeSeriesInterval) -> Self {
        match interval {
            TimeSeriesInterval::Day => Interval::Day,
            TimeSeriesInterval::Month => Interval::Month,
            TimeSeriesInterval::Year => Interval::Year,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(rename_items = "lowercase")]
pub enum StatsOperation {
    Count,
}

impl From<StatsOperation> for model::StatsOperation {
    fn from(operation: StatsOperation) -> Self {
        match operation {
            StatsOperation::Count => model::StatsOperation::Count,
        }
    }
}

/// An uploaded file. `content` is base64.
#[derive(InputObject)]
pub struct FileInput {
    pub name: String,
    pub mime_type: String,
    pub content: String,
}

impl FileInput {
    pub fn into_upload(self) -> Result<FileUpload> {
        let content = STANDARD
            .decode(self.content.trim())
            .map_err(|err| invalid(format!("file content is not base64: {err}")))?;
        Ok(FileUpload {
            name: self.name,
            mime_type: self.mime_type,
            content,
        })
    }
}

#[derive(InputObject)]
pub struct StixDomainEntityAddInput {
    /// Stored tag or schema name of the type to create.
    #[graphql(name = "type")]
    pub entity_type: String,
    pub name: String,
    pub description: Option<String>,
    pub stix_id: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub created_by_ref: Option<ID>,
    pub marking_definitions: Option<Vec<ID>>,
    pub tags: Option<Vec<ID>>,
    /// Type-specific attributes, e.g. `{"pattern": "..."}` for indicators.
    pub data: Option<Json<serde_json::Map<String, serde_json::Value>>>,
}

impl StixDomainEntityAddInput {
    pub fn into_model(self) -> Result<model::EntityAddInput> {
        let entity_type = self
            .entity_type
            .parse::<EntityType>()
            .map_err(|err| invalid(err.to_string()))?;
        let mut input = model::EntityAddInput::new(entity_type, self.name);
        input.description = self.description;
        input.stix_id = self.stix_id;
        input.created = self.created;
        input.modified = self.modified;
        input.created_by_ref = self
            .created_by_ref
            .as_ref()
            .map(|id| parse_entity_id(id))
            .transpose()?;
        input.marking_definitions = parse_entity_ids(&self.marking_definitions.unwrap_or_default())?;
        input.tags = parse_entity_ids(&self.tags.unwrap_or_default())?;
        input.data = self.data.map(|Json(data)| data).unwrap_or_default();
        Ok(input)
    }
}

#[derive(InputObject)]
#[graphql(name = "EditInput")]
pub struct FieldPatchInput {
    pub key: String,
    pub value: Vec<String>,
}

impl From<FieldPatchInput> for model::EditInput {
    fn from(input: FieldPatchInput) -> Self {
        model::EditInput::new(input.key, input.value)
    }
}

#[derive(InputObject, Default)]
#[graphql(name = "EditContext")]
pub struct EditContextInput {
    pub focus_on: Option<String>,
}

impl From<EditContextInput> for model::EditContextInput {
    fn from(input: EditContextInput) -> Self {
        model::EditContextInput {
            focus_on: input.focus_on,
        }
    }
}

#[derive(InputObject)]
pub struct RelationAddInput {
    pub to_id: ID,
    pub through: String,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl RelationAddInput {
    pub fn into_model(self) -> Result<model::RelationAddInput> {
        Ok(model::RelationAddInput {
            to_id: parse_entity_id(&self.to_id)?,
            through: self.through,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
        })
    }
}

#[derive(InputObject)]
pub struct RelationsAddInput {
    pub to_ids: Vec<ID>,
    pub through: String,
}

impl RelationsAddInput {
    pub fn into_model(self) -> Result<model::RelationsAddInput> {
        Ok(model::RelationsAddInput {
            to_ids: parse_entity_ids(&self.to_ids)?,
            through: self.through,
        })
    }
}
