//! Filterable and orderable fields of an entity family, and the list query
//! they feed.
//!
//! Logical names exposed in the API map to storage paths. A path with the
//! [`REL_INDEX_PREFIX`] addresses an attribute of the entities linked through a
//! relation (`rel_tagged.internal_id_key` is "the ids of the tags of this
//! entity"); any other path is a field of the entity itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use stixgraph_types::EntityType;

/// Prefix of storage paths that traverse a relation.
pub const REL_INDEX_PREFIX: &str = "rel_";

/// Page size used when a list query does not specify one.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// The attribute read on the far side of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationAttribute {
    /// The linked entity's identifier (`internal_id_key`).
    InternalId,
    /// Any other field of the linked entity (`value`, `definition`, ...).
    Field(String),
}

/// A parsed storage path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoragePath {
    /// A field of the entity itself.
    Field(String),
    /// An attribute of the entities linked through `relation_type`.
    Relation {
        relation_type: String,
        attribute: RelationAttribute,
    },
}

impl StoragePath {
    /// Parses `rel_<relation>.<attribute>` or a plain field name.
    pub fn parse(path: &str) -> Self {
        if let Some(rest) = path.strip_prefix(REL_INDEX_PREFIX) {
            if let Some((relation_type, attribute)) = rest.split_once('.') {
                let attribute = match attribute {
                    "internal_id_key" => RelationAttribute::InternalId,
                    other => RelationAttribute::Field(other.to_string()),
                };
                return StoragePath::Relation {
                    relation_type: relation_type.to_string(),
                    attribute,
                };
            }
        }
        StoragePath::Field(path.to_string())
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoragePath::Field(field) => f.write_str(field),
            StoragePath::Relation {
                relation_type,
                attribute,
            } => {
                let attribute = match attribute {
                    RelationAttribute::InternalId => "internal_id_key",
                    RelationAttribute::Field(field) => field.as_str(),
                };
                write!(f, "{REL_INDEX_PREFIX}{relation_type}.{attribute}")
            }
        }
    }
}

/// Filter keys declared by the STIX domain entity family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityFilterKey {
    Tags,
    CreatedBy,
    KnowledgeContains,
    ObservablesContains,
    HasExternalReference,
    Indicates,
}

impl EntityFilterKey {
    pub fn storage_path(self) -> StoragePath {
        let path = match self {
            EntityFilterKey::Tags => "rel_tagged.internal_id_key",
            EntityFilterKey::CreatedBy => "rel_created_by_ref.internal_id_key",
            EntityFilterKey::KnowledgeContains => "rel_object_refs.internal_id_key",
            EntityFilterKey::ObservablesContains => "rel_observable_refs.internal_id_key",
            EntityFilterKey::HasExternalReference => "rel_external_references.internal_id_key",
            EntityFilterKey::Indicates => "rel_indicates.internal_id_key",
        };
        StoragePath::parse(path)
    }
}

/// Ordering keys declared by the STIX domain entity family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityOrderingKey {
    Name,
    Created,
    Modified,
    CreatedAt,
    UpdatedAt,
    MarkingDefinitions,
    Tags,
}

impl EntityOrderingKey {
    pub fn storage_path(self) -> StoragePath {
        let path = match self {
            EntityOrderingKey::Name => "name",
            EntityOrderingKey::Created => "created",
            EntityOrderingKey::Modified => "modified",
            EntityOrderingKey::CreatedAt => "created_at",
            EntityOrderingKey::UpdatedAt => "updated_at",
            EntityOrderingKey::MarkingDefinitions => "rel_object_marking_refs.definition",
            EntityOrderingKey::Tags => "rel_tagged.value",
        };
        StoragePath::parse(path)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderMode {
    #[default]
    Asc,
    Desc,
}

/// One filter clause: the entity matches when the path holds any of `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFilter {
    pub path: StoragePath,
    pub values: Vec<String>,
}

impl EntityFilter {
    pub fn new(key: EntityFilterKey, values: Vec<String>) -> Self {
        Self {
            path: key.storage_path(),
            values,
        }
    }
}

/// A paginated, filtered listing request.
///
/// Filters are combined with AND; the values inside one filter with OR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// Restrict to these types; empty means no restriction.
    pub types: Vec<EntityType>,
    /// Case-insensitive substring match on name and description.
    pub search: Option<String>,
    pub filters: Vec<EntityFilter>,
    pub order_by: Option<StoragePath>,
    pub order_mode: OrderMode,
    pub first: usize,
    /// Offset to start after (decoded from a cursor).
    pub offset: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            types: Vec::new(),
            search: None,
            filters: Vec::new(),
            order_by: None,
            order_mode: OrderMode::Asc,
            first: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl ListQuery {
    pub fn with_types(mut self, types: Vec<EntityType>) -> Self {
        self.types = types;
        self
    }

    pub fn with_filter(mut self, key: EntityFilterKey, values: Vec<String>) -> Self {
        self.filters.push(EntityFilter::new(key, values));
        self
    }

    pub fn ordered_by(mut self, key: EntityOrderingKey, mode: OrderMode) -> Self {
        self.order_by = Some(key.storage_path());
        self.order_mode = mode;
        self
    }
}
