//! Write inputs accepted by the domain layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stixgraph_types::{EntityId, EntityType};

/// Creation input for a STIX domain entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAddInput {
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Supplied STIX id; generated when absent.
    #[serde(default)]
    pub stix_id: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    /// Type-specific attributes (`pattern`, `aliases`, ...).
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub created_by_ref: Option<EntityId>,
    #[serde(default)]
    pub marking_definitions: Vec<EntityId>,
    #[serde(default)]
    pub tags: Vec<EntityId>,
}

impl EntityAddInput {
    pub fn new(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            name: name.into(),
            description: None,
            stix_id: None,
            created: None,
            modified: None,
            data: serde_json::Map::new(),
            created_by_ref: None,
            marking_definitions: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Every id this input references.
    pub fn referenced_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.created_by_ref
            .iter()
            .chain(self.marking_definitions.iter())
            .chain(self.tags.iter())
            .copied()
    }
}

/// A field patch. One value is stored as a string, several as an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditInput {
    pub key: String,
    pub value: Vec<String>,
}

impl EditInput {
    pub fn new(key: impl Into<String>, value: Vec<String>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// The value as it is stored.
    pub fn stored_value(&self) -> serde_json::Value {
        match self.value.as_slice() {
            [] => serde_json::Value::Null,
            [single] => serde_json::Value::String(single.clone()),
            many => serde_json::Value::Array(
                many.iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditContextInput {
    #[serde(default)]
    pub focus_on: Option<String>,
}

/// Adds one relation from the edited entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationAddInput {
    pub to_id: EntityId,
    /// Relation type.
    pub through: String,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Adds the same relation type towards several entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationsAddInput {
    pub to_ids: Vec<EntityId>,
    pub through: String,
}
