use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stixgraph_types::{EntityId, EntityType, ResolvedType, UserId};

/// A typed record of the knowledge graph.
///
/// Common STIX properties are promoted to fields; everything type-specific
/// (aliases, pattern, goals, ...) lives in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Stored type tag (`threat-actor`). Kept as a string so records written
    /// with a tag this build does not know still load.
    pub entity_type: String,
    pub stix_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    /// STIX `created` (may be supplied by the source).
    pub created: DateTime<Utc>,
    /// STIX `modified`.
    pub modified: DateTime<Utc>,
    /// Platform timestamps.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: UserId,
}

impl Entity {
    /// Creates a fresh entity of a known type.
    pub fn new(entity_type: EntityType, name: impl Into<String>, created_by: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            entity_type: entity_type.as_tag().to_string(),
            stix_id: format!("{}--{}", entity_type.as_tag(), uuid::Uuid::new_v4()),
            name: name.into(),
            description: None,
            data: serde_json::Value::Object(Default::default()),
            created: now,
            modified: now,
            created_at: now,
            updated_at: now,
            created_by,
        }
    }

    /// The known type of this entity, if its tag is in the table.
    pub fn kind(&self) -> Option<EntityType> {
        EntityType::from_tag(&self.entity_type)
    }

    /// Schema type resolution for this entity's tag.
    pub fn resolved_type(&self) -> ResolvedType {
        ResolvedType::resolve(Some(&self.entity_type))
    }

    /// Extract a string value from `data` using a JSON pointer (e.g., "/pattern").
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.data.pointer(pointer).and_then(|v| v.as_str())
    }

    /// Extract a boolean value from `data` using a JSON pointer.
    pub fn get_bool(&self, pointer: &str) -> Option<bool> {
        self.data.pointer(pointer).and_then(|v| v.as_bool())
    }

    /// Extract a numeric value from `data` using a JSON pointer.
    pub fn get_number(&self, pointer: &str) -> Option<f64> {
        self.data.pointer(pointer).and_then(|v| v.as_f64())
    }

    /// Reads a logical field by name, looking at promoted fields first and
    /// `data` second. Used for ordering and aggregation.
    ///
    /// `value` and `definition` (the display attributes of tags and marking
    /// definitions) fall back to `name` when `data` does not carry them.
    pub fn field_value(&self, field: &str) -> Option<serde_json::Value> {
        use serde_json::Value;
        match field {
            "id" | "internal_id_key" => Some(Value::String(self.id.to_string())),
            "entity_type" => Some(Value::String(self.entity_type.clone())),
            "stix_id" | "stix_id_key" => Some(Value::String(self.stix_id.clone())),
            "name" => Some(Value::String(self.name.clone())),
            "description" => self.description.clone().map(Value::String),
            "created" => Some(Value::String(self.created.to_rfc3339())),
            "modified" => Some(Value::String(self.modified.to_rfc3339())),
            "created_at" => Some(Value::String(self.created_at.to_rfc3339())),
            "updated_at" => Some(Value::String(self.updated_at.to_rfc3339())),
            "value" | "definition" => self
                .data
                .get(field)
                .cloned()
                .or_else(|| Some(Value::String(self.name.clone()))),
            other => self.data.get(other).cloned(),
        }
    }

    /// Field value rendered as a label (strings verbatim, other JSON as text).
    pub fn field_label(&self, field: &str) -> Option<String> {
        match self.field_value(field)? {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
