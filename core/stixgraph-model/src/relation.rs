use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stixgraph_types::{EntityId, RelationId, UserId};

/// A typed, directed link between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub relation_type: String,
    pub from_id: EntityId,
    pub to_id: EntityId,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    /// Produced by an inference rule rather than written by a user.
    #[serde(default)]
    pub inferred: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
}

impl Relation {
    pub fn new(
        relation_type: impl Into<String>,
        from_id: EntityId,
        to_id: EntityId,
        created_by: UserId,
    ) -> Self {
        Self {
            id: RelationId::new(),
            relation_type: relation_type.into(),
            from_id,
            to_id,
            first_seen: None,
            last_seen: None,
            inferred: false,
            created_at: Utc::now(),
            created_by,
        }
    }

    /// The endpoint opposite to `id`, if `id` is one of the endpoints.
    pub fn other_end(&self, id: EntityId) -> Option<EntityId> {
        if self.from_id == id {
            Some(self.to_id)
        } else if self.to_id == id {
            Some(self.from_id)
        } else {
            None
        }
    }
}

/// Reference relations written alongside an entity (as opposed to free STIX
/// relations such as `uses` or `targets`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationRef {
    Tagged,
    CreatedByRef,
    ObjectMarkingRefs,
    ObjectRefs,
    ObservableRefs,
    ExternalReferences,
    Indicates,
}

impl RelationRef {
    /// The stored relation type.
    pub fn as_str(self) -> &'static str {
        match self {
            RelationRef::Tagged => "tagged",
            RelationRef::CreatedByRef => "created_by_ref",
            RelationRef::ObjectMarkingRefs => "object_marking_refs",
            RelationRef::ObjectRefs => "object_refs",
            RelationRef::ObservableRefs => "observable_refs",
            RelationRef::ExternalReferences => "external_references",
            RelationRef::Indicates => "indicates",
        }
    }
}
