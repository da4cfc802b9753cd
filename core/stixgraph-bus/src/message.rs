use serde::Serialize;
use stixgraph_model::Entity;
use stixgraph_types::{EntityId, UserId};

/// The user an event originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventActor {
    pub id: UserId,
}

/// `{ user: { id }, instance }`. Both fields are always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditEvent {
    pub user: EventActor,
    pub instance: Entity,
}

impl EditEvent {
    pub fn new(user: UserId, instance: Entity) -> Self {
        Self {
            user: EventActor { id: user },
            instance,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Edit(EditEvent),
    /// Ends every stream on the topic. Never an edit.
    Disconnect,
}

/// Accepts edits of one entity, optionally excluding one originating user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditFilter {
    pub entity_id: EntityId,
    pub exclude_user: Option<UserId>,
}

impl EditFilter {
    /// Edits of `entity_id` made by anyone but `subscriber`.
    pub fn for_subscriber(entity_id: EntityId, subscriber: UserId) -> Self {
        Self {
            entity_id,
            exclude_user: Some(subscriber),
        }
    }

    pub fn accepts(&self, event: &EditEvent) -> bool {
        event.instance.id == self.entity_id && self.exclude_user != Some(event.user.id)
    }
}
