//! Entity families and the pub/sub topics they publish on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A group of entity types that share one resolver set and one set of topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityFamily {
    StixDomainEntity,
    StixRelation,
    StixObservable,
    Tag,
    MarkingDefinition,
    ExternalReference,
}

impl EntityFamily {
    /// The family prefix used in topic names (`STIX_DOMAIN_ENTITY`).
    pub fn topic_prefix(self) -> &'static str {
        match self {
            EntityFamily::StixDomainEntity => "STIX_DOMAIN_ENTITY",
            EntityFamily::StixRelation => "STIX_RELATION",
            EntityFamily::StixObservable => "STIX_OBSERVABLE",
            EntityFamily::Tag => "TAG",
            EntityFamily::MarkingDefinition => "MARKING_DEFINITION",
            EntityFamily::ExternalReference => "EXTERNAL_REFERENCE",
        }
    }

    /// Topic carrying edit events for this family.
    pub fn edit_topic(self) -> Topic {
        Topic::new(self, TopicKind::Edit)
    }

    /// Topic carrying creation events for this family.
    pub fn added_topic(self) -> Topic {
        Topic::new(self, TopicKind::Added)
    }
}

/// What kind of change a topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopicKind {
    Edit,
    Added,
}

/// A named pub/sub channel for one family and one kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub family: EntityFamily,
    pub kind: TopicKind,
}

impl Topic {
    pub const fn new(family: EntityFamily, kind: TopicKind) -> Self {
        Self { family, kind }
    }

    /// Wire name of the topic, e.g. `STIX_DOMAIN_ENTITY_EDIT_TOPIC`.
    pub fn name(&self) -> String {
        let kind = match self.kind {
            TopicKind::Edit => "EDIT",
            TopicKind::Added => "ADDED",
        };
        format!("{}_{}_TOPIC", self.family.topic_prefix(), kind)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
