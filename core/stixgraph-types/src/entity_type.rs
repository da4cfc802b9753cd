//! The exhaustive table of stored entity type tags.
//!
//! Storage keeps the kebab-case STIX tag (`threat-actor`); the GraphQL schema
//! exposes the PascalCase type name (`ThreatActor`). The mapping between the two
//! is an explicit lookup table, never a string transform, so a tag that is not
//! listed here resolves to [`ResolvedType::Unknown`] instead of to a type name
//! that happens to look right.

use crate::{EntityFamily, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Schema type name used when a stored tag is absent or not in the table.
pub const UNKNOWN_TYPE_NAME: &str = "Unknown";

/// A known entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
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
    Tag,
    MarkingDefinition,
    ExternalReference,
    StixObservable,
}

/// Every known entity type, in declaration order.
const ALL_TYPES: [EntityType; 21] = [
    EntityType::ThreatActor,
    EntityType::IntrusionSet,
    EntityType::Campaign,
    EntityType::Incident,
    EntityType::Malware,
    EntityType::Tool,
    EntityType::Vulnerability,
    EntityType::AttackPattern,
    EntityType::CourseOfAction,
    EntityType::Report,
    EntityType::Indicator,
    EntityType::Sector,
    EntityType::Organization,
    EntityType::User,
    EntityType::Region,
    EntityType::Country,
    EntityType::City,
    EntityType::Tag,
    EntityType::MarkingDefinition,
    EntityType::ExternalReference,
    EntityType::StixObservable,
];

impl EntityType {
    /// Every known entity type.
    pub fn all() -> impl Iterator<Item = EntityType> {
        ALL_TYPES.into_iter()
    }

    /// The tag this type is stored under (`threat-actor`).
    pub fn as_tag(self) -> &'static str {
        self.names().0
    }

    /// The schema type name (`ThreatActor`).
    pub fn schema_name(self) -> &'static str {
        self.names().1
    }

    /// Looks a stored tag up in the table. Exact match only.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::all().find(|t| t.as_tag() == tag)
    }

    /// Looks a schema type name up in the table. Exact match only.
    pub fn from_schema_name(name: &str) -> Option<Self> {
        Self::all().find(|t| t.schema_name() == name)
    }

    /// The family whose resolvers and topics handle this type.
    pub fn family(self) -> EntityFamily {
        match self {
            EntityType::Tag => EntityFamily::Tag,
            EntityType::MarkingDefinition => EntityFamily::MarkingDefinition,
            EntityType::ExternalReference => EntityFamily::ExternalReference,
            EntityType::StixObservable => EntityFamily::StixObservable,
            _ => EntityFamily::StixDomainEntity,
        }
    }

    /// Whether this type belongs to the STIX domain entity family.
    pub fn is_stix_domain_entity(self) -> bool {
        self.family() == EntityFamily::StixDomainEntity
    }

    /// Identity sub-types can be referenced as `created_by_ref`.
    pub fn is_identity(self) -> bool {
        matches!(
            self,
            EntityType::Sector
                | EntityType::Organization
                | EntityType::User
                | EntityType::Region
                | EntityType::Country
                | EntityType::City
        )
    }

    /// `(stored tag, schema type name)`.
    fn names(self) -> (&'static str, &'static str) {
        use EntityType::*;
        match self {
            ThreatActor => ("threat-actor", "ThreatActor"),
            IntrusionSet => ("intrusion-set", "IntrusionSet"),
            Campaign => ("campaign", "Campaign"),
            Incident => ("incident", "Incident"),
            Malware => ("malware", "Malware"),
            Tool => ("tool", "Tool"),
            Vulnerability => ("vulnerability", "Vulnerability"),
            AttackPattern => ("attack-pattern", "AttackPattern"),
            CourseOfAction => ("course-of-action", "CourseOfAction"),
            Report => ("report", "Report"),
            Indicator => ("indicator", "Indicator"),
            Sector => ("sector", "Sector"),
            Organization => ("organization", "Organization"),
            User => ("user", "User"),
            Region => ("region", "Region"),
            Country => ("country", "Country"),
            City => ("city", "City"),
            Tag => ("tag", "Tag"),
            MarkingDefinition => ("marking-definition", "MarkingDefinition"),
            ExternalReference => ("external-reference", "ExternalReference"),
            StixObservable => ("stix-observable", "StixObservable"),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    /// Accepts either the stored tag or the schema name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::all()
            .find(|t| {
                t.as_tag().eq_ignore_ascii_case(trimmed)
                    || t.schema_name().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| Error::UnknownEntityType(trimmed.to_string()))
    }
}

/// Outcome of resolving a stored tag to a schema type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedType {
    Known(EntityType),
    /// The tag was absent or is not in the table.
    Unknown,
}

impl ResolvedType {
    /// Resolves an optional stored tag.
    pub fn resolve(tag: Option<&str>) -> Self {
        match tag.and_then(EntityType::from_tag) {
            Some(entity_type) => ResolvedType::Known(entity_type),
            None => ResolvedType::Unknown,
        }
    }

    /// The schema type name for this resolution.
    pub fn type_name(self) -> &'static str {
        match self {
            ResolvedType::Known(entity_type) => entity_type.schema_name(),
            ResolvedType::Unknown => UNKNOWN_TYPE_NAME,
        }
    }
}
