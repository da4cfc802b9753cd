use crate::{EditInput, Entity};
use stixgraph_types::EntityType;

/// Fields a patch may never touch.
const IMMUTABLE_FIELDS: &[&str] = &["id", "internal_id_key", "stix_id", "stix_id_key", "entity_type"];

/// Per-type validation and post-load processing.
///
/// The domain layer runs `validate` before every create and `validate_patch`
/// before every field edit. Returning `Err(message)` rejects the write.
pub trait EntityValidator: Send + Sync {
    /// Validate an entity before it is persisted.
    fn validate(&self, entity: &Entity) -> Result<(), String> {
        let _ = entity;
        Ok(())
    }

    /// Validate a field patch against the current state of the entity.
    fn validate_patch(&self, entity: &Entity, patch: &EditInput) -> Result<(), String> {
        let _ = (entity, patch);
        Ok(())
    }

    /// Called after loading an entity from storage, before returning it.
    fn on_after_load(&self, entity: &mut Entity) {
        let _ = entity;
    }
}

/// Rules shared by every STIX domain entity type.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardValidator;

impl EntityValidator for StandardValidator {
    fn validate(&self, entity: &Entity) -> Result<(), String> {
        if entity.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        let Some(kind) = entity.kind() else {
            return Err(format!("unknown entity type: {}", entity.entity_type));
        };
        let prefix = format!("{}--", kind.as_tag());
        if !entity.stix_id.starts_with(&prefix) {
            return Err(format!("stix_id must start with {prefix}"));
        }
        if kind == EntityType::Indicator
            && entity.get_str("/pattern").is_none_or(|p| p.trim().is_empty())
        {
            return Err("indicator requires a pattern".into());
        }
        Ok(())
    }

    fn validate_patch(&self, entity: &Entity, patch: &EditInput) -> Result<(), String> {
        if IMMUTABLE_FIELDS.contains(&patch.key.as_str()) {
            return Err(format!("field {} cannot be edited", patch.key));
        }
        let first = patch.value.first().map(|v| v.trim());
        if patch.key == "name" && first.is_none_or(str::is_empty) {
            return Err("name must not be empty".into());
        }
        if patch.key == "pattern"
            && entity.kind() == Some(EntityType::Indicator)
            && first.is_none_or(str::is_empty)
        {
            return Err("indicator requires a pattern".into());
        }
        Ok(())
    }
}
