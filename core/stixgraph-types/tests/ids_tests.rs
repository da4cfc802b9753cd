use std::collections::HashSet;
use std::str::FromStr;
use stixgraph_types::{EntityId, JobId, RelationId, UserId};

// ── EntityId ──────────────────────────────────────────────────────

#[test]
fn entity_id_new_is_unique() {
    let a = EntityId::new();
    let b = EntityId::new();
    assert_ne!(a, b);
}

#[test]
fn entity_id_display_and_parse() {
    let id = EntityId::new();
    let parsed = EntityId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn entity_id_parse_trims_whitespace() {
    let id = EntityId::new();
    let parsed = EntityId::parse(&format!("  {id} ")).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn entity_id_parse_invalid() {
    assert!(EntityId::parse("not-a-uuid").is_err());
    assert!(EntityId::from_str("").is_err());
}

#[test]
fn entity_id_serializes_as_bare_string() {
    let id = EntityId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
}

#[test]
fn entity_ids_are_time_ordered() {
    let first = EntityId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = EntityId::new();
    assert!(first < second);
}

#[test]
fn entity_id_hash_and_eq() {
    let id = EntityId::new();
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id);
    assert_eq!(set.len(), 1);
}

// ── Other identifiers ─────────────────────────────────────────────

#[test]
fn distinct_id_types_share_uuid_representation() {
    let uuid = uuid::Uuid::now_v7();
    assert_eq!(UserId::from_uuid(uuid).as_uuid(), uuid);
    assert_eq!(RelationId::from_uuid(uuid).as_uuid(), uuid);
    assert_eq!(JobId::from_uuid(uuid).to_string(), uuid.to_string());
}

#[test]
fn user_id_debug_names_type() {
    let debug = format!("{:?}", UserId::new());
    assert!(debug.contains("UserId"));
}
