use stixgraph_types::{EntityFamily, Topic, TopicKind};

#[test]
fn topic_names() {
    assert_eq!(
        EntityFamily::StixDomainEntity.edit_topic().name(),
        "STIX_DOMAIN_ENTITY_EDIT_TOPIC"
    );
    assert_eq!(
        EntityFamily::StixRelation.added_topic().to_string(),
        "STIX_RELATION_ADDED_TOPIC"
    );
}

#[test]
fn edit_and_added_topics_differ() {
    let family = EntityFamily::Tag;
    assert_ne!(family.edit_topic(), family.added_topic());
    assert_eq!(family.edit_topic(), Topic::new(family, TopicKind::Edit));
}
