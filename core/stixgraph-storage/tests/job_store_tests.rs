use chrono::Utc;
use pretty_assertions::assert_eq;
use stixgraph_model::{ExportFormat, ExportJob, ExportScope, ExportType, JobStatus};
use stixgraph_storage::{JobStore, StorageError};
use stixgraph_types::{EntityId, EntityType, JobId, UserId};

fn job(scope: ExportScope) -> ExportJob {
    let now = Utc::now();
    ExportJob {
        id: JobId::new(),
        scope,
        entity_type: EntityType::Malware,
        format: ExportFormat::Json,
        export_type: ExportType::Full,
        status: JobStatus::Pending,
        file_id: "export/malware/list/x.json".into(),
        requested_by: UserId::new(),
        created_at: now,
        updated_at: now,
        message: None,
    }
}

#[test]
fn insert_and_get() {
    let store = JobStore::open_in_memory().unwrap();
    let j = job(ExportScope::List {
        list_args: serde_json::json!({"search": "emotet"}),
    });
    store.insert(&j).unwrap();
    assert_eq!(store.get(j.id).unwrap(), Some(j));
    assert_eq!(store.get(JobId::new()).unwrap(), None);
}

#[test]
fn transitions_follow_lifecycle() {
    let store = JobStore::open_in_memory().unwrap();
    let j = job(ExportScope::Entity {
        entity_id: EntityId::new(),
    });
    store.insert(&j).unwrap();

    assert_eq!(store.with_status(JobStatus::Pending).unwrap().len(), 1);
    let moved = store.transition(j.id, JobStatus::Progress, None).unwrap();
    assert_eq!(moved.status, JobStatus::Progress);
    assert!(store.with_status(JobStatus::Pending).unwrap().is_empty());

    store.transition(j.id, JobStatus::Complete, None).unwrap();
    let err = store.transition(j.id, JobStatus::Progress, None).unwrap_err();
    assert!(matches!(err, StorageError::InvalidData(_)));
    assert_eq!(store.get(j.id).unwrap().unwrap().status, JobStatus::Complete);
}

#[test]
fn transition_of_unknown_job_is_not_found() {
    let store = JobStore::open_in_memory().unwrap();
    let err = store.transition(JobId::new(), JobStatus::Complete, None).unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}
