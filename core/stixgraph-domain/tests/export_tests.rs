use pretty_assertions::assert_eq;
use std::time::Duration;
use stixgraph_domain::{
    Backends, DomainError, ExportQueue, ExportRequest, ExportWorker, StixDomainEntityService,
    render_export,
};
use stixgraph_model::{
    Capability, EntityAddInput, ExportFormat, ExportType, FileDirection, FileUpload, JobStatus,
    ListQuery, RelationAddInput, UploadStatus, User,
};
use stixgraph_types::{EntityType, JobId};

fn admin() -> User {
    User::new("admin", "admin@example.com").with_capabilities([Capability::Admin])
}

fn upload(content: &str) -> FileUpload {
    FileUpload {
        name: "ignored.json".into(),
        mime_type: "application/json".into(),
        content: content.as_bytes().to_vec(),
    }
}

#[test]
fn ask_then_push_completes_the_job() {
    let service = StixDomainEntityService::new(Backends::in_memory().unwrap());
    let user = admin();
    let entity = service
        .add(&user, EntityAddInput::new(EntityType::Malware, "Emotet"))
        .unwrap();

    let job = service
        .export_ask(
            &user,
            ExportRequest::entity(entity.id, ExportFormat::Json, ExportType::Simple),
        )
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let files = service
        .files(&user, FileDirection::Export, EntityType::Malware, Some(entity.id), 10)
        .unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].status, UploadStatus::Progress);
    assert_eq!(files[0].job_id, Some(job.id));

    let done = service
        .export_push(&user, job.id, Some(entity.id), upload("{}"))
        .unwrap();
    assert_eq!(done.status, JobStatus::Complete);

    let files = service
        .files(&user, FileDirection::Export, EntityType::Malware, Some(entity.id), 10)
        .unwrap();
    assert_eq!(files[0].status, UploadStatus::Complete);
    assert_eq!(files[0].size, 2);
    assert_eq!(
        service.file_content(&user, &files[0].id).unwrap(),
        Some(b"{}".to_vec())
    );

    let again = service.export_push(&user, job.id, Some(entity.id), upload("{}"));
    assert!(matches!(again, Err(DomainError::Validation(_))));
}

#[test]
fn push_must_match_job_target() {
    let service = StixDomainEntityService::new(Backends::in_memory().unwrap());
    let user = admin();
    let entity = service
        .add(&user, EntityAddInput::new(EntityType::Tool, "t"))
        .unwrap();
    let job = service
        .export_ask(
            &user,
            ExportRequest::entity(entity.id, ExportFormat::Csv, ExportType::Simple),
        )
        .unwrap();
    assert!(service.export_push(&user, job.id, None, upload("x")).is_err());
    assert_eq!(
        service
            .export_push(&user, JobId::new(), None, upload("x"))
            .unwrap_err()
            .code(),
        "NOT_FOUND"
    );
}

#[test]
fn list_export_needs_a_family_type() {
    let service = StixDomainEntityService::new(Backends::in_memory().unwrap());
    let request = ExportRequest::list(
        EntityType::Tag,
        serde_json::to_value(ListQuery::default()).unwrap(),
        ExportFormat::Json,
        ExportType::Simple,
    );
    assert!(service.export_ask(&admin(), request).is_err());
}

#[test]
fn full_json_export_includes_relations() {
    let service = StixDomainEntityService::new(Backends::in_memory().unwrap());
    let user = admin();
    let actor = service
        .add(&user, EntityAddInput::new(EntityType::ThreatActor, "APT28"))
        .unwrap();
    let malware = service
        .add(&user, EntityAddInput::new(EntityType::Malware, "X-Agent"))
        .unwrap();
    service
        .add_relation(
            &user,
            actor.id,
            &RelationAddInput {
                to_id: malware.id,
                through: "uses".into(),
                first_seen: None,
                last_seen: None,
            },
        )
        .unwrap();
    let job = service
        .export_ask(
            &user,
            ExportRequest::entity(actor.id, ExportFormat::Json, ExportType::Full),
        )
        .unwrap();

    let file = render_export(&service, &job).unwrap();
    let bundle: serde_json::Value = serde_json::from_slice(&file.content).unwrap();
    let types: Vec<&str> = bundle["objects"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["threat-actor", "malware", "relationship"]);
    assert_eq!(bundle["objects"][2]["source_ref"], actor.stix_id.as_str());
}

#[test]
fn csv_list_export_has_one_row_per_entity() {
    let service = StixDomainEntityService::new(Backends::in_memory().unwrap());
    let user = admin();
    for name in ["a, with comma", "b"] {
        service
            .add(&user, EntityAddInput::new(EntityType::Malware, name))
            .unwrap();
    }
    service
        .add(&user, EntityAddInput::new(EntityType::Tool, "other"))
        .unwrap();
    let job = service
        .export_ask(
            &user,
            ExportRequest::list(
                EntityType::Malware,
                serde_json::to_value(ListQuery::default()).unwrap(),
                ExportFormat::Csv,
                ExportType::Simple,
            ),
        )
        .unwrap();
    let file = render_export(&service, &job).unwrap();
    let text = String::from_utf8(file.content).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.contains("\"a, with comma\""));
    assert_eq!(file.mime_type, "text/csv");
}

#[tokio::test]
async fn worker_completes_queued_jobs() {
    let (queue, receiver) = ExportQueue::channel();
    let service =
        StixDomainEntityService::new(Backends::in_memory().unwrap()).with_export_queue(queue);
    let user = admin();
    let entity = service
        .add(&user, EntityAddInput::new(EntityType::Campaign, "c"))
        .unwrap();
    let handle = ExportWorker::new(service.clone(), admin(), receiver).spawn();

    let job = service
        .export_ask(
            &user,
            ExportRequest::entity(entity.id, ExportFormat::Json, ExportType::Simple),
        )
        .unwrap();

    let mut status = JobStatus::Pending;
    for _ in 0..100 {
        status = service.export_job(&user, job.id).unwrap().unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, JobStatus::Complete);
    handle.abort();
}

#[test]
fn back_to_back_asks_keep_their_own_files() {
    let service = StixDomainEntityService::new(Backends::in_memory().unwrap());
    let user = admin();
    let entity = service
        .add(&user, EntityAddInput::new(EntityType::Tool, "Cobalt Strike"))
        .unwrap();

    let mut jobs = Vec::new();
    for _ in 0..20 {
        for _ in 0..2 {
            jobs.push(
                service
                    .export_ask(
                        &user,
                        ExportRequest::entity(entity.id, ExportFormat::Json, ExportType::Simple),
                    )
                    .unwrap(),
            );
        }
    }
    let file_ids: std::collections::HashSet<&str> =
        jobs.iter().map(|job| job.file_id.as_str()).collect();
    assert_eq!(file_ids.len(), jobs.len());

    for (i, job) in jobs.iter().enumerate() {
        service
            .export_push(&user, job.id, Some(entity.id), upload(&i.to_string()))
            .unwrap();
    }
    let files = service
        .files(&user, FileDirection::Export, EntityType::Tool, Some(entity.id), 100)
        .unwrap();
    assert_eq!(files.len(), jobs.len());
    for (i, job) in jobs.iter().enumerate() {
        let content = service.file_content(&user, &job.file_id).unwrap();
        assert_eq!(content, Some(i.to_string().into_bytes()));
    }
}

#[test]
fn a_failed_push_marks_the_job_failed() {
    let service = StixDomainEntityService::new(Backends::in_memory().unwrap());
    let user = admin();
    let entity = service
        .add(&user, EntityAddInput::new(EntityType::Malware, "NotPetya"))
        .unwrap();
    let job = service
        .export_ask(
            &user,
            ExportRequest::entity(entity.id, ExportFormat::Json, ExportType::Simple),
        )
        .unwrap();
    service.backends().files.delete(&job.file_id).unwrap();

    let (_queue, receiver) = ExportQueue::channel();
    let worker = ExportWorker::new(service.clone(), admin(), receiver);
    assert!(matches!(worker.process(job.id), Err(DomainError::NotFound(_))));

    let job = service.export_job(&user, job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.message.is_some());
}

#[tokio::test]
async fn the_worker_resumes_interrupted_jobs() {
    let service = StixDomainEntityService::new(Backends::in_memory().unwrap());
    let user = admin();
    let entity = service
        .add(&user, EntityAddInput::new(EntityType::IntrusionSet, "Turla"))
        .unwrap();
    let job = service
        .export_ask(
            &user,
            ExportRequest::entity(entity.id, ExportFormat::Json, ExportType::Full),
        )
        .unwrap();
    // Left in progress, as after a crash mid-render.
    service.export_started(job.id).unwrap();

    let (queue, receiver) = ExportQueue::channel();
    let handle = ExportWorker::new(service.clone(), admin(), receiver).spawn();

    let mut status = JobStatus::Progress;
    for _ in 0..100 {
        status = service.export_job(&user, job.id).unwrap().unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, JobStatus::Complete);
    drop(queue);
    handle.abort();
}
