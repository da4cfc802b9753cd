//! Export rendering and the in-process exporter.
//!
//! An export ask only registers a job; the [`ExportWorker`] picks job ids off
//! the [`ExportQueue`], renders the artifact and pushes it back through the
//! regular `export_push` path, so a job pushed by an external connector and a
//! job rendered here end in the same state.

use crate::{DomainError, DomainResult, StixDomainEntityService};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use stixgraph_model::{
    Entity, ExportFormat, ExportJob, ExportScope, ExportType, FileUpload, JobStatus, ListQuery,
    Relation, User,
};
use stixgraph_types::{EntityId, JobId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Page size used when walking a list export.
const EXPORT_BATCH: usize = 500;

/// Sending half of the export queue.
#[derive(Clone, Debug)]
pub struct ExportQueue(mpsc::UnboundedSender<JobId>);

impl ExportQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobId>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self(sender), receiver)
    }

    /// Returns `false` when the worker is gone.
    pub fn enqueue(&self, job_id: JobId) -> bool {
        self.0.send(job_id).is_ok()
    }
}

/// Consumes the export queue.
pub struct ExportWorker {
    service: StixDomainEntityService,
    identity: User,
    receiver: mpsc::UnboundedReceiver<JobId>,
}

impl ExportWorker {
    /// `identity` is the user exports are pushed as; it needs the export
    /// capability.
    pub fn new(
        service: StixDomainEntityService,
        identity: User,
        receiver: mpsc::UnboundedReceiver<JobId>,
    ) -> Self {
        Self {
            service,
            identity,
            receiver,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Finishes jobs a previous run left behind, then processes the queue
    /// until every sender is dropped. Jobs caught in `progress` by a crash are
    /// rendered again; pending ones go through the normal path.
    pub async fn run(mut self) {
        match self.service.backends().jobs.with_status(JobStatus::Progress) {
            Ok(stale) => {
                for job in stale {
                    info!(job = %job.id, "resuming interrupted export");
                    let job_id = job.id;
                    log_outcome(job_id, self.deliver(job));
                }
            }
            Err(err) => warn!(error = %err, "could not load interrupted export jobs"),
        }
        match self.service.backends().jobs.with_status(JobStatus::Pending) {
            Ok(pending) => {
                for job in pending {
                    log_outcome(job.id, self.process(job.id));
                }
            }
            Err(err) => warn!(error = %err, "could not load pending export jobs"),
        }
        while let Some(job_id) = self.receiver.recv().await {
            log_outcome(job_id, self.process(job_id));
        }
        info!("export worker stopped");
    }

    /// Renders and delivers one pending job.
    pub fn process(&self, job_id: JobId) -> DomainResult<ExportJob> {
        let job = self.service.export_started(job_id)?;
        self.deliver(job)
    }

    /// Renders and pushes a job already in `progress`. Any failure marks the
    /// job and its file as failed so it never stays in `progress`.
    fn deliver(&self, job: ExportJob) -> DomainResult<ExportJob> {
        debug!(job = %job.id, format = %job.format, "rendering export");
        let delivered = render_export(&self.service, &job).and_then(|file| {
            self.service
                .export_push(&self.identity, job.id, job.entity_id(), file)
        });
        if let Err(err) = &delivered {
            if let Err(mark) = self.service.export_failed(job.id, &err.to_string()) {
                warn!(job = %job.id, error = %mark, "could not mark export as failed");
            }
        }
        delivered
    }
}

fn log_outcome(job_id: JobId, outcome: DomainResult<ExportJob>) {
    if let Err(err) = outcome {
        warn!(job = %job_id, error = %err, "export job not completed");
    }
}

/// Renders the artifact of `job`.
pub fn render_export(service: &StixDomainEntityService, job: &ExportJob) -> DomainResult<FileUpload> {
    let entities = service.backends().entities.clone();
    let mut objects: Vec<Entity> = Vec::new();
    match &job.scope {
        ExportScope::Entity { entity_id } => {
            let entity = entities
                .get_entity(*entity_id)?
                .ok_or_else(|| DomainError::NotFound(format!("stix domain entity {entity_id}")))?;
            objects.push(entity);
        }
        ExportScope::List { list_args } => {
            let mut query: ListQuery = serde_json::from_value(list_args.clone())?;
            query.types = vec![job.entity_type];
            query.first = EXPORT_BATCH;
            query.offset = 0;
            loop {
                let page = entities.list_entities(&query)?;
                let done = !page.has_next_page() || page.items.is_empty();
                query.offset += page.items.len();
                objects.extend(page.items);
                if done {
                    break;
                }
            }
        }
    }

    let mut relations: Vec<Relation> = Vec::new();
    if job.export_type == ExportType::Full {
        let mut seen: HashSet<EntityId> = objects.iter().map(|e| e.id).collect();
        let roots: Vec<EntityId> = objects.iter().map(|e| e.id).collect();
        for id in roots {
            for relation in entities.relations_of(id, None)? {
                if let Some(other) = relation.other_end(id) {
                    if seen.insert(other) {
                        if let Some(entity) = entities.get_entity(other)? {
                            objects.push(entity);
                        }
                    }
                }
                if !relations.iter().any(|r| r.id == relation.id) {
                    relations.push(relation);
                }
            }
        }
    }

    let content = match job.format {
        ExportFormat::Json => json_bundle(&objects, &relations)?,
        ExportFormat::Csv => csv_table(&objects)?,
    };
    let name = job
        .file_id
        .rsplit('/')
        .next()
        .unwrap_or(job.file_id.as_str())
        .to_string();
    Ok(FileUpload {
        name,
        mime_type: job.format.mime_type().to_string(),
        content,
    })
}

fn stix_object(entity: &Entity) -> Value {
    let mut object = serde_json::Map::new();
    if let Value::Object(data) = &entity.data {
        object.extend(data.clone());
    }
    object.insert("id".into(), json!(entity.stix_id));
    object.insert("type".into(), json!(entity.entity_type));
    object.insert("name".into(), json!(entity.name));
    if let Some(description) = &entity.description {
        object.insert("description".into(), json!(description));
    }
    object.insert("created".into(), json!(entity.created));
    object.insert("modified".into(), json!(entity.modified));
    object.insert("x_internal_id".into(), json!(entity.id));
    Value::Object(object)
}

fn json_bundle(objects: &[Entity], relations: &[Relation]) -> DomainResult<Vec<u8>> {
    let stix_ids: HashMap<EntityId, &str> = objects
        .iter()
        .map(|e| (e.id, e.stix_id.as_str()))
        .collect();
    let mut items: Vec<Value> = objects.iter().map(stix_object).collect();
    for relation in relations {
        let (Some(source), Some(target)) =
            (stix_ids.get(&relation.from_id), stix_ids.get(&relation.to_id))
        else {
            continue;
        };
        items.push(json!({
            "id": format!("relationship--{}", relation.id),
            "type": "relationship",
            "relationship_type": relation.relation_type,
            "source_ref": source,
            "target_ref": target,
            "created": relation.created_at,
        }));
    }
    let bundle = json!({
        "type": "bundle",
        "id": format!("bundle--{}", uuid::Uuid::new_v4()),
        "objects": items,
    });
    Ok(serde_json::to_vec_pretty(&bundle)?)
}

fn csv_table(objects: &[Entity]) -> DomainResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |err: csv::Error| DomainError::Export(format!("csv export failed: {err}"));
    writer
        .write_record(["id", "stix_id", "type", "name", "description", "created", "modified"])
        .map_err(csv_err)?;
    for entity in objects {
        writer
            .write_record([
                entity.id.to_string(),
                entity.stix_id.clone(),
                entity.entity_type.clone(),
                entity.name.clone(),
                entity.description.clone().unwrap_or_default(),
                entity.created.to_rfc3339(),
                entity.modified.to_rfc3339(),
            ])
            .map_err(csv_err)?;
    }
    writer
        .into_inner()
        .map_err(|err| DomainError::Export(format!("csv export failed: {err}")))
}
