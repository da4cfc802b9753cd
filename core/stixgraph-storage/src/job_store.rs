//! Export jobs and their status transitions.

use crate::codec::{enum_text, parse_enum, parse_ts, ts};
use crate::{IN_MEMORY, StorageError, StorageResult, open_connection};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::{Arc, Mutex, MutexGuard};
use stixgraph_model::{ExportJob, JobStatus};
use stixgraph_types::{EntityType, JobId, UserId};
use tracing::{debug, info};

const JOB_COLUMNS: &str = "id, scope, entity_type, format, export_type, status, file_id, \
     requested_by, created_at, updated_at, message";

/// Persistent store for export jobs.
#[derive(Clone)]
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

impl JobStore {
    pub fn open(path: &str) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(open_connection(path)?)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Self::open(IN_MEMORY)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS export_jobs (
                id TEXT PRIMARY KEY,
                scope TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                format TEXT NOT NULL,
                export_type TEXT NOT NULL,
                status TEXT NOT NULL,
                file_id TEXT NOT NULL,
                requested_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_export_jobs_status ON export_jobs(status, created_at);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn insert(&self, job: &ExportJob) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO export_jobs (id, scope, entity_type, format, export_type, status, file_id,
                                      requested_by, created_at, updated_at, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                job.id.to_string(),
                serde_json::to_string(&job.scope)?,
                job.entity_type.as_tag(),
                enum_text(&job.format)?,
                enum_text(&job.export_type)?,
                enum_text(&job.status)?,
                job.file_id,
                job.requested_by.to_string(),
                ts(&job.created_at),
                ts(&job.updated_at),
                job.message,
            ],
        )?;
        info!(job = %job.id, file = %job.file_id, "export job registered");
        Ok(())
    }

    pub fn get(&self, id: JobId) -> StorageResult<Option<ExportJob>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM export_jobs WHERE id = ?1"),
                params![id.to_string()],
                JobRow::read,
            )
            .optional()?;
        row.map(JobRow::into_job).transpose()
    }

    /// Moves a job to `status`. Illegal transitions are rejected with
    /// [`StorageError::InvalidData`].
    pub fn transition(
        &self,
        id: JobId,
        status: JobStatus,
        message: Option<&str>,
    ) -> StorageResult<ExportJob> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let row = tx
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM export_jobs WHERE id = ?1"),
                params![id.to_string()],
                JobRow::read,
            )
            .optional()?;
        let mut job = row
            .map(JobRow::into_job)
            .transpose()?
            .ok_or_else(|| StorageError::NotFound(format!("export job {id}")))?;
        if !job.status.can_move_to(status) {
            return Err(StorageError::InvalidData(format!(
                "export job {id} cannot move from {:?} to {status:?}",
                job.status
            )));
        }
        job.status = status;
        job.updated_at = Utc::now();
        job.message = message.map(str::to_string);
        tx.execute(
            "UPDATE export_jobs SET status = ?2, updated_at = ?3, message = ?4 WHERE id = ?1",
            params![
                id.to_string(),
                enum_text(&job.status)?,
                ts(&job.updated_at),
                job.message,
            ],
        )?;
        tx.commit()?;
        debug!(job = %id, status = ?status, "export job moved");
        Ok(job)
    }

    /// Jobs in `status`, oldest first.
    pub fn with_status(&self, status: JobStatus) -> StorageResult<Vec<ExportJob>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM export_jobs WHERE status = ?1 ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map(params![enum_text(&status)?], JobRow::read)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?.into_job()?);
        }
        Ok(jobs)
    }
}

struct JobRow {
    id: String,
    scope: String,
    entity_type: String,
    format: String,
    export_type: String,
    status: String,
    file_id: String,
    requested_by: String,
    created_at: String,
    updated_at: String,
    message: Option<String>,
}

impl JobRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            scope: row.get(1)?,
            entity_type: row.get(2)?,
            format: row.get(3)?,
            export_type: row.get(4)?,
            status: row.get(5)?,
            file_id: row.get(6)?,
            requested_by: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            message: row.get(10)?,
        })
    }

    fn into_job(self) -> StorageResult<ExportJob> {
        let entity_type = EntityType::from_tag(&self.entity_type).ok_or_else(|| {
            StorageError::InvalidData(format!("unknown entity type: {}", self.entity_type))
        })?;
        Ok(ExportJob {
            id: JobId::parse(&self.id)?,
            scope: serde_json::from_str(&self.scope)?,
            entity_type,
            format: parse_enum(&self.format)?,
            export_type: parse_enum(&self.export_type)?,
            status: parse_enum(&self.status)?,
            file_id: self.file_id,
            requested_by: UserId::parse(&self.requested_by)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            message: self.message,
        })
    }
}
