//! Imported and exported files, stored with their content.

use crate::codec::{enum_text, parse_enum, parse_ts, ts};
use crate::{IN_MEMORY, StorageError, StorageResult, open_connection};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::{Arc, Mutex, MutexGuard};
use stixgraph_model::{FileDirection, FileMeta, UploadStatus};
use stixgraph_types::{EntityId, EntityType, JobId, UserId};
use tracing::debug;

const FILE_COLUMNS: &str = "id, name, direction, entity_type, entity_id, mime_type, size, status, \
     uploaded_by, uploaded_at, job_id, message";

/// Persistent store for file metadata and content.
#[derive(Clone)]
pub struct FileStore {
    conn: Arc<Mutex<Connection>>,
}

impl FileStore {
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
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                direction TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                status TEXT NOT NULL,
                uploaded_by TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                job_id TEXT,
                message TEXT,
                content BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_owner
                ON files(direction, entity_type, entity_id);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Stores a file, replacing any file with the same id.
    pub fn put(&self, meta: &FileMeta, content: &[u8]) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO files (id, name, direction, entity_type, entity_id, mime_type,
                                          size, status, uploaded_by, uploaded_at, job_id,
                                          message, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                meta.id,
                meta.name,
                enum_text(&meta.direction)?,
                meta.entity_type.as_tag(),
                meta.entity_id.map(|id| id.to_string()),
                meta.mime_type,
                i64::try_from(meta.size).unwrap_or(i64::MAX),
                enum_text(&meta.status)?,
                meta.uploaded_by.to_string(),
                ts(&meta.uploaded_at),
                meta.job_id.map(|id| id.to_string()),
                meta.message,
                content,
            ],
        )?;
        debug!(id = %meta.id, size = meta.size, status = ?meta.status, "stored file");
        Ok(())
    }

    pub fn get(&self, id: &str) -> StorageResult<Option<FileMeta>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
                params![id],
                FileRow::read,
            )
            .optional()?;
        row.map(FileRow::into_meta).transpose()
    }

    pub fn content(&self, id: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row("SELECT content FROM files WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Files of one owner, newest first. `entity_id = None` lists the files
    /// attached to the type itself.
    pub fn list(
        &self,
        direction: FileDirection,
        entity_type: EntityType,
        entity_id: Option<EntityId>,
        first: usize,
    ) -> StorageResult<Vec<FileMeta>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE direction = ?1 AND entity_type = ?2 AND entity_id IS ?3
             ORDER BY uploaded_at DESC, id
             LIMIT ?4"
        ))?;
        let rows = stmt.query_map(
            params![
                enum_text(&direction)?,
                entity_type.as_tag(),
                entity_id.map(|id| id.to_string()),
                i64::try_from(first).unwrap_or(i64::MAX),
            ],
            FileRow::read,
        )?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row?.into_meta()?);
        }
        Ok(files)
    }

    /// Updates the upload status of a file.
    pub fn set_status(
        &self,
        id: &str,
        status: UploadStatus,
        message: Option<&str>,
    ) -> StorageResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE files SET status = ?2, message = ?3 WHERE id = ?1",
            params![id, enum_text(&status)?, message],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("file {id}")));
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM files WHERE id = ?1", params![id])? > 0)
    }
}

struct FileRow {
    id: String,
    name: String,
    direction: String,
    entity_type: String,
    entity_id: Option<String>,
    mime_type: String,
    size: i64,
    status: String,
    uploaded_by: String,
    uploaded_at: String,
    job_id: Option<String>,
    message: Option<String>,
}

impl FileRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            direction: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            mime_type: row.get(5)?,
            size: row.get(6)?,
            status: row.get(7)?,
            uploaded_by: row.get(8)?,
            uploaded_at: row.get(9)?,
            job_id: row.get(10)?,
            message: row.get(11)?,
        })
    }

    fn into_meta(self) -> StorageResult<FileMeta> {
        let entity_type = EntityType::from_tag(&self.entity_type).ok_or_else(|| {
            StorageError::InvalidData(format!("unknown entity type: {}", self.entity_type))
        })?;
        Ok(FileMeta {
            id: self.id,
            name: self.name,
            direction: parse_enum(&self.direction)?,
            entity_type,
            entity_id: self.entity_id.as_deref().map(EntityId::parse).transpose()?,
            mime_type: self.mime_type,
            size: u64::try_from(self.size).unwrap_or(0),
            status: parse_enum(&self.status)?,
            uploaded_by: UserId::parse(&self.uploaded_by)?,
            uploaded_at: parse_ts(&self.uploaded_at)?,
            job_id: self.job_id.as_deref().map(JobId::parse).transpose()?,
            message: self.message,
        })
    }
}
