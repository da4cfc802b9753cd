//! Import/export artifacts and the export jobs that produce them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use stixgraph_types::{EntityId, EntityType, JobId, UserId};

/// Segment used in file ids for files attached to a type rather than an entity.
const LIST_SEGMENT: &str = "list";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileDirection {
    Import,
    Export,
}

impl FileDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            FileDirection::Import => "import",
            FileDirection::Export => "export",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Progress,
    Complete,
    Error,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Progress => "progress",
            UploadStatus::Complete => "complete",
            UploadStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "progress" => Some(UploadStatus::Progress),
            "complete" => Some(UploadStatus::Complete),
            "error" => Some(UploadStatus::Error),
            _ => None,
        }
    }
}

/// Metadata of a stored file. The content lives next to it in the file store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    /// `<direction>/<entity_type>/<entity id or "list">/<name>`.
    pub id: String,
    pub name: String,
    pub direction: FileDirection,
    pub entity_type: EntityType,
    #[serde(default)]
    pub entity_id: Option<EntityId>,
    pub mime_type: String,
    pub size: u64,
    pub status: UploadStatus,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
    /// Export job this file belongs to, for export placeholders.
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub message: Option<String>,
}

impl FileMeta {
    pub fn file_id(
        direction: FileDirection,
        entity_type: EntityType,
        entity_id: Option<EntityId>,
        name: &str,
    ) -> String {
        let owner = entity_id.map_or_else(|| LIST_SEGMENT.to_string(), |id| id.to_string());
        format!("{}/{}/{}/{}", direction.as_str(), entity_type.as_tag(), owner, name)
    }
}

/// An uploaded file as received from a client.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "text/csv")]
    Csv,
}

impl ExportFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    /// Accepts the mime type or the file extension.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "application/json" | "json" => Ok(ExportFormat::Json),
            "text/csv" | "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unsupported export format: {other}")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// `simple` exports the entity alone; `full` includes its relations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportType {
    #[default]
    Simple,
    Full,
}

impl ExportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportType::Simple => "simple",
            ExportType::Full => "full",
        }
    }
}

impl FromStr for ExportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(ExportType::Simple),
            "full" => Ok(ExportType::Full),
            other => Err(format!("unsupported export type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportScope {
    Entity { entity_id: EntityId },
    /// Serialized list arguments, replayed by the exporter.
    List { list_args: serde_json::Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Progress,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }

    /// Allowed moves: pending → progress → complete | error, and pending
    /// straight to complete or error.
    pub fn can_move_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Progress) => true,
            (JobStatus::Pending | JobStatus::Progress, JobStatus::Complete | JobStatus::Error) => {
                true
            }
            _ => false,
        }
    }
}

/// A two-phase export: registered by an ask, completed by a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: JobId,
    pub scope: ExportScope,
    pub entity_type: EntityType,
    pub format: ExportFormat,
    pub export_type: ExportType,
    pub status: JobStatus,
    /// The placeholder file the push will fill.
    pub file_id: String,
    pub requested_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ExportJob {
    pub fn entity_id(&self) -> Option<EntityId> {
        match &self.scope {
            ExportScope::Entity { entity_id } => Some(*entity_id),
            ExportScope::List { .. } => None,
        }
    }

    /// File name for an export produced now:
    /// `<timestamp>_<subject>_<type>_<job id>.<ext>`. The job id keeps two
    /// exports asked in the same millisecond apart.
    pub fn file_name(
        job_id: JobId,
        subject: &str,
        export_type: ExportType,
        format: ExportFormat,
    ) -> String {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let subject: String = subject
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!(
            "{stamp}_{subject}_{}_{}.{}",
            export_type.as_str(),
            job_id.as_uuid().simple(),
            format.extension()
        )
    }
}
