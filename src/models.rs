//! Core entities (§3). Timestamps are UTC; identifiers are UUIDs unless
//! stated otherwise, mirroring the teacher's `repo::types` shape
//! (`RepoRef`/`Repository`/`SyncStatus`) generalized from one repo-per-row
//! to one tenant-owning-many-files-and-chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub slug: String,
    pub display_name: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSyncStatus {
    Pending,
    Processing,
    Synced,
    Failed,
}

impl FileSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "synced" => Self::Synced,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: uuid::Uuid,
    pub tenant_slug: String,
    pub filename: String,
    pub relative_path: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub mime_type: String,
    pub sync_status: FileSyncStatus,
    pub sync_started_at: Option<DateTime<Utc>>,
    pub sync_completed_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: uuid::Uuid,
    pub file_id: uuid::Uuid,
    pub tenant_slug: String,
    pub chunk_index: i64,
    pub text: String,
    pub text_hash: String,
    pub token_count: i64,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationType {
    Delta,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Initializing,
    DetectingChanges,
    ProcessingFiles,
    Finalizing,
    Completed,
    Failed,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::DetectingChanges => "detecting_changes",
            Self::ProcessingFiles => "processing_files",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncCounters {
    pub files_added: i64,
    pub files_updated: i64,
    pub files_deleted: i64,
    pub chunks_created: i64,
    pub chunks_deleted: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOperation {
    pub id: uuid::Uuid,
    pub tenant_slug: String,
    pub operation_type: SyncOperationType,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub expected_duration_seconds: i64,
    pub progress_stage: ProgressStage,
    pub progress_percentage: f64,
    pub total_files_to_process: i64,
    pub current_file_index: i64,
    #[serde(flatten)]
    pub counters: SyncCounters,
    pub error_message: Option<String>,
}

/// A single item in a `SyncPlan`. Tagged variants, not a class hierarchy
/// (§9) — each kind carries only the fields relevant to it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChange {
    Created {
        relative_path: String,
        new_hash: String,
        size_bytes: i64,
    },
    Updated {
        relative_path: String,
        file_id: uuid::Uuid,
        old_hash: String,
        new_hash: String,
        size_bytes: i64,
    },
    Deleted {
        relative_path: String,
        file_id: uuid::Uuid,
        old_hash: String,
    },
}

impl FileChange {
    pub fn relative_path(&self) -> &str {
        match self {
            Self::Created { relative_path, .. }
            | Self::Updated { relative_path, .. }
            | Self::Deleted { relative_path, .. } => relative_path,
        }
    }
}

/// The in-memory output of the change detector (§4.C). Never persisted —
/// recomputed on every sync request, never resumed.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub changes: Vec<FileChange>,
}

impl SyncPlan {
    pub fn total_changes(&self) -> usize {
        self.changes.len()
    }
}

/// A scanner observation of one regular file beneath a tenant root,
/// relative-path-and-hash only — the scanner holds no locks, no open
/// handles, just a value snapshot (§5).
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub relative_path: String,
    pub size_bytes: i64,
    pub content_hash: String,
}
