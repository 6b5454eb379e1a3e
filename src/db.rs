//! The Catalog Store (§4.A). A thin wrapper over a `sqlx` sqlite pool —
//! every write path beyond this module goes through one transaction per
//! logical operation, never holding a connection across an `.await` that
//! isn't part of that transaction (§5).

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::models::{
    FileRecord, FileSyncStatus, ProgressStage, SyncCounters, SyncOperation, SyncOperationType, SyncStatus, Tenant,
};

#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Schema bootstrap is out of the core's scope (§1), but a runnable
    /// service still needs the schema to exist; this is ambient plumbing.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn tenant_by_api_key(&self, api_key: &str) -> sqlx::Result<Option<Tenant>> {
        let row = sqlx::query("SELECT slug, display_name, api_key, created_at FROM tenants WHERE api_key = ?")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_tenant(&r)))
    }

    pub async fn tenant_by_slug(&self, slug: &str) -> sqlx::Result<Option<Tenant>> {
        let row = sqlx::query("SELECT slug, display_name, api_key, created_at FROM tenants WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_tenant(&r)))
    }

    pub async fn list_tenants(&self) -> sqlx::Result<Vec<Tenant>> {
        let rows = sqlx::query("SELECT slug, display_name, api_key, created_at FROM tenants ORDER BY slug")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_tenant).collect())
    }

    pub async fn upsert_tenant(&self, tenant: &Tenant) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO tenants (slug, display_name, api_key, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(slug) DO UPDATE SET display_name = excluded.display_name, api_key = excluded.api_key",
        )
        .bind(&tenant.slug)
        .bind(&tenant.display_name)
        .bind(&tenant.api_key)
        .bind(tenant.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Non-deleted files for a tenant, the change detector's `db_map` input (§4.C).
    pub async fn live_files_for_tenant(&self, tenant_slug: &str) -> sqlx::Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            "SELECT id, tenant_slug, filename, relative_path, size_bytes, content_hash, mime_type,
                    sync_status, sync_started_at, sync_completed_at, sync_error,
                    created_at, updated_at, deleted_at
             FROM files WHERE tenant_slug = ? AND deleted_at IS NULL",
        )
        .bind(tenant_slug)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_file).collect())
    }

    pub async fn files_for_tenant_paginated(
        &self,
        tenant_slug: &str,
        limit: i64,
        offset: i64,
    ) -> sqlx::Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            "SELECT id, tenant_slug, filename, relative_path, size_bytes, content_hash, mime_type,
                    sync_status, sync_started_at, sync_completed_at, sync_error,
                    created_at, updated_at, deleted_at
             FROM files WHERE tenant_slug = ? AND deleted_at IS NULL
             ORDER BY relative_path LIMIT ? OFFSET ?",
        )
        .bind(tenant_slug)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_file).collect())
    }

    pub async fn file_status_counts(&self, tenant_slug: &str) -> sqlx::Result<FileStatusCounts> {
        let row = sqlx::query(
            "SELECT
                SUM(CASE WHEN sync_status = 'pending' THEN 1 ELSE 0 END) AS pending,
                SUM(CASE WHEN sync_status = 'processing' THEN 1 ELSE 0 END) AS processing,
                SUM(CASE WHEN sync_status = 'failed' THEN 1 ELSE 0 END) AS failed,
                SUM(CASE WHEN sync_status = 'synced' THEN 1 ELSE 0 END) AS synced,
                COUNT(*) AS total
             FROM files WHERE tenant_slug = ? AND deleted_at IS NULL",
        )
        .bind(tenant_slug)
        .fetch_one(&self.pool)
        .await?;

        Ok(FileStatusCounts {
            pending: row.try_get::<Option<i64>, _>("pending")?.unwrap_or(0),
            processing: row.try_get::<Option<i64>, _>("processing")?.unwrap_or(0),
            failed: row.try_get::<Option<i64>, _>("failed")?.unwrap_or(0),
            synced: row.try_get::<Option<i64>, _>("synced")?.unwrap_or(0),
            total: row.try_get("total")?,
        })
    }

    pub async fn running_sync_for_tenant(&self, tenant_slug: &str) -> sqlx::Result<Option<SyncOperation>> {
        let row = sqlx::query(
            "SELECT * FROM sync_operations WHERE tenant_slug = ? AND status = 'running'
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(tenant_slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_sync_operation))
    }

    pub async fn latest_sync_for_tenant(&self, tenant_slug: &str) -> sqlx::Result<Option<SyncOperation>> {
        let row = sqlx::query(
            "SELECT * FROM sync_operations WHERE tenant_slug = ? ORDER BY started_at DESC LIMIT 1",
        )
        .bind(tenant_slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_sync_operation))
    }

    pub async fn sync_history_for_tenant(&self, tenant_slug: &str, limit: i64) -> sqlx::Result<Vec<SyncOperation>> {
        let rows = sqlx::query("SELECT * FROM sync_operations WHERE tenant_slug = ? ORDER BY started_at DESC LIMIT ?")
            .bind(tenant_slug)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_sync_operation).collect())
    }

    pub async fn running_syncs_older_than(&self, heartbeat_before: DateTime<Utc>) -> sqlx::Result<Vec<SyncOperation>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_operations WHERE status = 'running'
             AND (heartbeat_at IS NULL OR heartbeat_at < ?)",
        )
        .bind(heartbeat_before.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_sync_operation).collect())
    }

    pub async fn all_running_syncs(&self) -> sqlx::Result<Vec<SyncOperation>> {
        let rows = sqlx::query("SELECT * FROM sync_operations WHERE status = 'running'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_sync_operation).collect())
    }

    pub async fn insert_sync_operation(&self, op: &SyncOperation) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO sync_operations
                (id, tenant_slug, operation_type, status, started_at, heartbeat_at,
                 expected_duration_seconds, progress_stage, progress_percentage,
                 total_files_to_process, current_file_index)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(op.id.to_string())
        .bind(&op.tenant_slug)
        .bind(operation_type_str(op.operation_type))
        .bind(op.status.as_str())
        .bind(op.started_at.to_rfc3339())
        .bind(op.heartbeat_at.map(|t| t.to_rfc3339()))
        .bind(op.expected_duration_seconds)
        .bind(op.progress_stage.as_str())
        .bind(op.progress_percentage)
        .bind(op.total_files_to_process)
        .bind(op.current_file_index)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn touch_heartbeat(&self, sync_id: Uuid) -> sqlx::Result<()> {
        sqlx::query("UPDATE sync_operations SET heartbeat_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(sync_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_sync_progress(
        &self,
        sync_id: Uuid,
        stage: ProgressStage,
        percentage: f64,
        current_file_index: i64,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE sync_operations SET progress_stage = ?, progress_percentage = ?,
                                         current_file_index = ?, heartbeat_at = ? WHERE id = ?",
        )
        .bind(stage.as_str())
        .bind(percentage)
        .bind(current_file_index)
        .bind(Utc::now().to_rfc3339())
        .bind(sync_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn complete_sync_operation(&self, sync_id: Uuid, counters: &SyncCounters) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE sync_operations SET status = 'completed', completed_at = ?, progress_stage = 'completed',
                                         progress_percentage = 100.0, heartbeat_at = ?,
                                         files_added = ?, files_updated = ?, files_deleted = ?,
                                         chunks_created = ?, chunks_deleted = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(counters.files_added)
        .bind(counters.files_updated)
        .bind(counters.files_deleted)
        .bind(counters.chunks_created)
        .bind(counters.chunks_deleted)
        .bind(sync_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fails a running `SyncOperation` and, in the same transaction,
    /// demotes any of the tenant's files still left in `processing` back
    /// to `pending` (§4.H cleanup supervisor, §4.L, §7 `TimeoutError`/
    /// `StuckError`) — they belong to the operation that just died, since
    /// the per-tenant single-writer lock guarantees no other operation
    /// could have put them there.
    pub async fn fail_sync_operation(
        &self,
        sync_id: Uuid,
        tenant_slug: &str,
        error_message: &str,
        counters: &SyncCounters,
    ) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE sync_operations SET status = 'failed', completed_at = ?, progress_stage = 'failed',
                                         error_message = ?, heartbeat_at = ?,
                                         files_added = ?, files_updated = ?, files_deleted = ?,
                                         chunks_created = ?, chunks_deleted = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(error_message)
        .bind(&now)
        .bind(counters.files_added)
        .bind(counters.files_updated)
        .bind(counters.files_deleted)
        .bind(counters.chunks_created)
        .bind(counters.chunks_deleted)
        .bind(sync_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE files SET sync_status = 'pending', updated_at = ? WHERE tenant_slug = ? AND sync_status = 'processing'")
            .bind(&now)
            .bind(tenant_slug)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_catalog() -> Catalog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Catalog::from_pool(pool)
    }

    /// S5 — a sync that dies mid-flight (stuck detection or a timeout)
    /// leaves no file permanently wedged in `processing`; failing the
    /// operation demotes them back to `pending` so the next sync picks
    /// them back up.
    #[tokio::test]
    async fn failing_a_sync_demotes_its_tenants_processing_files_to_pending() {
        let catalog = test_catalog().await;
        catalog
            .upsert_tenant(&Tenant {
                slug: "acme".into(),
                display_name: "Acme".into(),
                api_key: "acme-key".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let mut tx = Persistence::begin(catalog.pool()).await.unwrap();
        let file = Persistence::insert_file(&mut tx, "acme", "doc.txt", "h1", 4, "text/plain")
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(file.sync_status, FileSyncStatus::Processing);

        let sync_id = Uuid::new_v4();
        let op = SyncOperation {
            id: sync_id,
            tenant_slug: "acme".into(),
            operation_type: SyncOperationType::Delta,
            status: SyncStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            heartbeat_at: Some(Utc::now()),
            expected_duration_seconds: 30,
            progress_stage: ProgressStage::ProcessingFiles,
            progress_percentage: 10.0,
            total_files_to_process: 1,
            current_file_index: 0,
            counters: SyncCounters::default(),
            error_message: None,
        };
        catalog.insert_sync_operation(&op).await.unwrap();

        catalog
            .fail_sync_operation(sync_id, "acme", "operation marked as stuck by cleanup job", &op.counters)
            .await
            .unwrap();

        let files = catalog.live_files_for_tenant("acme").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].sync_status, FileSyncStatus::Pending);

        let failed_op = catalog.latest_sync_for_tenant("acme").await.unwrap().unwrap();
        assert_eq!(failed_op.status, SyncStatus::Failed);
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FileStatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
    pub synced: i64,
    pub total: i64,
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_ts(&s))
}

fn row_to_tenant(row: &sqlx::sqlite::SqliteRow) -> Tenant {
    Tenant {
        slug: row.get("slug"),
        display_name: row.get("display_name"),
        api_key: row.get("api_key"),
        created_at: parse_ts(&row.get::<String, _>("created_at")),
    }
}

pub(crate) fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> FileRecord {
    FileRecord {
        id: row.get::<String, _>("id").parse().unwrap_or_default(),
        tenant_slug: row.get("tenant_slug"),
        filename: row.get("filename"),
        relative_path: row.get("relative_path"),
        size_bytes: row.get("size_bytes"),
        content_hash: row.get("content_hash"),
        mime_type: row.get("mime_type"),
        sync_status: FileSyncStatus::parse(&row.get::<String, _>("sync_status")),
        sync_started_at: parse_ts_opt(row.get("sync_started_at")),
        sync_completed_at: parse_ts_opt(row.get("sync_completed_at")),
        sync_error: row.get("sync_error"),
        created_at: parse_ts(&row.get::<String, _>("created_at")),
        updated_at: parse_ts(&row.get::<String, _>("updated_at")),
        deleted_at: parse_ts_opt(row.get("deleted_at")),
    }
}

fn operation_type_str(kind: SyncOperationType) -> &'static str {
    match kind {
        SyncOperationType::Delta => "delta",
        SyncOperationType::Full => "full",
    }
}

fn parse_operation_type(s: &str) -> SyncOperationType {
    match s {
        "full" => SyncOperationType::Full,
        _ => SyncOperationType::Delta,
    }
}

fn parse_sync_status(s: &str) -> SyncStatus {
    match s {
        "completed" => SyncStatus::Completed,
        "failed" => SyncStatus::Failed,
        "cancelled" => SyncStatus::Cancelled,
        _ => SyncStatus::Running,
    }
}

fn parse_progress_stage(s: &str) -> ProgressStage {
    match s {
        "detecting_changes" => ProgressStage::DetectingChanges,
        "processing_files" => ProgressStage::ProcessingFiles,
        "finalizing" => ProgressStage::Finalizing,
        "completed" => ProgressStage::Completed,
        "failed" => ProgressStage::Failed,
        _ => ProgressStage::Initializing,
    }
}

fn row_to_sync_operation(row: &sqlx::sqlite::SqliteRow) -> SyncOperation {
    SyncOperation {
        id: row.get::<String, _>("id").parse().unwrap_or_default(),
        tenant_slug: row.get("tenant_slug"),
        operation_type: parse_operation_type(&row.get::<String, _>("operation_type")),
        status: parse_sync_status(&row.get::<String, _>("status")),
        started_at: parse_ts(&row.get::<String, _>("started_at")),
        completed_at: parse_ts_opt(row.get("completed_at")),
        heartbeat_at: parse_ts_opt(row.get("heartbeat_at")),
        expected_duration_seconds: row.get("expected_duration_seconds"),
        progress_stage: parse_progress_stage(&row.get::<String, _>("progress_stage")),
        progress_percentage: row.get("progress_percentage"),
        total_files_to_process: row.get("total_files_to_process"),
        current_file_index: row.get("current_file_index"),
        counters: SyncCounters {
            files_added: row.get("files_added"),
            files_updated: row.get("files_updated"),
            files_deleted: row.get("files_deleted"),
            chunks_created: row.get("chunks_created"),
            chunks_deleted: row.get("chunks_deleted"),
        },
        error_message: row.get("error_message"),
    }
}
