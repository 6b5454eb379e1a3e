//! The Sync Operations Manager (§4.H). Grounded in the original service's
//! `services/sync_operations_manager.py`: a running sync per tenant, a
//! heartbeat that keeps `heartbeat_at` fresh while work proceeds, an
//! adaptive timeout sized to the plan, and a stuck-operation sweep the
//! supervisor drives on an interval. Per-tenant serialization is an
//! in-process `tokio::sync::Mutex` registered in an `scc::HashMap`, the
//! same registry shape the teacher's `bg_poll::background_polling` keeps
//! one join handle per repo in.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::config::Configuration;
use crate::change_detector::ChangeDetector;
use crate::chunker::Chunker;
use crate::db::{Catalog, FileStatusCounts};
use crate::embedding::{Embedder, EmbeddingBatcher};
use crate::error::ApiError;
use crate::extractor::TextExtractor;
use crate::models::{
    FileChange, FileSyncStatus, ProgressStage, ScannedFile, SyncCounters, SyncOperation, SyncOperationType,
    SyncStatus,
};
use crate::persistence::Persistence;
use crate::scanner::FilesystemScanner;

pub struct SyncManager {
    catalog: Catalog,
    config: Arc<Configuration>,
    embedder: Arc<dyn Embedder>,
    tenant_locks: scc::HashMap<String, Arc<Mutex<()>>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncRequestOutcome {
    Started {
        sync_id: Uuid,
        expected_duration_seconds: i64,
        total_files: i64,
    },
    Conflict {
        sync_id: Uuid,
        stage: ProgressStage,
        percentage: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusView {
    pub latest_sync: Option<SyncOperation>,
    pub file_status: FileStatusCounts,
}

impl SyncManager {
    pub fn new(catalog: Catalog, config: Arc<Configuration>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            catalog,
            config,
            embedder,
            tenant_locks: scc::HashMap::new(),
        }
    }

    fn tenant_lock(&self, tenant_slug: &str) -> Arc<Mutex<()>> {
        match self.tenant_locks.entry_sync(tenant_slug.to_owned()) {
            scc::hash_map::Entry::Occupied(existing) => existing.get().clone(),
            scc::hash_map::Entry::Vacant(vacant) => {
                let lock = Arc::new(Mutex::new(()));
                vacant.insert_entry(lock.clone());
                lock
            }
        }
    }

    /// Request a sync for `tenant_slug`. The per-tenant advisory lock is
    /// non-blocking here: a concurrent trigger for a tenant that is
    /// already being written to does not queue behind the running sync,
    /// it reports a `conflict` immediately, per §5 ("concurrent requests
    /// during a running op receive a conflict response"). Once acquired,
    /// the lock is held for the rest of this sync's execution (including
    /// the spawned background work), enforcing single-writer-per-tenant.
    pub async fn request_sync(&self, tenant_slug: &str, force_full_sync: bool) -> Result<SyncRequestOutcome, ApiError> {
        let lock = self.tenant_lock(tenant_slug);
        let guard = match lock.try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => return self.conflict_response(tenant_slug).await,
        };

        if let Some(running) = self.catalog.running_sync_for_tenant(tenant_slug).await? {
            if self.is_stuck(&running) {
                warn!(sync_id = %running.id, tenant = tenant_slug, "reclaiming stuck sync before starting a new one");
                self.catalog
                    .fail_sync_operation(running.id, tenant_slug, "detected as stuck, starting new sync", &running.counters)
                    .await?;
            } else {
                // The lock was free but the catalog still shows a running
                // row (e.g. a previous process holding the lock crashed
                // without updating it yet) — treat it the same as a live
                // conflict rather than racing a second writer in.
                return Ok(SyncRequestOutcome::Conflict {
                    sync_id: running.id,
                    stage: running.progress_stage,
                    percentage: running.progress_percentage,
                });
            }
        }

        self.start_new_sync(tenant_slug, force_full_sync, guard).await
    }

    async fn conflict_response(&self, tenant_slug: &str) -> Result<SyncRequestOutcome, ApiError> {
        let running = self.catalog.running_sync_for_tenant(tenant_slug).await?;
        Ok(match running {
            Some(running) => SyncRequestOutcome::Conflict {
                sync_id: running.id,
                stage: running.progress_stage,
                percentage: running.progress_percentage,
            },
            // The in-process lock is held but the row hasn't been written
            // yet (caller raced the insert in `start_new_sync`); report a
            // conflict without a concrete sync_id rather than block.
            None => SyncRequestOutcome::Conflict {
                sync_id: Uuid::nil(),
                stage: ProgressStage::Initializing,
                percentage: 0.0,
            },
        })
    }

    async fn start_new_sync(
        &self,
        tenant_slug: &str,
        force_full_sync: bool,
        guard: tokio::sync::OwnedMutexGuard<()>,
    ) -> Result<SyncRequestOutcome, ApiError> {
        let tenant_root = self.config.tenant_root(tenant_slug);
        let scanned: Vec<ScannedFile> = FilesystemScanner::scan(&tenant_root)?;
        let catalog_files = self.catalog.live_files_for_tenant(tenant_slug).await?;
        let plan = ChangeDetector::detect(&scanned, &catalog_files, force_full_sync);

        let expected_duration_seconds = self.calculate_timeout(plan.total_changes() as i64);
        let sync_id = Uuid::new_v4();
        let now = Utc::now();

        let op = SyncOperation {
            id: sync_id,
            tenant_slug: tenant_slug.to_owned(),
            operation_type: if force_full_sync {
                SyncOperationType::Full
            } else {
                SyncOperationType::Delta
            },
            status: SyncStatus::Running,
            started_at: now,
            completed_at: None,
            heartbeat_at: Some(now),
            expected_duration_seconds,
            progress_stage: ProgressStage::Initializing,
            progress_percentage: 0.0,
            total_files_to_process: plan.total_changes() as i64,
            current_file_index: 0,
            counters: SyncCounters::default(),
            error_message: None,
        };
        self.catalog.insert_sync_operation(&op).await?;

        let total_files = op.total_files_to_process;
        self.spawn_execution(tenant_slug.to_owned(), sync_id, tenant_root, plan, expected_duration_seconds, guard);

        Ok(SyncRequestOutcome::Started {
            sync_id,
            expected_duration_seconds,
            total_files,
        })
    }

    fn spawn_execution(
        &self,
        tenant_slug: String,
        sync_id: Uuid,
        tenant_root: PathBuf,
        plan: crate::models::SyncPlan,
        expected_duration_seconds: i64,
        guard: tokio::sync::OwnedMutexGuard<()>,
    ) {
        let catalog = self.catalog.clone();
        let embedder = self.embedder.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let heartbeat_catalog = catalog.clone();
            let heartbeat_interval = config.heartbeat_interval_seconds;
            let heartbeat_handle = tokio::spawn(async move {
                let interval = Duration::from_secs(heartbeat_interval);
                loop {
                    tokio::time::sleep(interval).await;
                    if heartbeat_catalog.touch_heartbeat(sync_id).await.is_err() {
                        break;
                    }
                }
            });

            let execution = execute_sync(&catalog, &embedder, &config, sync_id, &tenant_slug, &tenant_root, plan);
            let outcome = tokio::time::timeout(Duration::from_secs(expected_duration_seconds as u64), execution).await;

            heartbeat_handle.abort();

            match outcome {
                Ok(Ok(counters)) => {
                    if let Err(err) = catalog.complete_sync_operation(sync_id, &counters).await {
                        error!(sync_id = %sync_id, error = %err, "failed to record sync completion");
                    } else {
                        info!(sync_id = %sync_id, tenant = %tenant_slug, "sync completed");
                    }
                }
                Ok(Err((counters, message))) => {
                    warn!(sync_id = %sync_id, tenant = %tenant_slug, error = %message, "sync failed");
                    let _ = catalog.fail_sync_operation(sync_id, &tenant_slug, &message, &counters).await;
                }
                Err(_) => {
                    let message = format!("sync timed out after {expected_duration_seconds}s");
                    warn!(sync_id = %sync_id, tenant = %tenant_slug, "{message}");
                    let _ = catalog
                        .fail_sync_operation(sync_id, &tenant_slug, &message, &SyncCounters::default())
                        .await;
                }
            }

            drop(guard);
        });
    }

    /// `base + per_file * N`, clamped to `[min, max]` (§4.H).
    fn calculate_timeout(&self, total_files: i64) -> i64 {
        let calculated = self.config.base_timeout_seconds + total_files * self.config.per_file_timeout_seconds;
        calculated.clamp(self.config.min_timeout_seconds, self.config.max_timeout_seconds)
    }

    /// A running sync is stuck if its heartbeat has gone stale for more
    /// than 3 heartbeat intervals, or it has run past `stuck_multiplier`
    /// times its own expected duration.
    fn is_stuck(&self, op: &SyncOperation) -> bool {
        let now = Utc::now();

        if let Some(heartbeat_at) = op.heartbeat_at {
            let heartbeat_age = (now - heartbeat_at).num_seconds();
            if heartbeat_age > self.config.heartbeat_interval_seconds as i64 * 3 {
                return true;
            }
        }

        let runtime = (now - op.started_at).num_seconds();
        let max_runtime = (op.expected_duration_seconds as f64 * self.config.stuck_multiplier) as i64;
        runtime > max_runtime
    }

    /// Sweeps every running sync across all tenants and fails the ones
    /// that are stuck. Driven by the Background Supervisor on
    /// `cleanup_interval_seconds` (§4.L).
    pub async fn cleanup_stuck_operations(&self) -> Result<i64, ApiError> {
        let running = self.catalog.all_running_syncs().await?;
        let mut cleaned = 0;
        for op in running {
            if self.is_stuck(&op) {
                self.catalog
                    .fail_sync_operation(op.id, &op.tenant_slug, "operation marked as stuck by cleanup job", &op.counters)
                    .await?;
                cleaned += 1;
            }
        }
        if cleaned > 0 {
            info!(count = cleaned, "cleaned up stuck sync operations");
        }
        Ok(cleaned)
    }

    pub async fn get_sync_status(&self, tenant_slug: &str) -> Result<SyncStatusView, ApiError> {
        let latest_sync = self.catalog.latest_sync_for_tenant(tenant_slug).await?;
        let file_status = self.catalog.file_status_counts(tenant_slug).await?;
        Ok(SyncStatusView { latest_sync, file_status })
    }

    pub async fn sync_history(&self, tenant_slug: &str, limit: i64) -> Result<Vec<SyncOperation>, ApiError> {
        Ok(self.catalog.sync_history_for_tenant(tenant_slug, limit).await?)
    }
}

/// Bundles the handles a single sync operation needs at every stage, so
/// the per-file helpers below don't grow an argument for each one.
struct ExecutionContext<'a> {
    catalog: &'a Catalog,
    embedder: &'a Arc<dyn Embedder>,
    config: &'a Configuration,
    tenant_slug: &'a str,
    tenant_root: &'a std::path::Path,
}

/// Runs a `SyncPlan` to completion against the catalog, reporting
/// progress as it goes. Individual file failures are recorded against
/// that file and do not abort the rest of the plan — only a catalog
/// error does.
async fn execute_sync(
    catalog: &Catalog,
    embedder: &Arc<dyn Embedder>,
    config: &Configuration,
    sync_id: Uuid,
    tenant_slug: &str,
    tenant_root: &std::path::Path,
    plan: crate::models::SyncPlan,
) -> Result<SyncCounters, (SyncCounters, String)> {
    let ctx = ExecutionContext { catalog, embedder, config, tenant_slug, tenant_root };
    let mut counters = SyncCounters::default();
    let total = plan.total_changes().max(1) as f64;

    catalog
        .update_sync_progress(sync_id, ProgressStage::DetectingChanges, 5.0, 0)
        .await
        .map_err(|e| (counters.clone(), e.to_string()))?;
    catalog
        .update_sync_progress(sync_id, ProgressStage::ProcessingFiles, 10.0, 0)
        .await
        .map_err(|e| (counters.clone(), e.to_string()))?;

    for (index, change) in plan.changes.iter().enumerate() {
        let percentage = 10.0 + 80.0 * (index + 1) as f64 / total;
        catalog
            .update_sync_progress(sync_id, ProgressStage::ProcessingFiles, percentage, index as i64 + 1)
            .await
            .map_err(|e| (counters.clone(), e.to_string()))?;

        if let Err(err) = apply_change(&ctx, change, &mut counters).await {
            error!(sync_id = %sync_id, path = change.relative_path(), error = %err, "failed to process file, continuing with the rest of the plan");
        }
    }

    catalog
        .update_sync_progress(sync_id, ProgressStage::Finalizing, 95.0, plan.total_changes() as i64)
        .await
        .map_err(|e| (counters.clone(), e.to_string()))?;

    Ok(counters)
}

async fn apply_change(ctx: &ExecutionContext<'_>, change: &FileChange, counters: &mut SyncCounters) -> sqlx::Result<()> {
    match change {
        FileChange::Created { relative_path, new_hash, size_bytes } => {
            let mime_type = guess_mime_type(relative_path);
            let mut tx = Persistence::begin(ctx.catalog.pool()).await?;
            let file = Persistence::insert_file(&mut tx, ctx.tenant_slug, relative_path, new_hash, *size_bytes, mime_type).await?;
            tx.commit().await?;
            counters.files_added += 1;
            process_file_content(ctx, file.id, relative_path, None, counters).await?;
        }
        FileChange::Updated { file_id, new_hash, size_bytes, .. } => {
            let mut tx = Persistence::begin(ctx.catalog.pool()).await?;
            Persistence::mark_file_processing(&mut tx, *file_id).await?;
            tx.commit().await?;
            counters.files_updated += 1;
            process_file_content(ctx, *file_id, change.relative_path(), Some((new_hash.as_str(), *size_bytes)), counters).await?;
        }
        FileChange::Deleted { file_id, .. } => {
            let mut tx = Persistence::begin(ctx.catalog.pool()).await?;
            let deleted_chunks = Persistence::soft_delete_file(&mut tx, *file_id).await?;
            tx.commit().await?;
            counters.files_deleted += 1;
            counters.chunks_deleted += deleted_chunks;
        }
    }
    Ok(())
}

/// Extracts, chunks, and embeds `relative_path`, then lands the chunk swap
/// together with the status flip in a single transaction (§4.G) — for an
/// `Updated` change, `new_content` also carries the hash/size bump so it
/// can only ever advance in lockstep with `synced`, never ahead of it.
async fn process_file_content(
    ctx: &ExecutionContext<'_>,
    file_id: Uuid,
    relative_path: &str,
    new_content: Option<(&str, i64)>,
    counters: &mut SyncCounters,
) -> sqlx::Result<()> {
    let config = ctx.config;
    let path = ctx.tenant_root.join(relative_path);
    let text = TextExtractor::extract(&path);
    let chunker = Chunker::new(config.chunk_size, config.chunk_overlap);
    let chunks = chunker.chunk(&text);

    let embed_result = if chunks.is_empty() {
        Ok(Vec::new())
    } else {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let batcher = EmbeddingBatcher::new(ctx.embedder.clone(), config.batch_min, config.batch_max, config.batch_concurrency);
        batcher.encode_all(&texts).await
    };

    match embed_result {
        Ok(vectors) => {
            let mut tx = Persistence::begin(ctx.catalog.pool()).await?;
            let (deleted, created) =
                Persistence::replace_chunks(&mut tx, file_id, ctx.tenant_slug, &chunks, &vectors, &config.embedding_model).await?;
            match new_content {
                Some((new_hash, size_bytes)) => {
                    Persistence::finalize_synced_content(&mut tx, file_id, new_hash, size_bytes).await?
                }
                None => Persistence::mark_file_status(&mut tx, file_id, FileSyncStatus::Synced, None).await?,
            }
            tx.commit().await?;
            counters.chunks_created += created;
            counters.chunks_deleted += deleted;
        }
        Err(err) => {
            let mut tx = Persistence::begin(ctx.catalog.pool()).await?;
            match new_content {
                Some((new_hash, size_bytes)) => {
                    Persistence::finalize_failed_content(&mut tx, file_id, new_hash, size_bytes, &err.to_string()).await?
                }
                None => Persistence::mark_file_status(&mut tx, file_id, FileSyncStatus::Failed, Some(&err.to_string())).await?,
            }
            tx.commit().await?;
        }
    }

    Ok(())
}

fn guess_mime_type(relative_path: &str) -> &'static str {
    match relative_path.rsplit('.').next().map(str::to_lowercase).as_deref() {
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::Configuration;
    use crate::embedding::HashEmbedder;
    use crate::retriever::Retriever;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Fails every `encode` call, so tests can drive a file through
    /// `process_file_content`'s error branch deterministically.
    struct FailingEmbedder;

    #[async_trait::async_trait]
    impl Embedder for FailingEmbedder {
        async fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, crate::error::EmbeddingError> {
            Err(crate::error::EmbeddingError { start: 0, end: 0, message: "embedder unavailable".into() })
        }

        fn dimension(&self) -> usize {
            32
        }
    }

    async fn test_catalog() -> Catalog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Catalog::from_pool(pool)
    }

    async fn insert_tenant(catalog: &Catalog, slug: &str) {
        catalog
            .upsert_tenant(&crate::models::Tenant {
                slug: slug.to_owned(),
                display_name: slug.to_owned(),
                api_key: format!("{slug}-key"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    fn test_config(documents_root: std::path::PathBuf) -> Arc<Configuration> {
        Arc::new(Configuration {
            documents_root,
            heartbeat_interval_seconds: 3600,
            ..Default::default()
        })
    }

    async fn wait_for_completion(manager: &SyncManager, tenant: &str) -> SyncOperation {
        for _ in 0..200 {
            let status = manager.get_sync_status(tenant).await.unwrap();
            if let Some(op) = &status.latest_sync {
                if !matches!(op.status, SyncStatus::Running) {
                    return op.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sync for {tenant} did not finish in time");
    }

    /// S1 — create, detect, sync, query: a new file becomes searchable
    /// after one sync round trip.
    #[tokio::test]
    async fn create_sync_and_query_round_trip() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("acme")).unwrap();
        std::fs::write(root.path().join("acme/doc1.txt"), b"alpha bravo charlie").unwrap();

        let catalog = test_catalog().await;
        insert_tenant(&catalog, "acme").await;

        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let manager = SyncManager::new(catalog.clone(), test_config(root.path().to_owned()), embedder.clone());

        let outcome = manager.request_sync("acme", false).await.unwrap();
        assert!(matches!(outcome, SyncRequestOutcome::Started { total_files: 1, .. }));

        let op = wait_for_completion(&manager, "acme").await;
        assert_eq!(op.status, SyncStatus::Completed);
        assert_eq!(op.counters.files_added, 1);

        let query_vector = embedder.encode(&["alpha bravo charlie".to_owned()]).await.unwrap().remove(0);
        let results = Retriever::search(&catalog, "acme", &query_vector, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].relative_path, "doc1.txt");
    }

    /// S2 — a changed file is reprocessed: its old chunk is replaced by a
    /// new one and `files_updated`/`chunks_deleted`/`chunks_created` all
    /// read back as 1.
    #[tokio::test]
    async fn update_replaces_chunks_and_updates_counters() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("acme")).unwrap();
        std::fs::write(root.path().join("acme/doc1.txt"), b"version one").unwrap();

        let catalog = test_catalog().await;
        insert_tenant(&catalog, "acme").await;
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let manager = SyncManager::new(catalog.clone(), test_config(root.path().to_owned()), embedder.clone());

        manager.request_sync("acme", false).await.unwrap();
        wait_for_completion(&manager, "acme").await;

        std::fs::write(root.path().join("acme/doc1.txt"), b"version two").unwrap();
        manager.request_sync("acme", false).await.unwrap();
        let op = wait_for_completion(&manager, "acme").await;

        assert_eq!(op.counters.files_updated, 1);
        assert_eq!(op.counters.chunks_deleted, 1);
        assert_eq!(op.counters.chunks_created, 1);
    }

    /// S3 — a deleted file's chunks are gone and it never resurfaces in
    /// search results.
    #[tokio::test]
    async fn delete_removes_chunks_and_file_stops_matching_queries() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("acme")).unwrap();
        std::fs::write(root.path().join("acme/doc2.txt"), b"ephemeral content").unwrap();

        let catalog = test_catalog().await;
        insert_tenant(&catalog, "acme").await;
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let manager = SyncManager::new(catalog.clone(), test_config(root.path().to_owned()), embedder.clone());

        manager.request_sync("acme", false).await.unwrap();
        wait_for_completion(&manager, "acme").await;

        std::fs::remove_file(root.path().join("acme/doc2.txt")).unwrap();
        manager.request_sync("acme", false).await.unwrap();
        let op = wait_for_completion(&manager, "acme").await;
        assert_eq!(op.counters.files_deleted, 1);

        let query_vector = embedder.encode(&["ephemeral content".to_owned()]).await.unwrap().remove(0);
        let results = Retriever::search(&catalog, "acme", &query_vector, 5).await.unwrap();
        assert!(results.is_empty());
    }

    /// S4 — a concurrent trigger for a tenant already mid-sync is
    /// rejected with a conflict instead of queueing behind it.
    #[tokio::test]
    async fn concurrent_trigger_is_rejected_as_conflict() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("acme")).unwrap();
        std::fs::write(root.path().join("acme/doc1.txt"), b"content").unwrap();

        let catalog = test_catalog().await;
        insert_tenant(&catalog, "acme").await;
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let manager = Arc::new(SyncManager::new(catalog.clone(), test_config(root.path().to_owned()), embedder));

        let lock = manager.tenant_lock("acme");
        let held = lock.lock_owned().await;

        let outcome = manager.request_sync("acme", false).await.unwrap();
        assert!(matches!(outcome, SyncRequestOutcome::Conflict { .. }));

        drop(held);
    }

    /// S6 — tenant isolation: identical content under two tenants never
    /// cross-leaks in search results.
    #[tokio::test]
    async fn tenant_isolation_holds_for_identical_content() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("acme")).unwrap();
        std::fs::create_dir(root.path().join("globex")).unwrap();
        std::fs::write(root.path().join("acme/doc.txt"), b"hello world").unwrap();
        std::fs::write(root.path().join("globex/doc.txt"), b"hello world").unwrap();

        let catalog = test_catalog().await;
        insert_tenant(&catalog, "acme").await;
        insert_tenant(&catalog, "globex").await;
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let manager = SyncManager::new(catalog.clone(), test_config(root.path().to_owned()), embedder.clone());

        manager.request_sync("acme", false).await.unwrap();
        wait_for_completion(&manager, "acme").await;
        manager.request_sync("globex", false).await.unwrap();
        wait_for_completion(&manager, "globex").await;

        let query_vector = embedder.encode(&["hello world".to_owned()]).await.unwrap().remove(0);
        let acme_results = Retriever::search(&catalog, "acme", &query_vector, 5).await.unwrap();
        let globex_results = Retriever::search(&catalog, "globex", &query_vector, 5).await.unwrap();

        assert_eq!(acme_results.len(), 1);
        assert_eq!(globex_results.len(), 1);
        assert_eq!(acme_results[0].relative_path, "doc.txt");
        assert_eq!(globex_results[0].relative_path, "doc.txt");
    }

    /// A content update whose re-embedding fails never lands a hash that
    /// is ahead of its chunks: the old chunk and old search hit survive
    /// untouched, and the file is reported `failed` rather than silently
    /// `synced` on stale data (§4.G).
    #[tokio::test]
    async fn failed_reembedding_does_not_strand_old_chunks_or_advance_hash_past_them() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("acme")).unwrap();
        std::fs::write(root.path().join("acme/doc1.txt"), b"version one").unwrap();

        let catalog = test_catalog().await;
        insert_tenant(&catalog, "acme").await;
        let good_embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let manager = SyncManager::new(catalog.clone(), test_config(root.path().to_owned()), good_embedder.clone());

        manager.request_sync("acme", false).await.unwrap();
        wait_for_completion(&manager, "acme").await;

        let before = catalog.live_files_for_tenant("acme").await.unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].sync_status, FileSyncStatus::Synced);
        let old_hash = before[0].content_hash.clone();

        std::fs::write(root.path().join("acme/doc1.txt"), b"version two").unwrap();
        let failing_embedder: Arc<dyn Embedder> = Arc::new(FailingEmbedder);
        let failing_manager = SyncManager::new(catalog.clone(), test_config(root.path().to_owned()), failing_embedder);
        failing_manager.request_sync("acme", false).await.unwrap();
        let op = wait_for_completion(&failing_manager, "acme").await;
        assert_eq!(op.status, SyncStatus::Completed);

        let after = catalog.live_files_for_tenant("acme").await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].sync_status, FileSyncStatus::Failed);
        assert_ne!(after[0].content_hash, old_hash, "hash still advances so the file isn't retried forever on unchanged content");

        // The failed re-embed never touched `chunks`: the old row from
        // "version one" is still there, it's just not surfaced by the
        // retriever while the file itself reads as `failed`.
        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE file_id = ?")
            .bind(after[0].id.to_string())
            .fetch_one(catalog.pool())
            .await
            .unwrap();
        assert_eq!(chunk_count, 1, "a failed re-embed must not delete the chunks from the last successful sync");
    }
}
