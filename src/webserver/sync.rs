use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::application::Application;
use crate::auth::CurrentTenant;
use crate::change_detector::ChangeDetector;
use crate::error::{ApiError, ConflictError};
use crate::models::{FileChange, SyncOperation};
use crate::scanner::FilesystemScanner;
use crate::sync::manager::{SyncRequestOutcome, SyncStatusView};

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub force_full_sync: bool,
}

/// A `Conflict` outcome is reported as 409 (§6/§7), using the existing
/// `ApiError::Conflict` path, rather than 200 with a conflict body.
pub async fn trigger(
    State(app): State<Application>,
    tenant: CurrentTenant,
    Json(body): Json<TriggerRequest>,
) -> Result<Json<SyncRequestOutcome>, ApiError> {
    let tenant = tenant.require_tenant()?;
    let outcome = app.sync_manager.request_sync(&tenant.slug, body.force_full_sync).await?;
    match outcome {
        SyncRequestOutcome::Started { .. } => Ok(Json(outcome)),
        SyncRequestOutcome::Conflict { sync_id, stage, percentage } => Err(ApiError::Conflict(ConflictError {
            sync_id,
            stage: stage.as_str().to_owned(),
            percentage,
        })),
    }
}

pub async fn status(State(app): State<Application>, tenant: CurrentTenant) -> Result<Json<SyncStatusView>, ApiError> {
    let tenant = tenant.require_tenant()?;
    Ok(Json(app.sync_manager.get_sync_status(&tenant.slug).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<SyncOperation>,
}

pub async fn history(
    State(app): State<Application>,
    tenant: CurrentTenant,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let tenant = tenant.require_tenant()?;
    let history = app.sync_manager.sync_history(&tenant.slug, params.limit).await?;
    Ok(Json(HistoryResponse { history }))
}

#[derive(Debug, Serialize)]
pub struct DetectChangesResponse {
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    pub changes: Vec<FileChange>,
}

pub async fn detect_changes(
    State(app): State<Application>,
    tenant: CurrentTenant,
) -> Result<Json<DetectChangesResponse>, ApiError> {
    let tenant = tenant.require_tenant()?;
    let tenant_root = app.config.tenant_root(&tenant.slug);
    let scanned = FilesystemScanner::scan(&tenant_root)?;
    let catalog_files = app.catalog.live_files_for_tenant(&tenant.slug).await?;
    let plan = ChangeDetector::detect(&scanned, &catalog_files, false);

    let mut new = 0;
    let mut updated = 0;
    let mut deleted = 0;
    for change in &plan.changes {
        match change {
            FileChange::Created { .. } => new += 1,
            FileChange::Updated { .. } => updated += 1,
            FileChange::Deleted { .. } => deleted += 1,
        }
    }

    Ok(Json(DetectChangesResponse {
        total: plan.total_changes(),
        new,
        updated,
        deleted,
        changes: plan.changes,
    }))
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub operations_cleaned: i64,
}

pub async fn cleanup(State(app): State<Application>, tenant: CurrentTenant) -> Result<Json<CleanupResponse>, ApiError> {
    tenant.require_tenant()?;
    let operations_cleaned = app.sync_manager.cleanup_stuck_operations().await?;
    Ok(Json(CleanupResponse { operations_cleaned }))
}
