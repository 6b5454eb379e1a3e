use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::application::Application;
use crate::auth::CurrentTenant;
use crate::error::ApiError;
use crate::models::FileRecord;

fn default_limit() -> i64 {
    50
}

fn default_offset() -> i64 {
    0
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_offset")]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub files: Vec<FileRecord>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list(
    State(app): State<Application>,
    tenant: CurrentTenant,
    Query(params): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let tenant = tenant.require_tenant()?;
    let files = app
        .catalog
        .files_for_tenant_paginated(&tenant.slug, params.limit, params.offset)
        .await?;

    Ok(Json(ListResponse {
        files,
        limit: params.limit,
        offset: params.offset,
    }))
}
