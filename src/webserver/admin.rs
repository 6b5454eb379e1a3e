use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::application::Application;
use crate::auth::CurrentTenant;
use crate::error::ApiError;
use crate::models::Tenant;

#[derive(Debug, Serialize)]
pub struct TenantSummary {
    pub slug: String,
    pub display_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub file_counts: crate::db::FileStatusCounts,
}

#[derive(Debug, Serialize)]
pub struct TenantsResponse {
    pub tenants: Vec<TenantSummary>,
}

/// Admin-only (§4.J): the reserved `admin` API key is the only credential
/// that resolves to `CurrentTenant::Admin`; any tenant key is rejected.
pub async fn list_tenants(
    State(app): State<Application>,
    tenant: CurrentTenant,
) -> Result<Json<TenantsResponse>, ApiError> {
    if !matches!(tenant, CurrentTenant::Admin) {
        return Err(crate::error::AuthError::Forbidden.into());
    }

    let tenants: Vec<Tenant> = app.catalog.list_tenants().await?;
    let mut summaries = Vec::with_capacity(tenants.len());
    for tenant in tenants {
        let file_counts = app.catalog.file_status_counts(&tenant.slug).await?;
        summaries.push(TenantSummary {
            slug: tenant.slug,
            display_name: tenant.display_name,
            created_at: tenant.created_at,
            file_counts,
        });
    }

    Ok(Json(TenantsResponse { tenants: summaries }))
}
