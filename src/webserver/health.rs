use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::application::Application;

/// Trivial catalog health probe (§4.L), reused here as the public
/// `/health` endpoint the supervisor's own sweep also exercises.
pub async fn health(State(app): State<Application>) -> Json<Value> {
    let catalog_ok = sqlx::query("SELECT 1").fetch_one(app.catalog.pool()).await.is_ok();
    Json(json!({ "status": if catalog_ok { "ok" } else { "degraded" } }))
}
