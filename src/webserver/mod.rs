//! The HTTP Surface (§4.K). Handlers are adapters only: validate inputs,
//! call a core component, translate errors — `tenant_slug` always comes
//! from the authenticated `CurrentTenant` extension, never from the
//! request body. Router assembly follows the teacher's
//! `bin/webserver::start` layering (`CorsLayer`, `CatchPanicLayer`,
//! `TraceLayer`, nested under `/api`).

pub mod admin;
pub mod files;
pub mod health;
pub mod query;
pub mod sync;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::application::Application;
use crate::auth::require_api_key;

pub fn build_router(app: Application) -> Router {
    let api = Router::new()
        .route("/sync/trigger", post(sync::trigger))
        .route("/sync/status", get(sync::status))
        .route("/sync/history", get(sync::history))
        .route("/sync/detect-changes", post(sync::detect_changes))
        .route("/sync/cleanup", post(sync::cleanup))
        .route("/query", post(query::answer))
        .route("/query/search", post(query::search))
        .route("/files", get(files::list))
        .route("/admin/tenants", get(admin::list_tenants))
        .route_layer(middleware::from_fn_with_state(app.clone(), require_api_key))
        .with_state(app.clone());

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api)
        .with_state(app)
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}
