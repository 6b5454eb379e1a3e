use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::Application;
use crate::auth::CurrentTenant;
use crate::error::ApiError;
use crate::retriever::{RetrievedChunk, Retriever};

fn default_max_sources() -> usize {
    5
}

fn default_confidence_threshold() -> f32 {
    0.0
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub query: String,
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default)]
    pub metadata_filters: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct Source {
    pub file_id: uuid::Uuid,
    pub filename: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

impl From<RetrievedChunk> for Source {
    fn from(chunk: RetrievedChunk) -> Self {
        Self {
            file_id: chunk.file_id,
            filename: chunk.relative_path,
            chunk_index: chunk.chunk_index,
            text: chunk.text,
            score: chunk.score,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub query: String,
    pub answer: Option<String>,
    pub sources: Vec<Source>,
    pub confidence: f32,
    pub processing_time_ms: u128,
}

/// `metadata_filters` is accepted for API compatibility but has nothing to
/// filter against: the catalog carries no generic metadata column (see
/// DESIGN.md).
pub async fn answer(
    State(app): State<Application>,
    tenant: CurrentTenant,
    Json(body): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let timeout_seconds = app.config.query_timeout_seconds;
    let started = Instant::now();

    tokio::time::timeout(std::time::Duration::from_secs(timeout_seconds), answer_inner(app, tenant, body))
        .await
        .map_err(|_| ApiError::Timeout(timeout_seconds))?
        .map(|mut response| {
            response.processing_time_ms = started.elapsed().as_millis();
            Json(response)
        })
}

async fn answer_inner(app: Application, tenant: CurrentTenant, body: AnswerRequest) -> Result<AnswerResponse, ApiError> {
    let tenant = tenant.require_tenant()?;

    let query_vector = app.embedder.encode(std::slice::from_ref(&body.query)).await?;
    let query_vector = query_vector.into_iter().next().unwrap_or_default();

    let mut chunks = Retriever::search(&app.catalog, &tenant.slug, &query_vector, body.max_sources).await?;
    chunks.retain(|chunk| chunk.score >= body.confidence_threshold);

    let confidence = chunks.first().map(|chunk| chunk.score).unwrap_or(0.0);

    let answer = match &app.generator {
        Some(generator) if !chunks.is_empty() => {
            let context = chunks
                .iter()
                .map(|chunk| chunk.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let prompt = format!("Context:\n{context}\n\nQuestion: {}\n\nAnswer:", body.query);
            Some(generator.generate(&prompt).await?)
        }
        _ => None,
    };

    let sources = chunks.into_iter().map(Source::from).collect();

    Ok(AnswerResponse {
        query: body.query,
        answer,
        sources,
        confidence,
        processing_time_ms: 0,
    })
}

fn default_max_results() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub metadata_filters: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<Source>,
    pub total_results: usize,
}

pub async fn search(
    State(app): State<Application>,
    tenant: CurrentTenant,
    Json(body): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let timeout_seconds = app.config.query_timeout_seconds;

    tokio::time::timeout(std::time::Duration::from_secs(timeout_seconds), search_inner(app, tenant, body))
        .await
        .map_err(|_| ApiError::Timeout(timeout_seconds))?
        .map(Json)
}

async fn search_inner(app: Application, tenant: CurrentTenant, body: SearchRequest) -> Result<SearchResponse, ApiError> {
    let tenant = tenant.require_tenant()?;

    let query_vector = app.embedder.encode(std::slice::from_ref(&body.query)).await?;
    let query_vector = query_vector.into_iter().next().unwrap_or_default();

    let chunks = Retriever::search(&app.catalog, &tenant.slug, &query_vector, body.max_results).await?;
    let total_results = chunks.len();
    let results = chunks.into_iter().map(Source::from).collect();

    Ok(SearchResponse {
        query: body.query,
        results,
        total_results,
    })
}
