//! The Retriever (§4.I). Cosine similarity computed in-process over a
//! tenant-prefiltered candidate set recalled in the same SQL statement
//! that enforces tenant isolation — the two-storage-consistency problem
//! (§9) collapsed by keeping vectors in the same transactional store as
//! everything else, with similarity maths left to Rust instead of a
//! vector database the corpus otherwise reaches for (`qdrant-client`).

use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::db::Catalog;
use crate::persistence::decode_embedding;

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub file_id: Uuid,
    pub relative_path: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

pub struct Retriever;

impl Retriever {
    /// Ranks every non-deleted, synced chunk belonging to `tenant_slug` by
    /// cosine similarity to `query_vector`, descending. Ties break by
    /// ascending `(file_id, chunk_index)` so results are deterministic
    /// across runs with identical scores.
    pub async fn search(
        catalog: &Catalog,
        tenant_slug: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> sqlx::Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(
            "SELECT c.file_id, c.chunk_index, c.text, c.embedding, f.relative_path
             FROM chunks c
             JOIN files f ON f.id = c.file_id
             WHERE c.tenant_slug = ? AND f.tenant_slug = ? AND f.deleted_at IS NULL
                   AND f.sync_status = 'synced'",
        )
        .bind(tenant_slug)
        .bind(tenant_slug)
        .fetch_all(catalog.pool())
        .await?;

        let mut candidates: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let embedding = decode_embedding(&row.get::<Vec<u8>, _>("embedding"));
                let score = cosine_similarity(query_vector, &embedding);
                RetrievedChunk {
                    file_id: row.get::<String, _>("file_id").parse().unwrap_or_default(),
                    relative_path: row.get("relative_path"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    score,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file_id.cmp(&b.file_id))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        candidates.truncate(top_k);

        Ok(candidates)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let dot: f32 = a[..len].iter().zip(&b[..len]).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a[..len].iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b[..len].iter().map(|y| y * y).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_scores_zero_not_nan() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_and_breaks_ties_deterministically() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO tenants (slug, display_name, api_key, created_at) VALUES ('acme', 'Acme', 'k', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let file_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO files (id, tenant_slug, filename, relative_path, size_bytes, content_hash, mime_type,
                                 sync_status, created_at, updated_at)
             VALUES (?, 'acme', 'a.txt', 'a.txt', 1, 'h', 'text/plain', 'synced', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .bind(file_id.to_string())
        .execute(&pool)
        .await
        .unwrap();

        for (index, vector) in [vec![1.0f32, 0.0], vec![0.0f32, 1.0]].iter().enumerate() {
            sqlx::query(
                "INSERT INTO chunks (id, file_id, tenant_slug, chunk_index, text, text_hash, token_count,
                                      embedding, embedding_model, created_at)
                 VALUES (?, ?, 'acme', ?, ?, 'h', 1, ?, 'hash-embedder', '2026-01-01T00:00:00Z')",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(file_id.to_string())
            .bind(index as i64)
            .bind(format!("chunk {index}"))
            .bind(crate::persistence::encode_embedding(vector))
            .execute(&pool)
            .await
            .unwrap();
        }

        let catalog = Catalog::from_pool(pool);
        let results = Retriever::search(&catalog, "acme", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results[0].chunk_index, 0);
        assert!(results[0].score > results[1].score);
    }
}
