//! The Persistence Layer (§4.G). One `sqlx::Transaction` per file-level
//! mutation — file row plus its chunk rows commit or fail together, the
//! same all-or-nothing unit the teacher's `indexer` used per-repo before
//! this crate collapsed vector storage into the catalog's own store (§9).

use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use crate::chunker::TextChunk;
use crate::models::{FileRecord, FileSyncStatus};

pub struct Persistence;

impl Persistence {
    pub async fn begin(pool: &sqlx::SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
        pool.begin().await
    }

    /// Inserts a new `files` row already in `processing` status (§3, §4.G
    /// step 1) — a freshly observed file has no prior committed state to
    /// protect, so its hash can be recorded immediately.
    pub async fn insert_file(
        tx: &mut Transaction<'_, Sqlite>,
        tenant_slug: &str,
        relative_path: &str,
        content_hash: &str,
        size_bytes: i64,
        mime_type: &str,
    ) -> sqlx::Result<FileRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let filename = relative_path.rsplit('/').next().unwrap_or(relative_path).to_owned();

        sqlx::query(
            "INSERT INTO files (id, tenant_slug, filename, relative_path, size_bytes, content_hash,
                                 mime_type, sync_status, sync_started_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'processing', ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(tenant_slug)
        .bind(&filename)
        .bind(relative_path)
        .bind(size_bytes)
        .bind(content_hash)
        .bind(mime_type)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut **tx)
        .await?;

        Ok(FileRecord {
            id,
            tenant_slug: tenant_slug.to_owned(),
            filename,
            relative_path: relative_path.to_owned(),
            size_bytes,
            content_hash: content_hash.to_owned(),
            mime_type: mime_type.to_owned(),
            sync_status: FileSyncStatus::Processing,
            sync_started_at: Some(now),
            sync_completed_at: None,
            sync_error: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Flags an existing file `processing` ahead of re-extraction, without
    /// touching its committed `content_hash` — the hash only advances once
    /// the new chunks and the `synced` flip land together (see
    /// `finalize_synced_content`), so a crash between this call and that
    /// one leaves the change detector still seeing a mismatch and able to
    /// retry, instead of a file stranded invisible at `pending` with a
    /// hash that already matches disk.
    pub async fn mark_file_processing(tx: &mut Transaction<'_, Sqlite>, file_id: Uuid) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE files SET sync_status = 'processing', sync_started_at = COALESCE(sync_started_at, ?),
                               updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(file_id.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Advances `content_hash`/`size_bytes` and flips to `synced` in one
    /// statement — called in the same transaction as the chunk swap so a
    /// file's hash never lands ahead of its chunks (§4.G).
    pub async fn finalize_synced_content(
        tx: &mut Transaction<'_, Sqlite>,
        file_id: Uuid,
        new_hash: &str,
        size_bytes: i64,
    ) -> sqlx::Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE files SET content_hash = ?, size_bytes = ?, sync_status = 'synced', sync_error = NULL,
                               sync_completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(new_hash)
        .bind(size_bytes)
        .bind(&now)
        .bind(&now)
        .bind(file_id.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Advances `content_hash`/`size_bytes` and flips to `failed` in one
    /// statement. The hash is bumped deliberately here (unlike the crash
    /// window `mark_file_processing` protects against): this is a single
    /// atomic write, so a file that fails extraction/embedding is left
    /// alone by ordinary delta syncs until its content changes again, per
    /// the documented retry policy (see DESIGN.md).
    pub async fn finalize_failed_content(
        tx: &mut Transaction<'_, Sqlite>,
        file_id: Uuid,
        new_hash: &str,
        size_bytes: i64,
        error: &str,
    ) -> sqlx::Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE files SET content_hash = ?, size_bytes = ?, sync_status = 'failed', sync_error = ?,
                               sync_completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(new_hash)
        .bind(size_bytes)
        .bind(error)
        .bind(&now)
        .bind(&now)
        .bind(file_id.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Soft-deletes a file (§3 open-question resolution: tombstone, never
    /// a hard `DELETE`) and drops its chunks, which carry no retention
    /// requirement of their own.
    pub async fn soft_delete_file(tx: &mut Transaction<'_, Sqlite>, file_id: Uuid) -> sqlx::Result<i64> {
        let deleted_chunks = sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(file_id.to_string())
            .execute(&mut **tx)
            .await?
            .rows_affected() as i64;

        sqlx::query("UPDATE files SET deleted_at = ?, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(Utc::now().to_rfc3339())
            .bind(file_id.to_string())
            .execute(&mut **tx)
            .await?;

        Ok(deleted_chunks)
    }

    pub async fn mark_file_status(
        tx: &mut Transaction<'_, Sqlite>,
        file_id: Uuid,
        status: FileSyncStatus,
        error: Option<&str>,
    ) -> sqlx::Result<()> {
        let now = Utc::now().to_rfc3339();
        let completed_at = matches!(status, FileSyncStatus::Synced | FileSyncStatus::Failed).then(|| now.clone());

        sqlx::query(
            "UPDATE files SET sync_status = ?, sync_error = ?, sync_started_at = COALESCE(sync_started_at, ?),
                               sync_completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(&now)
        .bind(completed_at)
        .bind(&now)
        .bind(file_id.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Replaces every chunk belonging to `file_id` with freshly extracted
    /// and embedded ones. Returns `(chunks_deleted, chunks_created)`.
    pub async fn replace_chunks(
        tx: &mut Transaction<'_, Sqlite>,
        file_id: Uuid,
        tenant_slug: &str,
        chunks: &[TextChunk],
        vectors: &[Vec<f32>],
        embedding_model: &str,
    ) -> sqlx::Result<(i64, i64)> {
        assert_eq!(chunks.len(), vectors.len(), "one embedding per chunk is required");

        let chunks_deleted = sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(file_id.to_string())
            .execute(&mut **tx)
            .await?
            .rows_affected() as i64;

        let now = Utc::now().to_rfc3339();
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO chunks (id, file_id, tenant_slug, chunk_index, text, text_hash,
                                      token_count, embedding, embedding_model, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(file_id.to_string())
            .bind(tenant_slug)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.text_hash)
            .bind(chunk.token_count)
            .bind(encode_embedding(vector))
            .bind(embedding_model)
            .bind(&now)
            .execute(&mut **tx)
            .await?;
        }

        Ok((chunks_deleted, chunks.len() as i64))
    }
}

/// Little-endian `f32` byte encoding — the wire format embeddings are
/// stored in, since sqlite has no native vector column type (§9).
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_round_trips_through_bytes() {
        let vector = vec![0.5f32, -1.25, 0.0, 3.75];
        let bytes = encode_embedding(&vector);
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode_embedding(&bytes), vector);
    }

    #[tokio::test]
    async fn insert_update_and_soft_delete_round_trip() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        sqlx::query("INSERT INTO tenants (slug, display_name, api_key, created_at) VALUES ('acme', 'Acme', 'key', datetime('now'))")
            .execute(&pool)
            .await
            .unwrap();

        let mut tx = Persistence::begin(&pool).await.unwrap();
        let file = Persistence::insert_file(&mut tx, "acme", "doc.txt", "h1", 10, "text/plain")
            .await
            .unwrap();
        assert_eq!(file.sync_status, FileSyncStatus::Processing);

        let chunks = vec![crate::chunker::TextChunk {
            text: "hello".into(),
            chunk_index: 0,
            token_count: 1,
            text_hash: "t1".into(),
        }];
        let vectors = vec![vec![1.0f32, 2.0]];
        let (deleted, created) = Persistence::replace_chunks(&mut tx, file.id, "acme", &chunks, &vectors, "hash-embedder")
            .await
            .unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(created, 1);

        Persistence::mark_file_status(&mut tx, file.id, FileSyncStatus::Synced, None)
            .await
            .unwrap();
        let deleted_chunks = Persistence::soft_delete_file(&mut tx, file.id).await.unwrap();
        assert_eq!(deleted_chunks, 1);
        tx.commit().await.unwrap();

        let catalog_files = sqlx::query("SELECT deleted_at FROM files WHERE id = ?")
            .bind(file.id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
        let deleted_at: Option<String> = sqlx::Row::get(&catalog_files, "deleted_at");
        assert!(deleted_at.is_some());
    }
}
