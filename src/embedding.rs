//! The embedding collaborator boundary (§4.F, §9) and the Embedding
//! Batcher built on top of it. The collaborator is an interface with one
//! method, `encode` — not a class hierarchy — mirroring the teacher's
//! `semantic_search::client::SemanticClient` wrapping `Arc<dyn Embedder>`.
//! The optional answer-generation collaborator (`Generator::generate`) is
//! a separate interface, matching `async-openai`'s role in the teacher's
//! dependency table.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use crate::error::{EmbeddingError, GenerationError};

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
    fn dimension(&self) -> usize;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Deterministic, model-free embedder: hashes each text into `dimension`
/// pseudo-random components, normalized to unit length so cosine
/// similarity behaves sensibly. Ships as the zero-config default and the
/// test fixture, the same "fallback to hash-based if not available" idiom
/// documented for `fastembed` in the wider corpus — the trait boundary
/// lets a real local model be dropped in without touching the batcher.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        let mut counter: u32 = 0;
        let mut filled = 0;

        while filled < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();

            for chunk in digest.chunks(4) {
                if filled >= self.dimension {
                    break;
                }
                let bytes = [chunk[0], chunk[1], chunk[2], chunk.get(3).copied().unwrap_or(0)];
                let raw = u32::from_le_bytes(bytes) as f32 / u32::MAX as f32;
                vector[filled] = raw * 2.0 - 1.0;
                filled += 1;
            }
            counter += 1;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(feature = "llm")]
pub struct OpenAiGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

#[cfg(feature = "llm")]
impl OpenAiGenerator {
    pub fn new(model: String) -> Self {
        Self {
            client: async_openai::Client::new(),
            model,
        }
    }
}

#[cfg(feature = "llm")]
#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        use async_openai::types::{
            ChatCompletionRequestMessageArgs, CreateChatCompletionRequestArgs, Role,
        };

        let message = ChatCompletionRequestMessageArgs::default()
            .role(Role::User)
            .content(prompt)
            .build()
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![message.into()])
            .build()
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Provider("empty completion".to_owned()))
    }
}

/// Adaptive-batch-size, bounded-concurrency encoder (§4.F). Retries a
/// failed batch once with the batch size halved; a second failure
/// surfaces an `EmbeddingError` carrying the affected chunk-index range.
pub struct EmbeddingBatcher {
    embedder: Arc<dyn Embedder>,
    batch_min: usize,
    batch_max: usize,
    semaphore: Arc<Semaphore>,
}

impl EmbeddingBatcher {
    pub fn new(embedder: Arc<dyn Embedder>, batch_min: usize, batch_max: usize, concurrency: usize) -> Self {
        Self {
            embedder,
            batch_min,
            batch_max,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Encodes every text, preserving input order, using an adaptive batch
    /// size derived from average text length (shorter texts pack more
    /// densely per batch, up to `batch_max`).
    pub async fn encode_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.adaptive_batch_size(texts);
        let next_offset = AtomicUsize::new(0);
        let mut results: Vec<Vec<f32>> = Vec::with_capacity(texts.len());

        let batches: Vec<(usize, &[String])> = texts
            .chunks(batch_size)
            .map(|chunk| {
                let start = next_offset.fetch_add(chunk.len(), Ordering::SeqCst);
                (start, chunk)
            })
            .collect();

        let mut handles = Vec::new();
        for (start, batch) in batches {
            let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore closed");
            let embedder = self.embedder.clone();
            let batch = batch.to_vec();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                encode_with_retry(&*embedder, &batch, start).await
            }));
        }

        let mut by_start: Vec<(usize, Vec<Vec<f32>>)> = Vec::new();
        for handle in handles {
            let (start, vectors) = handle.await.expect("embedding task panicked")?;
            by_start.push((start, vectors));
        }
        by_start.sort_by_key(|(start, _)| *start);
        for (_, vectors) in by_start {
            results.extend(vectors);
        }

        Ok(results)
    }

    /// Larger average text length → smaller batch, clamped to
    /// `[batch_min, batch_max]`. A simple proxy for "available device
    /// memory" in the absence of a real accelerator to probe.
    fn adaptive_batch_size(&self, texts: &[String]) -> usize {
        let avg_len: usize = texts.iter().map(|t| t.len()).sum::<usize>() / texts.len().max(1);
        let scaled = if avg_len == 0 {
            self.batch_max
        } else {
            32_768usize.div_ceil(avg_len).max(1)
        };
        scaled.clamp(self.batch_min, self.batch_max)
    }
}

async fn encode_with_retry(
    embedder: &dyn Embedder,
    batch: &[String],
    start: usize,
) -> Result<(usize, Vec<Vec<f32>>), EmbeddingError> {
    match embedder.encode(batch).await {
        Ok(vectors) => Ok((start, vectors)),
        Err(_first_error) => {
            let half = (batch.len() / 2).max(1);
            let mut recovered = Vec::with_capacity(batch.len());
            for half_batch in batch.chunks(half) {
                match embedder.encode(half_batch).await {
                    Ok(vectors) => recovered.extend(vectors),
                    Err(second_error) => {
                        return Err(EmbeddingError {
                            start,
                            end: start + batch.len(),
                            message: second_error.message,
                        })
                    }
                }
            }
            Ok((start, recovered))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(384);
        let a = embedder.encode(&["hello world".to_owned()]).await.unwrap();
        let b = embedder.encode(&["hello world".to_owned()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 384);
        let norm: f32 = a[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn different_texts_embed_differently() {
        let embedder = HashEmbedder::new(64);
        let vectors = embedder
            .encode(&["alpha".to_owned(), "bravo".to_owned()])
            .await
            .unwrap();
        assert_ne!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn batcher_preserves_order_across_batches() {
        let embedder = Arc::new(HashEmbedder::new(32));
        let batcher = EmbeddingBatcher::new(embedder.clone(), 2, 4, 2);
        let texts: Vec<String> = (0..20).map(|i| format!("text number {i}")).collect();
        let vectors = batcher.encode_all(&texts).await.unwrap();
        assert_eq!(vectors.len(), texts.len());

        for (text, vector) in texts.iter().zip(vectors.iter()) {
            let expected = embedder.encode(std::slice::from_ref(text)).await.unwrap();
            assert_eq!(*vector, expected[0]);
        }
    }
}
