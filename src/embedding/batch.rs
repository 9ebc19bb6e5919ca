/// Batched embedding of a whole corpus
use super::{EmbeddingError, EmbeddingProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Vectors produced for one corpus, aligned with the input texts
#[derive(Debug)]
pub struct BatchResult {
    pub vectors: Vec<Vec<f32>>,
    pub batches: usize,
    pub duration_ms: u64,
}

/// Splits texts into provider-sized batches
///
/// Blocking: run it on a blocking thread when called from async code.
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl BatchEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed every text; any failed batch fails the whole run
    pub fn embed_all(&self, texts: &[String]) -> Result<BatchResult, EmbeddingError> {
        let start = Instant::now();

        info!(
            "Embedding {} documents with {} (batch size {})",
            texts.len(),
            self.provider.model_name(),
            self.batch_size
        );

        let mut vectors = Vec::with_capacity(texts.len());
        let mut batches = 0;

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.provider.embed_batch(chunk)?;

            if embeddings.len() != chunk.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: chunk.len(),
                    actual: embeddings.len(),
                });
            }

            vectors.extend(embeddings);
            batches += 1;
            debug!("Embedded batch {} ({} texts)", batches, chunk.len());
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Embedding complete: {} vectors in {} batches, {}ms",
            vectors.len(),
            batches,
            duration_ms
        );

        Ok(BatchResult {
            vectors,
            batches,
            duration_ms,
        })
    }
}
