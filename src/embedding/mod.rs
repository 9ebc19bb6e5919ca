mod batch;
mod http;
mod keyword_index;
/// Embedding & Indexing
///
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - HttpEmbeddingProvider for OpenAI-compatible endpoints
/// - SparseIndex (tantivy BM25) for lexical search
/// - VectorIndex (HNSW) backing the persistent document store
mod provider;
mod vector_index;

pub use batch::{BatchEmbedder, BatchResult};
pub use http::HttpEmbeddingProvider;
pub use keyword_index::{tokenize, SparseIndex, SparseIndexError};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{HnswParams, SearchResult, VectorIndex, VectorIndexError};

use crate::config::Config;
use std::sync::Arc;
use std::time::Duration;

/// Build the provider selected by `embedding.mode`
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let embedding = &config.embedding;
    match embedding.mode.as_str() {
        "offline" => Ok(Arc::new(FastEmbedProvider::new(&embedding.model)?)),
        "online" => {
            let api_key = std::env::var(&embedding.api_key_env)
                .ok()
                .filter(|k| !k.is_empty());
            if api_key.is_none() {
                tracing::warn!(
                    "{} is not set; calling {} without credentials",
                    embedding.api_key_env,
                    embedding.endpoint
                );
            }
            Ok(Arc::new(HttpEmbeddingProvider::new(
                &embedding.endpoint,
                &embedding.model,
                api_key,
                config.indexing.vector_dim,
                Duration::from_millis(embedding.request_timeout_ms),
            )?))
        }
        other => Err(EmbeddingError::InitializationError(format!(
            "Unknown embedding mode: {}",
            other
        ))),
    }
}
