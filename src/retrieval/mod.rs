//! Hybrid retrieval
//!
//! Dense similarity from the document store, BM25 over the schema
//! documents and one-hop relation-graph expansion, fused by weighted
//! addition and hydrated from the store.

pub mod context;
mod fusion;
mod hybrid;

pub use context::build_prompt;
pub use fusion::ScoreMap;
pub use hybrid::{IngestReport, RankedResult, RetrievalError, Retriever};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Search query with an optional per-call timeout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Query text
    pub text: String,

    /// Maximum number of results
    pub top_k: usize,

    /// Bound on each provider call; falls back to the retriever's config
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
