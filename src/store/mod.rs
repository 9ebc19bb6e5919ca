//! Document store boundary
//!
//! The retriever talks to persistent vector storage only through
//! [`DocumentStore`]. Two implementations ship with the crate: an exact
//! in-memory store and a SQLite store with an HNSW index.

mod memory;
mod sqlite;

pub use memory::InMemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

use crate::corpus::Metadata;
use crate::embedding::VectorIndexError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),
}

/// A document as held by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// Result of a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    /// Dissimilarity in `[0, 1]`; 0 is identical
    pub distance: f32,
    pub text: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Persistent `(id, text, metadata, vector)` storage
pub trait DocumentStore: Send + Sync {
    /// Insert or overwrite documents; all slices must have the same length
    fn upsert(
        &self,
        ids: &[String],
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<(), StoreError>;

    /// Up to `top_k` nearest documents, closest first
    fn query_by_vector(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, StoreError>;

    /// Documents for the ids that exist; unknown ids are skipped
    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<StoredDocument>, StoreError>;

    /// Every document, in first-insertion order
    fn all_documents(&self) -> Result<Vec<StoredDocument>, StoreError>;

    /// Replace the whole contents with the given documents
    ///
    /// Either every document is written or the store is left as it was.
    fn replace_all(
        &self,
        ids: &[String],
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<(), StoreError>;

    /// Remove every document
    fn clear(&self) -> Result<(), StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Check that the parallel upsert slices line up
pub(crate) fn check_upsert(
    ids: &[String],
    texts: &[String],
    vectors: &[Vec<f32>],
    metadatas: &[Metadata],
    dimension: usize,
) -> Result<(), StoreError> {
    let n = ids.len();
    if texts.len() != n || vectors.len() != n || metadatas.len() != n {
        return Err(StoreError::InvalidInput(format!(
            "Length mismatch: {} ids, {} texts, {} vectors, {} metadatas",
            n,
            texts.len(),
            vectors.len(),
            metadatas.len()
        )));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }

    Ok(())
}

/// `1 - cosine similarity`, clamped to `[0, 1]`
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    clamp_distance(1.0 - dot / (norm_a * norm_b))
}

pub(crate) fn clamp_distance(distance: f32) -> f32 {
    if distance.is_nan() {
        1.0
    } else {
        distance.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        // Opposite vectors clamp to the maximum distance
        assert_eq!(cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_check_upsert() {
        let ids = vec!["a".to_string()];
        let texts = vec!["text".to_string()];
        let metas = vec![Metadata::new()];

        assert!(check_upsert(&ids, &texts, &[vec![0.0; 3]], &metas, 3).is_ok());
        assert!(matches!(
            check_upsert(&ids, &texts, &[], &metas, 3),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            check_upsert(&ids, &texts, &[vec![0.0; 2]], &metas, 3),
            Err(StoreError::DimensionMismatch { .. })
        ));
    }
}
