/// HNSW vector index for approximate nearest-neighbor search
use hnsw_rs::prelude::*;
use std::sync::RwLock;
use thiserror::Error;

/// Upper bound on HNSW layers (hnsw_rs caps it at 16)
const MAX_LAYER: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index lock poisoned")]
    Poisoned,
}

/// Nearest-neighbor hit
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Slot the vector was inserted under
    pub slot: u64,
    /// Cosine distance (1 - cosine similarity)
    pub distance: f32,
}

/// HNSW index parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Expected number of vectors, used to size the layer distribution
    pub capacity: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            capacity: 10_000,
        }
    }
}

/// HNSW vector index wrapper keyed by caller-chosen slots
pub struct VectorIndex {
    index: RwLock<Hnsw<'static, f32, DistCosine>>,
    dimension: usize,
    params: HnswParams,
    count: RwLock<u64>,
}

impl VectorIndex {
    pub fn new(dimension: usize, params: HnswParams) -> Self {
        Self {
            index: RwLock::new(Self::fresh(params)),
            dimension,
            params,
            count: RwLock::new(0),
        }
    }

    fn fresh(params: HnswParams) -> Hnsw<'static, f32, DistCosine> {
        Hnsw::<f32, DistCosine>::new(
            params.m,
            params.capacity,
            MAX_LAYER,
            params.ef_construction,
            DistCosine,
        )
    }

    /// Insert a vector under `slot`
    pub fn insert(&self, slot: u64, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let data = vector.to_vec();

        let index = self.index.read().map_err(|_| VectorIndexError::Poisoned)?;
        index.insert((&data, slot as usize));

        let mut count = self.count.write().map_err(|_| VectorIndexError::Poisoned)?;
        *count += 1;

        Ok(())
    }

    /// `k` nearest slots, closest first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.index.read().map_err(|_| VectorIndexError::Poisoned)?;
        let ef_search = self.params.ef_search.max(k);

        Ok(index
            .search(query, k, ef_search)
            .into_iter()
            .map(|neighbour| SearchResult {
                slot: neighbour.d_id as u64,
                distance: neighbour.distance,
            })
            .collect())
    }

    /// Number of vectors inserted since creation or the last clear
    pub fn len(&self) -> u64 {
        self.count.read().map(|c| *c).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Remove all vectors
    pub fn clear(&self) -> Result<(), VectorIndexError> {
        let mut index = self.index.write().map_err(|_| VectorIndexError::Poisoned)?;
        *index = Self::fresh(self.params);

        let mut count = self.count.write().map_err(|_| VectorIndexError::Poisoned)?;
        *count = 0;

        Ok(())
    }
}
