//! Exact in-memory document store

use super::{check_upsert, cosine_distance, DocumentStore, StoreError, StoredDocument, VectorHit};
use crate::corpus::Metadata;
use std::collections::HashMap;
use std::sync::RwLock;

struct Entry {
    id: String,
    text: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    positions: HashMap<String, usize>,
}

impl Inner {
    /// Insert or overwrite in place; slices are already checked
    fn put(&mut self, ids: &[String], texts: &[String], vectors: &[Vec<f32>], metadatas: &[Metadata]) {
        for (((id, text), vector), metadata) in ids.iter().zip(texts).zip(vectors).zip(metadatas) {
            let entry = Entry {
                id: id.clone(),
                text: text.clone(),
                metadata: metadata.clone(),
                vector: vector.clone(),
            };

            match self.positions.get(id).copied() {
                Some(position) => self.entries[position] = entry,
                None => {
                    self.positions.insert(id.clone(), self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
    }
}

/// Brute-force cosine search over documents kept in memory
///
/// Results are exact and deterministic: equal distances are ordered by
/// insertion. Suited to schema-sized corpora and tests.
pub struct InMemoryDocumentStore {
    dimension: usize,
    inner: RwLock<Inner>,
}

impl InMemoryDocumentStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

fn to_stored(entry: &Entry) -> StoredDocument {
    StoredDocument {
        id: entry.id.clone(),
        text: entry.text.clone(),
        metadata: entry.metadata.clone(),
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn upsert(
        &self,
        ids: &[String],
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<(), StoreError> {
        check_upsert(ids, texts, vectors, metadatas, self.dimension)?;
        self.write()?.put(ids, texts, vectors, metadatas);
        Ok(())
    }

    fn replace_all(
        &self,
        ids: &[String],
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<(), StoreError> {
        check_upsert(ids, texts, vectors, metadatas, self.dimension)?;

        let mut fresh = Inner::default();
        fresh.put(ids, texts, vectors, metadatas);
        *self.write()? = fresh;
        Ok(())
    }

    fn query_by_vector(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let inner = self.read()?;
        let mut scored: Vec<(usize, f32)> = inner
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_distance(vector, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(position, distance)| {
                let entry = &inner.entries[position];
                VectorHit {
                    id: entry.id.clone(),
                    distance,
                    text: Some(entry.text.clone()),
                    metadata: Some(entry.metadata.clone()),
                }
            })
            .collect())
    }

    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<StoredDocument>, StoreError> {
        let inner = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.positions.get(id))
            .map(|&position| to_stored(&inner.entries[position]))
            .collect())
    }

    fn all_documents(&self) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self.read()?.entries.iter().map(to_stored).collect())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.write()? = Inner::default();
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.entries.len())
    }
}
