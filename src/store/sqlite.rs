//! SQLite-backed document store
//!
//! Documents and their vectors live in a single `documents` table. An HNSW
//! index is rebuilt from the table on open and kept in step with upserts.

use super::{check_upsert, clamp_distance, DocumentStore, StoreError, StoredDocument, VectorHit};
use crate::corpus::Metadata;
use crate::embedding::{HnswParams, VectorIndex};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Maps HNSW slots back to document ids
///
/// Overwriting a document inserts a fresh slot and leaves the old one
/// stale, since the index has no delete.
#[derive(Default)]
struct SlotTable {
    ids: Vec<Option<String>>,
    by_id: HashMap<String, u64>,
}

impl SlotTable {
    fn assign(&mut self, id: &str) -> u64 {
        let slot = self.ids.len() as u64;
        if let Some(old) = self.by_id.insert(id.to_string(), slot) {
            self.ids[old as usize] = None;
        }
        self.ids.push(Some(id.to_string()));
        slot
    }

    fn id(&self, slot: u64) -> Option<&str> {
        self.ids.get(slot as usize).and_then(|id| id.as_deref())
    }

    fn stale(&self) -> usize {
        self.ids.len() - self.by_id.len()
    }
}

pub struct SqliteDocumentStore {
    pool: DbPool,
    vectors: VectorIndex,
    slots: RwLock<SlotTable>,
    dimension: usize,
}

impl SqliteDocumentStore {
    /// Open (or create) the store at `db_path`
    pub fn open(db_path: &Path, dimension: usize, params: HnswParams) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "Failed to create store directory {:?}: {}",
                        parent, e
                    ))
                })?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        let store = Self {
            pool,
            vectors: VectorIndex::new(dimension, params),
            slots: RwLock::new(SlotTable::default()),
            dimension,
        };

        store.migrate()?;
        store.load_vectors()?;

        tracing::info!(
            "Opened document store at {:?} ({} documents)",
            db_path,
            store.len()?
        );

        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying store migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Rebuild the HNSW index from persisted vectors
    fn load_vectors(&self) -> Result<(), StoreError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id, vector FROM documents ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut slots = self.write_slots()?;
        for row in rows {
            let (id, blob) = row?;
            let vector = decode_vector(&blob)?;
            if vector.len() != self.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            let slot = slots.assign(&id);
            self.vectors.insert(slot, &vector)?;
        }

        Ok(())
    }

    fn read_slots(&self) -> Result<std::sync::RwLockReadGuard<'_, SlotTable>, StoreError> {
        self.slots
            .read()
            .map_err(|_| StoreError::Unavailable("slot table lock poisoned".to_string()))
    }

    fn write_slots(&self) -> Result<std::sync::RwLockWriteGuard<'_, SlotTable>, StoreError> {
        self.slots
            .write()
            .map_err(|_| StoreError::Unavailable("slot table lock poisoned".to_string()))
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn upsert(
        &self,
        ids: &[String],
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<(), StoreError> {
        check_upsert(ids, texts, vectors, metadatas, self.dimension)?;
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        write_rows(&tx, ids, texts, vectors, metadatas)?;
        tx.commit()?;

        let mut slots = self.write_slots()?;
        for (id, vector) in ids.iter().zip(vectors) {
            let slot = slots.assign(id);
            self.vectors.insert(slot, vector)?;
        }

        tracing::debug!("Upserted {} documents", ids.len());
        Ok(())
    }

    fn query_by_vector(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let slots = self.read_slots()?;
        let neighbours = self.vectors.search(vector, top_k + slots.stale())?;

        let mut seen = HashSet::new();
        let mut hits: Vec<VectorHit> = neighbours
            .into_iter()
            .filter_map(|n| {
                let id = slots.id(n.slot)?;
                seen.insert(id.to_string()).then(|| VectorHit {
                    id: id.to_string(),
                    distance: clamp_distance(n.distance),
                    text: None,
                    metadata: None,
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<StoredDocument>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, text, metadata FROM documents WHERE id IN ({})",
            placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), row_to_parts)?;

        let mut found = HashMap::new();
        for row in rows {
            let doc = parts_to_document(row?)?;
            found.insert(doc.id.clone(), doc);
        }

        // Keep the caller's order
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    fn all_documents(&self) -> Result<Vec<StoredDocument>, StoreError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id, text, metadata FROM documents ORDER BY position")?;
        let rows = stmt.query_map([], row_to_parts)?;

        rows.map(|row| parts_to_document(row?)).collect()
    }

    fn replace_all(
        &self,
        ids: &[String],
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<(), StoreError> {
        check_upsert(ids, texts, vectors, metadatas, self.dimension)?;

        // Held across the transaction so queries never see a half-swapped index
        let mut slots = self.write_slots()?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM documents", [])?;
        write_rows(&tx, ids, texts, vectors, metadatas)?;
        tx.commit()?;

        *slots = SlotTable::default();
        self.vectors.clear()?;
        for (id, vector) in ids.iter().zip(vectors) {
            let slot = slots.assign(id);
            self.vectors.insert(slot, vector)?;
        }

        tracing::debug!("Replaced store contents with {} documents", ids.len());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM documents", [])?;

        let mut slots = self.write_slots()?;
        *slots = SlotTable::default();
        self.vectors.clear()?;

        tracing::debug!("Cleared document store");
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let conn = self.get_conn()?;
        let count: Option<i64> = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .optional()?;
        Ok(count.unwrap_or(0) as usize)
    }
}

/// Insert or overwrite rows; new ids are appended after the current last position
fn write_rows(
    tx: &rusqlite::Transaction<'_>,
    ids: &[String],
    texts: &[String],
    vectors: &[Vec<f32>],
    metadatas: &[Metadata],
) -> Result<(), StoreError> {
    let mut stmt = tx.prepare(
        "INSERT INTO documents (id, position, text, metadata, vector)
         VALUES (?1, (SELECT COALESCE(MAX(position) + 1, 0) FROM documents), ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            text = excluded.text,
            metadata = excluded.metadata,
            vector = excluded.vector",
    )?;

    for (((id, text), vector), metadata) in ids.iter().zip(texts).zip(vectors).zip(metadatas) {
        let metadata_json =
            serde_json::to_string(metadata).map_err(|e| StoreError::Serialization(e.to_string()))?;
        stmt.execute(params![id, text, metadata_json, encode_vector(vector)])?;
    }

    Ok(())
}

type RowParts = (String, String, String);

fn row_to_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowParts> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn parts_to_document((id, text, metadata_json): RowParts) -> Result<StoredDocument, StoreError> {
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .map_err(|e| StoreError::Serialization(format!("metadata for {}: {}", id, e)))?;
    Ok(StoredDocument { id, text, metadata })
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Serialization(format!(
            "vector blob of {} bytes is not a whole number of f32s",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

const MIGRATIONS: &[&str] = &[
    // Migration 1: documents table
    r#"
    CREATE TABLE documents (
        id TEXT PRIMARY KEY,
        position INTEGER NOT NULL,
        text TEXT NOT NULL,
        metadata TEXT NOT NULL,
        vector BLOB NOT NULL
    );

    CREATE INDEX idx_documents_position ON documents(position);
    "#,
];
