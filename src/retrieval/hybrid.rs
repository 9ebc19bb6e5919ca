//! Hybrid retrieval combining dense, sparse and graph signals

use crate::config::RetrievalConfig;
use crate::corpus::{Corpus, DocumentKind, Metadata};
use crate::embedding::{BatchEmbedder, EmbeddingProvider, SparseIndex, SparseIndexError};
use crate::graph::{GraphStats, RelationGraph};
use crate::retrieval::{ScoreMap, SearchQuery};
use crate::schema::SchemaError;
use crate::store::{DocumentStore, StoreError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

const EMBEDDING: &str = "embedding provider";
const STORE: &str = "document store";

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("{provider} unavailable: {reason}")]
    ProviderUnavailable {
        provider: &'static str,
        reason: String,
    },

    #[error("{stage} timed out after {timeout_ms}ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid corpus: {0}")]
    InvalidCorpus(#[from] SchemaError),

    #[error("Sparse index error: {0}")]
    SparseIndex(#[from] SparseIndexError),
}

fn unavailable(provider: &'static str, reason: impl ToString) -> RetrievalError {
    RetrievalError::ProviderUnavailable {
        provider,
        reason: reason.to_string(),
    }
}

fn store_unavailable(e: StoreError) -> RetrievalError {
    unavailable(STORE, e)
}

/// A hydrated, scored document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub kind: Option<DocumentKind>,
    pub score: f32,
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub tables: usize,
    pub relations: usize,
    pub batches: usize,
    pub duration_ms: u64,
}

/// Lexical index, relation graph and document kinds of one corpus
/// generation; read-only once built
struct RetrievalState {
    sparse: SparseIndex,
    graph: RelationGraph,
    kinds: HashMap<String, DocumentKind>,
}

impl RetrievalState {
    fn empty() -> Result<Self, SparseIndexError> {
        Ok(Self {
            sparse: SparseIndex::new()?,
            graph: RelationGraph::new(),
            kinds: HashMap::new(),
        })
    }

    fn build(corpus: &Corpus) -> Result<Self, SparseIndexError> {
        let mut sparse = SparseIndex::new()?;
        let mut kinds = HashMap::with_capacity(corpus.len());

        for doc in corpus.documents() {
            sparse.add(doc.id.clone(), &doc.text)?;
            kinds.insert(doc.id.clone(), doc.kind.clone());
        }
        sparse.build()?;

        Ok(Self {
            sparse,
            graph: RelationGraph::from_corpus(corpus),
            kinds,
        })
    }
}

/// Hybrid retriever over one schema corpus
///
/// Owns the in-memory indices and talks to the embedding provider and the
/// document store through their traits. Queries take `&self` and can run
/// concurrently; ingestion swaps in a whole new index generation.
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
    state: Arc<RetrievalState>,
    config: RetrievalConfig,
    batch_size: usize,
}

impl Retriever {
    /// Create a retriever with no corpus loaded
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn DocumentStore>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        Ok(Self {
            provider,
            store,
            state: Arc::new(RetrievalState::empty()?),
            config,
            batch_size: 32,
        })
    }

    /// Texts per embedding request during ingestion
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Whether a corpus has been ingested or restored
    pub fn is_ready(&self) -> bool {
        self.state.sparse.is_built()
    }

    pub fn graph_stats(&self) -> GraphStats {
        self.state.graph.stats()
    }

    /// Replace the store contents and indices with `corpus`
    ///
    /// Embedding and index building run before the store is touched, and
    /// the store swap is all-or-nothing, so any failure leaves the previous
    /// generation in place.
    pub async fn ingest(&mut self, corpus: &Corpus) -> Result<IngestReport, RetrievalError> {
        let start = Instant::now();
        info!("Ingesting corpus of {} documents", corpus.len());

        let ids: Vec<String> = corpus.documents().iter().map(|d| d.id.clone()).collect();
        let texts: Vec<String> = corpus.documents().iter().map(|d| d.text.clone()).collect();
        let metadatas: Vec<Metadata> = corpus
            .documents()
            .iter()
            .map(|d| d.metadata.clone())
            .collect();

        let embedder = BatchEmbedder::new(Arc::clone(&self.provider), self.batch_size);
        let to_embed = texts.clone();
        let embedded = spawn_blocking(EMBEDDING, move || embedder.embed_all(&to_embed))
            .await?
            .map_err(|e| unavailable(EMBEDDING, e))?;
        let batches = embedded.batches;

        let owned = corpus.clone();
        let state = spawn_blocking("sparse index", move || RetrievalState::build(&owned)).await??;

        let store = Arc::clone(&self.store);
        spawn_blocking(STORE, move || {
            store.replace_all(&ids, &texts, &embedded.vectors, &metadatas)
        })
        .await?
        .map_err(store_unavailable)?;

        self.state = Arc::new(state);

        let stats = self.state.graph.stats();
        let report = IngestReport {
            documents: corpus.len(),
            tables: stats.tables,
            relations: stats.relations,
            batches,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Ingested {} documents ({} tables, {} relations) in {}ms",
            report.documents, report.tables, report.relations, report.duration_ms
        );
        Ok(report)
    }

    /// Rebuild the in-memory indices from what the store already holds
    pub async fn restore(&mut self) -> Result<usize, RetrievalError> {
        let store = Arc::clone(&self.store);
        let stored = spawn_blocking(STORE, move || store.all_documents())
            .await?
            .map_err(store_unavailable)?;

        let corpus = Corpus::from_stored(stored)?;
        let count = corpus.len();

        let state = spawn_blocking("sparse index", move || RetrievalState::build(&corpus)).await??;
        self.state = Arc::new(state);

        info!("Restored {} documents from the document store", count);
        Ok(count)
    }

    /// Run a hybrid query
    ///
    /// Dense and sparse channels run concurrently and are summed with their
    /// weights; one-hop neighbors of the scored tables then get a flat
    /// bonus. The best `top_k` ids are hydrated from the store, and ids the
    /// store cannot return are dropped.
    pub async fn query(&self, query: &SearchQuery) -> Result<Vec<RankedResult>, RetrievalError> {
        if query.text.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        if query.top_k == 0 {
            return Err(RetrievalError::InvalidQuery(
                "top_k must be greater than 0".to_string(),
            ));
        }

        let timeout = query.timeout.unwrap_or_else(|| self.config.timeout());
        let state = Arc::clone(&self.state);

        let (dense, sparse) = tokio::join!(
            self.dense_search(&query.text, query.top_k, timeout),
            async { state.sparse.query(&query.text, query.top_k) }
        );
        let dense = dense?;
        let sparse = sparse?;

        debug!(
            "Query {:?}: {} dense hits, {} sparse hits",
            query.text,
            dense.len(),
            sparse.len()
        );

        let mut scores = ScoreMap::new();
        scores.merge_weighted(&dense, self.config.dense_weight);
        scores.merge_weighted(&sparse, self.config.sparse_weight);

        let boosted = scores.expand_with_graph(&state.graph, &state.kinds, self.config.graph_bonus);
        debug!("Graph expansion boosted {} neighbor tables", boosted);

        let ranked = scores.top_k(query.top_k);
        self.hydrate(ranked, timeout).await
    }

    /// `(id, 1 - distance)` for the nearest documents
    async fn dense_search(
        &self,
        text: &str,
        top_k: usize,
        timeout: Duration,
    ) -> Result<Vec<(String, f32)>, RetrievalError> {
        let provider = Arc::clone(&self.provider);
        let owned = text.to_string();
        let embedded = with_timeout(EMBEDDING, timeout, move || provider.embed(&owned)).await?;

        let vector = match embedded {
            Ok(vector) => vector,
            Err(e) if self.config.sparse_fallback => {
                warn!("Embedding failed, falling back to sparse-only results: {}", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(unavailable(EMBEDDING, e)),
        };

        let store = Arc::clone(&self.store);
        let hits = with_timeout(STORE, timeout, move || store.query_by_vector(&vector, top_k))
            .await?
            .map_err(store_unavailable)?;

        Ok(hits
            .into_iter()
            .map(|hit| (hit.id, 1.0 - hit.distance))
            .collect())
    }

    /// Attach text and metadata to ranked ids, keeping their order
    async fn hydrate(
        &self,
        ranked: Vec<(String, f32)>,
        timeout: Duration,
    ) -> Result<Vec<RankedResult>, RetrievalError> {
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let store = Arc::clone(&self.store);
        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let fetched = with_timeout(STORE, timeout, move || store.get_by_ids(&ids)).await?;

        let mut documents: HashMap<String, _> = match fetched {
            Ok(docs) => docs.into_iter().map(|d| (d.id.clone(), d)).collect(),
            Err(e) => {
                warn!("Hydration failed, dropping {} results: {}", ranked.len(), e);
                return Ok(Vec::new());
            }
        };

        let total = ranked.len();
        let results: Vec<RankedResult> = ranked
            .into_iter()
            .filter_map(|(id, score)| {
                let doc = documents.remove(&id)?;
                Some(RankedResult {
                    kind: DocumentKind::from_metadata(&doc.metadata),
                    id,
                    text: doc.text,
                    metadata: doc.metadata,
                    score,
                })
            })
            .collect();

        if results.len() < total {
            warn!(
                "Dropped {} results missing from the document store",
                total - results.len()
            );
        }

        Ok(results)
    }
}

/// Run blocking work off the async runtime
async fn spawn_blocking<T, F>(stage: &'static str, f: F) -> Result<T, RetrievalError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| unavailable(stage, format!("task failed: {}", e)))
}

/// Run blocking work off the async runtime, bounded by `timeout`
async fn with_timeout<T, F>(stage: &'static str, timeout: Duration, f: F) -> Result<T, RetrievalError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::time::timeout(timeout, spawn_blocking(stage, f))
        .await
        .map_err(|_| RetrievalError::Timeout {
            stage,
            timeout_ms: timeout.as_millis() as u64,
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::schema::{Schema, TableSpec};
    use crate::store::{InMemoryDocumentStore, StoredDocument, VectorHit};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const DIM: usize = 4;

    /// Embeds every text as the same unit vector; failure and width are switchable
    struct FixedProvider {
        fail: AtomicBool,
        width: AtomicUsize,
    }

    impl FixedProvider {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                width: AtomicUsize::new(DIM),
            }
        }
    }

    impl EmbeddingProvider for FixedProvider {
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EmbeddingError::Unavailable("provider down".to_string()));
            }
            let mut vector = vec![0.0; self.width.load(Ordering::SeqCst)];
            vector[0] = 1.0;
            Ok(texts.iter().map(|_| vector.clone()).collect())
        }

        fn dimension(&self) -> usize {
            self.width.load(Ordering::SeqCst)
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Store stub returning scripted vector hits
    struct ScriptedStore {
        hits: Vec<VectorHit>,
        docs: Vec<StoredDocument>,
        fail_hydration: bool,
    }

    impl DocumentStore for ScriptedStore {
        fn upsert(
            &self,
            _ids: &[String],
            _texts: &[String],
            _vectors: &[Vec<f32>],
            _metadatas: &[Metadata],
        ) -> Result<(), StoreError> {
            Ok(())
        }

        fn query_by_vector(&self, _vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, StoreError> {
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }

        fn get_by_ids(&self, ids: &[String]) -> Result<Vec<StoredDocument>, StoreError> {
            if self.fail_hydration {
                return Err(StoreError::Unavailable("offline".to_string()));
            }
            Ok(self
                .docs
                .iter()
                .filter(|d| ids.contains(&d.id))
                .cloned()
                .collect())
        }

        fn all_documents(&self) -> Result<Vec<StoredDocument>, StoreError> {
            Ok(self.docs.clone())
        }

        fn replace_all(
            &self,
            _ids: &[String],
            _texts: &[String],
            _vectors: &[Vec<f32>],
            _metadatas: &[Metadata],
        ) -> Result<(), StoreError> {
            Ok(())
        }

        fn clear(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn len(&self) -> Result<usize, StoreError> {
            Ok(self.docs.len())
        }
    }

    fn shop_corpus() -> Corpus {
        let schema: Schema = [
            TableSpec::new("customers")
                .with_description("registered buyers")
                .with_column("id", Some("INT"), "customer key"),
            TableSpec::new("orders")
                .with_description("orders placed by customers")
                .with_column("id", Some("INT"), "order key")
                .with_column("customer_id", Some("INT"), "buyer")
                .with_relation("customer_id", "customers", "id"),
        ]
        .into_iter()
        .collect();
        Corpus::from_schema(&schema).unwrap()
    }

    fn stored(corpus: &Corpus) -> Vec<StoredDocument> {
        corpus
            .documents()
            .iter()
            .map(|d| StoredDocument {
                id: d.id.clone(),
                text: d.text.clone(),
                metadata: d.metadata.clone(),
            })
            .collect()
    }

    async fn scripted(hits: Vec<VectorHit>, fail_hydration: bool) -> Retriever {
        let corpus = shop_corpus();
        let store = ScriptedStore {
            hits,
            docs: stored(&corpus),
            fail_hydration,
        };
        let mut retriever = Retriever::new(
            Arc::new(FixedProvider::new()),
            Arc::new(store),
            RetrievalConfig::default(),
        )
        .unwrap();
        retriever.restore().await.unwrap();
        retriever
    }

    fn hit(id: &str, distance: f32) -> VectorHit {
        VectorHit {
            id: id.to_string(),
            distance,
            text: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_queries() {
        let retriever = scripted(Vec::new(), false).await;

        assert!(matches!(
            retriever.query(&SearchQuery::new("   ", 5)).await,
            Err(RetrievalError::InvalidQuery(_))
        ));
        assert!(matches!(
            retriever.query(&SearchQuery::new("orders", 0)).await,
            Err(RetrievalError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_fused_score_is_weighted_sum() {
        let retriever = scripted(vec![hit("table::orders", 0.25)], false).await;

        let sparse = retriever.state.sparse.query("orders", 5).unwrap();
        let sparse_score = sparse
            .iter()
            .find(|(id, _)| id == "table::orders")
            .map(|(_, s)| *s)
            .unwrap();

        // Only table::orders is scored, so the bonus lands on customers alone
        let results = retriever.query(&SearchQuery::new("orders", 10)).await.unwrap();
        let orders = results.iter().find(|r| r.id == "table::orders").unwrap();
        let expected = 1.0 * (1.0 - 0.25) + 0.8 * sparse_score;
        assert!((orders.score - expected).abs() < 1e-6);

        let customers = results.iter().find(|r| r.id == "table::customers").unwrap();
        assert_eq!(customers.score, 0.5);
        assert_eq!(orders.kind.as_ref().and_then(|k| k.as_table()), Some("orders"));
    }

    #[tokio::test]
    async fn test_graph_neighbor_surfaces_without_signal() {
        // "zzz" matches nothing lexically; only the dense hit seeds the graph
        let retriever = scripted(vec![hit("table::customers", 0.1)], false).await;

        let results = retriever.query(&SearchQuery::new("zzz", 2)).await.unwrap();
        let ranked: Vec<(&str, f32)> = results.iter().map(|r| (r.id.as_str(), r.score)).collect();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "table::customers");
        assert!((ranked[0].1 - 0.9).abs() < 1e-6);
        assert_eq!(ranked[1], ("table::orders", 0.5));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_fatal_by_default() {
        let provider = Arc::new(FixedProvider::new());
        let mut retriever = Retriever::new(
            provider.clone(),
            Arc::new(InMemoryDocumentStore::new(DIM)),
            RetrievalConfig::default(),
        )
        .unwrap();
        retriever.ingest(&shop_corpus()).await.unwrap();

        provider.fail.store(true, Ordering::SeqCst);
        let result = retriever.query(&SearchQuery::new("orders", 5)).await;
        assert!(matches!(
            result,
            Err(RetrievalError::ProviderUnavailable { provider: EMBEDDING, .. })
        ));
    }

    #[tokio::test]
    async fn test_sparse_fallback_when_enabled() {
        let provider = Arc::new(FixedProvider::new());
        let config = RetrievalConfig {
            sparse_fallback: true,
            ..RetrievalConfig::default()
        };
        let mut retriever = Retriever::new(
            provider.clone(),
            Arc::new(InMemoryDocumentStore::new(DIM)),
            config,
        )
        .unwrap();
        retriever.ingest(&shop_corpus()).await.unwrap();

        provider.fail.store(true, Ordering::SeqCst);
        let results = retriever.query(&SearchQuery::new("orders", 3)).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].id, "table::orders");
    }

    #[tokio::test]
    async fn test_failed_ingest_keeps_previous_generation() {
        let provider = Arc::new(FixedProvider::new());
        let store = Arc::new(InMemoryDocumentStore::new(DIM));
        let mut retriever =
            Retriever::new(provider.clone(), store.clone(), RetrievalConfig::default()).unwrap();
        retriever.ingest(&shop_corpus()).await.unwrap();

        provider.fail.store(true, Ordering::SeqCst);
        assert!(retriever.ingest(&shop_corpus()).await.is_err());

        assert!(retriever.is_ready());
        assert_eq!(store.len().unwrap(), shop_corpus().len());
    }

    #[tokio::test]
    async fn test_rejected_store_write_keeps_previous_generation() {
        let provider = Arc::new(FixedProvider::new());
        let store = Arc::new(InMemoryDocumentStore::new(DIM));
        let mut retriever =
            Retriever::new(provider.clone(), store.clone(), RetrievalConfig::default()).unwrap();
        let corpus = shop_corpus();
        retriever.ingest(&corpus).await.unwrap();

        // Store was built for DIM; narrower vectors are refused at write time
        provider.width.store(DIM - 1, Ordering::SeqCst);
        assert!(matches!(
            retriever.ingest(&corpus).await,
            Err(RetrievalError::ProviderUnavailable { provider: STORE, .. })
        ));

        assert!(retriever.is_ready());
        assert_eq!(store.len().unwrap(), corpus.len());

        provider.width.store(DIM, Ordering::SeqCst);
        let results = retriever.query(&SearchQuery::new("orders", 3)).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "table::orders");
    }

    #[tokio::test]
    async fn test_hydration_failure_drops_results() {
        let retriever = scripted(vec![hit("table::customers", 0.1)], true).await;
        let results = retriever.query(&SearchQuery::new("customers", 5)).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_missing_ids_are_dropped() {
        let retriever = scripted(vec![hit("table::ghost", 0.0), hit("table::customers", 0.2)], false).await;

        let results = retriever.query(&SearchQuery::new("zzz", 5)).await.unwrap();
        assert!(results.iter().all(|r| r.id != "table::ghost"));
        assert_eq!(results[0].id, "table::customers");
    }

    #[tokio::test]
    async fn test_ingest_report() {
        let mut retriever = Retriever::new(
            Arc::new(FixedProvider::new()),
            Arc::new(InMemoryDocumentStore::new(DIM)),
            RetrievalConfig::default(),
        )
        .unwrap()
        .with_batch_size(2);
        assert!(!retriever.is_ready());

        let corpus = shop_corpus();
        let report = retriever.ingest(&corpus).await.unwrap();

        assert_eq!(report.documents, corpus.len());
        assert_eq!(report.tables, 2);
        assert_eq!(report.relations, 1);
        assert_eq!(report.batches, corpus.len().div_ceil(2));
        assert!(retriever.is_ready());
    }
}
