/// In-memory BM25 lexical index backed by tantivy
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::*;
use tantivy::tokenizer::{TextAnalyzer, WhitespaceTokenizer};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError};
use thiserror::Error;

const TOKENIZER: &str = "whitespace";
const WRITER_MEMORY_BYTES: usize = 50_000_000;

#[derive(Error, Debug)]
pub enum SparseIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Index already built; create a new index to change the corpus")]
    AlreadyBuilt,

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),
}

/// Lowercase, then split on whitespace. No stemming, no stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// BM25 index over document ids
///
/// Lifecycle: documents are accumulated with [`add`](Self::add), compiled by
/// [`build`](Self::build), then queried. Querying before `build` yields no
/// hits, and `add` after `build` is rejected. Once built the index is
/// read-only and can be shared between threads.
pub struct SparseIndex {
    index: Index,
    writer: Option<IndexWriter>,
    reader: Option<IndexReader>,
    ordinal_field: Field,
    text_field: Field,
    /// Document ids in insertion order; a hit's ordinal indexes into this
    ids: Vec<String>,
}

impl SparseIndex {
    pub fn new() -> Result<Self, SparseIndexError> {
        let mut schema_builder = Schema::builder();

        let ordinal_field = schema_builder.add_u64_field("ordinal", STORED);
        let indexing = TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqs);
        let text_field = schema_builder.add_text_field(
            "text",
            TextOptions::default().set_indexing_options(indexing),
        );

        let index = Index::create_in_ram(schema_builder.build());

        // Text is pre-tokenized by `tokenize` and re-joined with single
        // spaces, so splitting on whitespace reproduces the same tokens
        index
            .tokenizers()
            .register(TOKENIZER, TextAnalyzer::from(WhitespaceTokenizer::default()));

        let writer = index
            .writer(WRITER_MEMORY_BYTES)
            .map_err(|e| SparseIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            writer: Some(writer),
            reader: None,
            ordinal_field,
            text_field,
            ids: Vec::new(),
        })
    }

    /// Queue a document for indexing
    pub fn add(&mut self, id: impl Into<String>, text: &str) -> Result<(), SparseIndexError> {
        let writer = self.writer.as_mut().ok_or(SparseIndexError::AlreadyBuilt)?;

        let ordinal = self.ids.len() as u64;
        writer.add_document(doc!(
            self.ordinal_field => ordinal,
            self.text_field => tokenize(text).join(" "),
        ))?;

        self.ids.push(id.into());
        Ok(())
    }

    /// Compile accumulated documents into a searchable index
    ///
    /// Calling it again on a built index is a no-op.
    pub fn build(&mut self) -> Result<(), SparseIndexError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        writer.commit()?;
        writer.wait_merging_threads()?;

        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        self.reader = Some(reader);

        tracing::debug!("Sparse index built over {} documents", self.ids.len());
        Ok(())
    }

    /// Top `top_k` `(id, score)` pairs with score > 0, best first
    ///
    /// Equal scores keep insertion order.
    pub fn query(&self, q: &str, top_k: usize) -> Result<Vec<(String, f32)>, SparseIndexError> {
        let Some(reader) = &self.reader else {
            return Ok(Vec::new());
        };

        let tokens = tokenize(q);
        if tokens.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let searcher = reader.searcher();
        let num_docs = searcher.num_docs() as usize;
        if num_docs == 0 {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|token| {
                let term = Term::from_field_text(self.text_field, token);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        // Collect every match so ties can be ordered by insertion below
        let top_docs = searcher.search(&query, &TopDocs::with_limit(num_docs))?;

        let mut hits: Vec<(usize, f32)> = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            if score <= 0.0 {
                continue;
            }

            let stored: TantivyDocument = searcher.doc(address)?;
            let ordinal = stored
                .get_first(self.ordinal_field)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| {
                    SparseIndexError::SearchError("Missing or invalid ordinal field".to_string())
                })?;

            hits.push((ordinal as usize, score));
        }

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(top_k);

        Ok(hits
            .into_iter()
            .filter_map(|(ordinal, score)| self.ids.get(ordinal).map(|id| (id.clone(), score)))
            .collect())
    }

    pub fn is_built(&self) -> bool {
        self.reader.is_some()
    }

    /// Number of documents added so far
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built(docs: &[(&str, &str)]) -> SparseIndex {
        let mut index = SparseIndex::new().unwrap();
        for (id, text) in docs {
            index.add(*id, text).unwrap();
        }
        index.build().unwrap();
        index
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Table `Orders`\n  has\tCUSTOMER_id"),
            vec!["table", "`orders`", "has", "customer_id"]
        );
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_query_before_build_is_empty() {
        let mut index = SparseIndex::new().unwrap();
        index.add("a", "customer orders").unwrap();

        assert!(!index.is_built());
        assert!(index.query("customer", 5).unwrap().is_empty());
    }

    #[test]
    fn test_add_after_build_rejected() {
        let mut index = built(&[("a", "customer")]);
        assert!(matches!(
            index.add("b", "orders"),
            Err(SparseIndexError::AlreadyBuilt)
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_basic_ranking() {
        let index = built(&[
            ("table::customers", "customer accounts and customer contacts"),
            ("table::orders", "orders placed by a customer"),
            ("table::products", "catalog of products"),
        ]);

        let results = index.query("customer", 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "table::customers");
        assert!(results[0].1 > results[1].1);
        assert!(results.iter().all(|(_, s)| *s > 0.0));
    }

    #[test]
    fn test_case_insensitive_exact_tokens() {
        let index = built(&[("a", "Customer"), ("b", "customers")]);

        let results = index.query("CUSTOMER", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn test_no_match_returns_empty() {
        let index = built(&[("a", "customer"), ("b", "orders")]);
        assert!(index.query("xyz", 5).unwrap().is_empty());
        assert!(index.query("", 5).unwrap().is_empty());
    }

    #[test]
    fn test_top_k_bound_and_order() {
        let docs: Vec<(String, String)> = (0..20)
            .map(|i| (format!("doc{}", i), format!("orders {}", "filler ".repeat(i))))
            .collect();
        let refs: Vec<(&str, &str)> = docs.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let index = built(&refs);

        let results = index.query("orders", 5).unwrap();
        assert_eq!(results.len(), 5);
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
        // Shorter documents score higher
        assert_eq!(results[0].0, "doc0");
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = built(&[("z", "orders"), ("a", "orders"), ("m", "orders")]);

        let ids: Vec<String> = index
            .query("orders", 10)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut index = built(&[("a", "orders")]);
        index.build().unwrap();
        assert_eq!(index.query("orders", 1).unwrap().len(), 1);
    }
}
