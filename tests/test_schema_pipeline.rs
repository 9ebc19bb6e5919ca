//! Schema loading through corpus generation and graph construction

mod common;

use common::{shop_schema, HashingProvider};
use erdrag::config::RetrievalConfig;
use erdrag::corpus::{Corpus, DocumentKind};
use erdrag::graph::RelationGraph;
use erdrag::retrieval::{build_prompt, Retriever, SearchQuery};
use erdrag::schema::{Schema, SchemaError, SchemaFormat};
use erdrag::store::InMemoryDocumentStore;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const ERD: &str = r#"# Library ERD

Some notes that are not part of any table.

### Table: members
Description: People holding a library card
- `id` (INTEGER) - primary key
- `full_name` (TEXT) - name on the card

### Table: loans
Description: Books currently checked out
Description: one row per borrowed copy
- `id` (INTEGER) - primary key
- `member_id` (INTEGER) - FK -> members.id
- `book_id` (INTEGER) - FK -> books.id
- `due_dt` (DATE) - return deadline

### Table: books
- `id` (INTEGER) - primary key
- `title` - book title
"#;

#[test]
fn test_markdown_to_corpus() {
    let schema = Schema::from_markdown(ERD).unwrap();
    assert_eq!(schema.len(), 3);

    let loans = schema.get("loans").unwrap();
    assert_eq!(
        loans.description,
        "Books currently checked out one row per borrowed copy"
    );
    assert_eq!(loans.relations.len(), 2);

    let title = &schema.get("books").unwrap().columns[1];
    assert_eq!(title.data_type, None);

    let corpus = Corpus::from_schema(&schema).unwrap();
    // 3 table docs, 8 column docs, 2 relation docs
    assert_eq!(corpus.len(), 13);
    assert!(corpus
        .documents()
        .iter()
        .any(|d| d.id == "rel::loans::member_id->members.id"));

    let title_doc = corpus
        .documents()
        .iter()
        .find(|d| d.id == "books::title")
        .unwrap();
    assert!(title_doc.text.contains("Type: unknown"));

    let graph = RelationGraph::from_corpus(&corpus);
    let neighbors: Vec<String> = graph.one_hop_neighbors(["loans"]).into_iter().collect();
    assert_eq!(neighbors, vec!["books", "members"]);
}

#[test]
fn test_load_json_and_toml_files() {
    let dir = TempDir::new().unwrap();

    let json_path = dir.path().join("schema.json");
    fs::write(
        &json_path,
        r#"{
            "authors": {"name": "authors", "description": "", "columns": [{"name": "id", "type": "INT", "desc": ""}], "relations": []},
            "posts": {"name": "posts", "description": "blog posts",
                      "columns": [{"name": "author_id", "type": "INT", "desc": "writer"}],
                      "relations": [{"from_col": "author_id", "to_table": "authors", "to_col": "id"}]}
        }"#,
    )
    .unwrap();

    let toml_path = dir.path().join("schema.toml");
    fs::write(
        &toml_path,
        r#"
[authors]
name = "authors"
description = ""
columns = [{ name = "id", type = "INT", desc = "" }]
relations = []

[posts]
name = "posts"
description = "blog posts"
columns = [{ name = "author_id", type = "INT", desc = "writer" }]
relations = [{ from_col = "author_id", to_table = "authors", to_col = "id" }]
"#,
    )
    .unwrap();

    let from_json = Schema::load(&json_path, None).unwrap();
    let from_toml = Schema::load(&toml_path, None).unwrap();
    assert_eq!(from_json, from_toml);
    assert_eq!(from_json.get("posts").unwrap().relations[0].to_table, "authors");

    // Explicit format wins over the extension
    let md_path = dir.path().join("erd.txt");
    fs::write(&md_path, ERD).unwrap();
    assert!(Schema::load(&md_path, None).is_err());
    assert_eq!(Schema::load(&md_path, Some(SchemaFormat::Markdown)).unwrap().len(), 3);
}

#[test]
fn test_dangling_relation_rejected_at_build_time() {
    let schema = Schema::from_markdown(
        "### Table: loans\n- `book_id` (INTEGER) - FK -> books.id\n",
    )
    .unwrap();

    match Corpus::from_schema(&schema) {
        Err(SchemaError::UnknownTable { table, to_table, .. }) => {
            assert_eq!(table, "loans");
            assert_eq!(to_table, "books");
        }
        other => panic!("expected UnknownTable, got {:?}", other),
    }
}

#[test]
fn test_repeated_json_relation_rejected_at_build_time() {
    let schema = Schema::from_json(
        r#"{
            "customers": {"name": "customers", "columns": [{"name": "id"}]},
            "orders": {"name": "orders",
                       "columns": [{"name": "customer_id"}],
                       "relations": [
                           {"from_col": "customer_id", "to_table": "customers", "to_col": "id"},
                           {"from_col": "customer_id", "to_table": "customers", "to_col": "id"}
                       ]}
        }"#,
    )
    .unwrap();
    assert!(schema.validate().is_ok());

    assert!(matches!(
        Corpus::from_schema(&schema),
        Err(SchemaError::DuplicateDocumentId { .. })
    ));
}

#[test]
fn test_metadata_recovers_kind() {
    let corpus = Corpus::from_schema(&shop_schema()).unwrap();

    for doc in corpus.documents() {
        assert_eq!(DocumentKind::from_metadata(&doc.metadata).as_ref(), Some(&doc.kind));
        assert_eq!(doc.kind.document_id(), doc.id);
    }

    let cust_name = corpus
        .documents()
        .iter()
        .find(|d| d.id == "customers::cust_name")
        .unwrap();
    assert_eq!(
        cust_name.metadata.get("canonical_column").map(String::as_str),
        Some("customer name")
    );
}

#[tokio::test]
async fn test_markdown_pipeline_to_prompt() {
    let schema = Schema::from_markdown(ERD).unwrap();
    let corpus = Corpus::from_schema(&schema).unwrap();

    let provider = Arc::new(HashingProvider::new());
    let store = Arc::new(InMemoryDocumentStore::new(common::DIM));
    let mut retriever = Retriever::new(provider, store, RetrievalConfig::default()).unwrap();
    retriever.ingest(&corpus).await.unwrap();

    let question = "which books are checked out";
    let results = retriever.query(&SearchQuery::new(question, 5)).await.unwrap();
    assert!(results.iter().any(|r| r.id == "table::loans"));

    let prompt = build_prompt(question, &results);
    assert!(prompt.contains("- Table: loans"));
    assert!(prompt.contains(&format!("USER QUESTION:\n{}", question)));
}
