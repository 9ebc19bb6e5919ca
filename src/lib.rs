//! erdrag - hybrid retrieval over relational schema documents
//!
//! Tables, columns and foreign keys of a schema become small text
//! documents. Queries are answered by adding dense embedding similarity
//! and BM25 scores, boosting tables one foreign key away from the hits,
//! and hydrating the best results from a document store.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod retrieval;
pub mod schema;
pub mod store;

pub use error::{ErdRagError, Result};
