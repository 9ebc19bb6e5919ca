//! Schema documents and the corpus built from them
//!
//! Every table yields one table document, one document per column and one
//! document per foreign key. The kind of a document is carried as a typed
//! [`DocumentKind`] and mirrored into its metadata, so code that only has
//! stored metadata never needs to parse document ids.

mod canonical;

pub use canonical::{canonicalize, split_identifier};

use crate::schema::{ColumnSpec, RelationSpec, Schema, SchemaError, TableSpec};
use crate::store::StoredDocument;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// String metadata attached to every document
pub type Metadata = BTreeMap<String, String>;

const KIND_KEY: &str = "kind";

/// What a document describes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentKind {
    Table {
        table: String,
    },
    Column {
        table: String,
        column: String,
    },
    Relation {
        from_table: String,
        from_col: String,
        to_table: String,
        to_col: String,
    },
}

impl DocumentKind {
    /// Id of the table-level document for `table`
    pub fn table_document_id(table: &str) -> String {
        format!("table::{}", table)
    }

    /// Structured document id for this kind
    pub fn document_id(&self) -> String {
        match self {
            Self::Table { table } => Self::table_document_id(table),
            Self::Column { table, column } => format!("{}::{}", table, column),
            Self::Relation {
                from_table,
                from_col,
                to_table,
                to_col,
            } => format!("rel::{}::{}->{}.{}", from_table, from_col, to_table, to_col),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Table { .. } => "table",
            Self::Column { .. } => "column",
            Self::Relation { .. } => "relation",
        }
    }

    /// Table name if this is a table-level document
    pub fn as_table(&self) -> Option<&str> {
        match self {
            Self::Table { table } => Some(table),
            _ => None,
        }
    }

    /// Identifying metadata fields for this kind
    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(KIND_KEY.to_string(), self.label().to_string());
        match self {
            Self::Table { table } => {
                metadata.insert("table".to_string(), table.clone());
            }
            Self::Column { table, column } => {
                metadata.insert("table".to_string(), table.clone());
                metadata.insert("column".to_string(), column.clone());
            }
            Self::Relation {
                from_table,
                from_col,
                to_table,
                to_col,
            } => {
                metadata.insert("from_table".to_string(), from_table.clone());
                metadata.insert("from_col".to_string(), from_col.clone());
                metadata.insert("to_table".to_string(), to_table.clone());
                metadata.insert("to_col".to_string(), to_col.clone());
            }
        }
        metadata
    }

    /// Recover the kind from stored metadata
    ///
    /// Uses the `kind` tag when present and falls back to the identifying
    /// keys otherwise.
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        let field = |key: &str| metadata.get(key).cloned();

        let relation = || {
            Some(Self::Relation {
                from_table: field("from_table")?,
                from_col: field("from_col")?,
                to_table: field("to_table")?,
                to_col: field("to_col")?,
            })
        };
        let column = || {
            Some(Self::Column {
                table: field("table")?,
                column: field("column")?,
            })
        };
        let table = || Some(Self::Table { table: field("table")? });

        match metadata.get(KIND_KEY).map(String::as_str) {
            Some("table") => table(),
            Some("column") => column(),
            Some("relation") => relation(),
            Some(_) => None,
            None => relation().or_else(column).or_else(table),
        }
    }
}

/// A unit of retrievable schema text
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub kind: DocumentKind,
}

impl Document {
    /// Table-level document listing description and columns
    pub fn for_table(table: &TableSpec) -> Result<Self, SchemaError> {
        let canonical = canonicalize(&table.name)?;
        let column_lines: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("- {} ({}) - {}", c.name, type_label(c), c.desc))
            .collect();

        let text = format!(
            "Table `{}` (canonical: {}). Description: {}\nColumns:\n{}",
            table.name,
            canonical,
            table.description,
            column_lines.join("\n")
        );

        let kind = DocumentKind::Table {
            table: table.name.clone(),
        };
        let mut metadata = kind.to_metadata();
        metadata.insert("canonical_table".to_string(), canonical);

        Ok(Self::with_kind(kind, text, metadata))
    }

    pub fn for_column(table: &str, column: &ColumnSpec) -> Result<Self, SchemaError> {
        let canonical = canonicalize(&column.name)?;
        let text = format!(
            "Column `{}` (canonical: {}). Type: {}. Description: {}",
            column.name,
            canonical,
            type_label(column),
            column.desc
        );

        let kind = DocumentKind::Column {
            table: table.to_string(),
            column: column.name.clone(),
        };
        let mut metadata = kind.to_metadata();
        metadata.insert("canonical_column".to_string(), canonical);

        Ok(Self::with_kind(kind, text, metadata))
    }

    pub fn for_relation(table: &str, relation: &RelationSpec) -> Self {
        let text = format!(
            "Relation: `{}.{}` -> `{}.{}`",
            table, relation.from_col, relation.to_table, relation.to_col
        );

        let kind = DocumentKind::Relation {
            from_table: table.to_string(),
            from_col: relation.from_col.clone(),
            to_table: relation.to_table.clone(),
            to_col: relation.to_col.clone(),
        };
        let metadata = kind.to_metadata();

        Self::with_kind(kind, text, metadata)
    }

    fn with_kind(kind: DocumentKind, text: String, metadata: Metadata) -> Self {
        Self {
            id: kind.document_id(),
            text,
            metadata,
            kind,
        }
    }

    /// Rebuild a document read back from a store
    pub fn from_stored(stored: StoredDocument) -> Result<Self, SchemaError> {
        let kind = DocumentKind::from_metadata(&stored.metadata).ok_or_else(|| {
            SchemaError::UnknownDocumentKind {
                id: stored.id.clone(),
            }
        })?;

        Ok(Self {
            id: stored.id,
            text: stored.text,
            metadata: stored.metadata,
            kind,
        })
    }
}

fn type_label(column: &ColumnSpec) -> &str {
    column.data_type.as_deref().unwrap_or("unknown")
}

/// All documents of one schema plus the table and foreign-key lists the
/// relation graph is built from
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<Document>,
    tables: Vec<String>,
    relations: Vec<(String, String)>,
}

impl Corpus {
    /// Validate `schema` and generate its documents
    ///
    /// Tables are emitted in name order; within a table the table document
    /// comes first, then columns, then relations. Two documents with the
    /// same id (a repeated relation, or a table named `table` whose column
    /// collides with another table's document id) are rejected.
    pub fn from_schema(schema: &Schema) -> Result<Self, SchemaError> {
        schema.validate()?;

        let mut corpus = Corpus::default();
        let mut seen = HashSet::new();
        for table in schema.tables.values() {
            corpus.tables.push(table.name.clone());
            corpus.push_unique(&mut seen, Document::for_table(table)?)?;

            for column in &table.columns {
                corpus.push_unique(&mut seen, Document::for_column(&table.name, column)?)?;
            }

            for relation in &table.relations {
                corpus.push_unique(&mut seen, Document::for_relation(&table.name, relation))?;
                corpus
                    .relations
                    .push((table.name.clone(), relation.to_table.clone()));
            }
        }

        Ok(corpus)
    }

    fn push_unique(
        &mut self,
        seen: &mut HashSet<String>,
        document: Document,
    ) -> Result<(), SchemaError> {
        if !seen.insert(document.id.clone()) {
            return Err(SchemaError::DuplicateDocumentId { id: document.id });
        }
        self.documents.push(document);
        Ok(())
    }

    /// Rebuild a corpus from documents previously written to a store
    ///
    /// Tables come from table documents and graph edges from relation
    /// documents; a relation pointing at a table without a table document is
    /// rejected.
    pub fn from_stored<I>(stored: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = StoredDocument>,
    {
        let mut corpus = Corpus::default();
        for doc in stored {
            let doc = Document::from_stored(doc)?;
            match &doc.kind {
                DocumentKind::Table { table } => corpus.tables.push(table.clone()),
                DocumentKind::Relation {
                    from_table,
                    to_table,
                    ..
                } => corpus
                    .relations
                    .push((from_table.clone(), to_table.clone())),
                DocumentKind::Column { .. } => {}
            }
            corpus.documents.push(doc);
        }

        let known: BTreeSet<&str> = corpus.tables.iter().map(String::as_str).collect();
        for doc in &corpus.documents {
            if let DocumentKind::Relation {
                from_table,
                from_col,
                to_table,
                ..
            } = &doc.kind
            {
                for endpoint in [from_table, to_table] {
                    if !known.contains(endpoint.as_str()) {
                        return Err(SchemaError::UnknownTable {
                            table: from_table.clone(),
                            from_col: from_col.clone(),
                            to_table: endpoint.clone(),
                        });
                    }
                }
            }
        }

        Ok(corpus)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Directed `(from_table, to_table)` pairs, one per foreign key
    pub fn relations(&self) -> &[(String, String)] {
        &self.relations
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
