//! Relational schema description used as corpus input
//!
//! A [`Schema`] maps table names to [`TableSpec`]s. It can be read from JSON,
//! TOML or a markdown ERD, and is validated before any document is built from
//! it so malformed input fails at ingestion instead of at query time.

mod markdown;

pub use markdown::parse_markdown_erd;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read schema file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse schema: {0}")]
    Parse(String),

    #[error("Table name cannot be empty")]
    EmptyTableName,

    #[error("Table key '{key}' does not match table name '{name}'")]
    NameMismatch { key: String, name: String },

    #[error("Duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("Relation {table}.{from_col} references unknown table '{to_table}'")]
    UnknownTable {
        table: String,
        from_col: String,
        to_table: String,
    },

    #[error("Stored document '{id}' has no recognizable kind metadata")]
    UnknownDocumentKind { id: String },

    #[error("Document id '{id}' is generated more than once")]
    DuplicateDocumentId { id: String },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Input format of a schema file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    Json,
    Toml,
    Markdown,
}

impl SchemaFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// A column of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub desc: String,
}

/// A foreign key from one column of the owning table to `to_table.to_col`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSpec {
    pub from_col: String,
    pub to_table: String,
    pub to_col: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_column(mut self, name: &str, data_type: Option<&str>, desc: &str) -> Self {
        self.columns.push(ColumnSpec {
            name: name.to_string(),
            data_type: data_type.map(str::to_string),
            desc: desc.to_string(),
        });
        self
    }

    pub fn with_relation(mut self, from_col: &str, to_table: &str, to_col: &str) -> Self {
        self.relations.push(RelationSpec {
            from_col: from_col.to_string(),
            to_table: to_table.to_string(),
            to_col: to_col.to_string(),
        });
        self
    }
}

/// Table name to table description, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub tables: BTreeMap<String, TableSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a table keyed by its own name, replacing any previous one
    pub fn insert(&mut self, table: TableSpec) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Option<&TableSpec> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn from_json(content: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(content).map_err(|e| SchemaError::Parse(e.to_string()))
    }

    pub fn from_toml(content: &str) -> Result<Self, SchemaError> {
        toml::from_str(content).map_err(|e| SchemaError::Parse(e.to_string()))
    }

    pub fn from_markdown(content: &str) -> Result<Self, SchemaError> {
        parse_markdown_erd(content)
    }

    /// Read and parse a schema file; the format is guessed from the extension
    /// unless given explicitly
    pub fn load(path: &Path, format: Option<SchemaFormat>) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let format = format
            .or_else(|| SchemaFormat::from_path(path))
            .ok_or_else(|| {
                SchemaError::Parse(format!(
                    "Cannot infer schema format from {}",
                    path.display()
                ))
            })?;

        match format {
            SchemaFormat::Json => Self::from_json(&content),
            SchemaFormat::Toml => Self::from_toml(&content),
            SchemaFormat::Markdown => Self::from_markdown(&content),
        }
    }

    /// Check the invariants the corpus and relation graph rely on
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (key, table) in &self.tables {
            if table.name.trim().is_empty() {
                return Err(SchemaError::EmptyTableName);
            }
            if key != &table.name {
                return Err(SchemaError::NameMismatch {
                    key: key.clone(),
                    name: table.name.clone(),
                });
            }

            let mut seen = HashSet::new();
            for column in &table.columns {
                if !seen.insert(column.name.as_str()) {
                    return Err(SchemaError::DuplicateColumn {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    });
                }
            }

            for relation in &table.relations {
                if !self.tables.contains_key(&relation.to_table) {
                    return Err(SchemaError::UnknownTable {
                        table: table.name.clone(),
                        from_col: relation.from_col.clone(),
                        to_table: relation.to_table.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<TableSpec> for Schema {
    fn from_iter<I: IntoIterator<Item = TableSpec>>(iter: I) -> Self {
        let mut schema = Schema::new();
        for table in iter {
            schema.insert(table);
        }
        schema
    }
}
