//! Markdown ERD parser
//!
//! Expected layout:
//!
//! ```text
//! ### Table: orders
//! Description: Orders placed by customers
//! - `order_id` (INT) - primary key
//! - `cust_id` (INT) - FK -> customers.id
//! ```

use super::{ColumnSpec, RelationSpec, Schema, SchemaError, TableSpec};
use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    table: Regex,
    column: Regex,
    foreign_key: Regex,
    description: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            table: Regex::new(r"(?i)^###\s*Table\s*:\s*(\S+)")?,
            column: Regex::new(r"^\s*-\s*`?(\w+)`?\s*(\([^)]+\))?\s*-\s*(.*)")?,
            foreign_key: Regex::new(r"FK\s*->\s*([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)")?,
            description: Regex::new(r"(?i)^\s*Description\s*:\s*(.*)")?,
        })
    }
}

fn patterns() -> Result<&'static Patterns, SchemaError> {
    static PATTERNS: OnceLock<Result<Patterns, regex::Error>> = OnceLock::new();
    PATTERNS
        .get_or_init(Patterns::compile)
        .as_ref()
        .map_err(|e| SchemaError::InvalidPattern(e.clone()))
}

/// Parse a markdown ERD into a [`Schema`]
///
/// Lines before the first table header are ignored. A column whose
/// description contains `FK -> table.col` also yields a relation.
pub fn parse_markdown_erd(md_text: &str) -> Result<Schema, SchemaError> {
    let patterns = patterns()?;
    let mut schema = Schema::new();
    let mut current: Option<TableSpec> = None;

    for line in md_text.lines() {
        let line = line.trim_end();

        if let Some(caps) = patterns.table.captures(line) {
            if let Some(done) = current.take() {
                schema.insert(done);
            }
            current = Some(TableSpec::new(caps[1].trim()));
            continue;
        }

        let Some(table) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = patterns.column.captures(line) {
            let name = caps[1].to_string();
            let data_type = caps
                .get(2)
                .map(|m| m.as_str().trim_matches(|c| c == '(' || c == ')').to_string());
            let desc = caps[3].trim().to_string();

            if let Some(fk) = patterns.foreign_key.captures(&desc) {
                table.relations.push(RelationSpec {
                    from_col: name.clone(),
                    to_table: fk[1].to_string(),
                    to_col: fk[2].to_string(),
                });
            }

            table.columns.push(ColumnSpec {
                name,
                data_type,
                desc,
            });
            continue;
        }

        if let Some(caps) = patterns.description.captures(line) {
            let text = caps[1].trim();
            if table.description.is_empty() {
                table.description = text.to_string();
            } else {
                table.description.push(' ');
                table.description.push_str(text);
            }
        }
    }

    if let Some(done) = current.take() {
        schema.insert(done);
    }

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERD: &str = "\
# Shop

### Table: customers
Description: People who buy things
- `id` (INT) - primary key
- `email` (TEXT) - login address

### Table: orders
Description: Orders placed by customers
Description: One row per checkout
- `order_id` (INT) - primary key
- `cust_id` (INT) - FK -> customers.id
- notes - free text
";

    #[test]
    fn test_parse_tables_and_columns() {
        let schema = parse_markdown_erd(ERD).unwrap();
        assert_eq!(schema.len(), 2);

        let customers = schema.get("customers").unwrap();
        assert_eq!(customers.description, "People who buy things");
        assert_eq!(customers.columns.len(), 2);
        assert_eq!(customers.columns[1].data_type.as_deref(), Some("TEXT"));
    }

    #[test]
    fn test_description_lines_concatenate() {
        let schema = parse_markdown_erd(ERD).unwrap();
        assert_eq!(
            schema.get("orders").unwrap().description,
            "Orders placed by customers One row per checkout"
        );
    }

    #[test]
    fn test_foreign_key_detection() {
        let schema = parse_markdown_erd(ERD).unwrap();
        let orders = schema.get("orders").unwrap();

        assert_eq!(orders.relations.len(), 1);
        assert_eq!(orders.relations[0].from_col, "cust_id");
        assert_eq!(orders.relations[0].to_table, "customers");
        assert_eq!(orders.relations[0].to_col, "id");

        let notes = orders.columns.iter().find(|c| c.name == "notes").unwrap();
        assert!(notes.data_type.is_none());

        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_no_tables() {
        assert!(parse_markdown_erd("- `id` (INT) - orphan column")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_patterns_compile() {
        let patterns = patterns().unwrap();
        assert!(patterns.table.is_match("### Table: orders"));
        assert!(patterns.foreign_key.is_match("FK -> customers.id"));
    }
}
