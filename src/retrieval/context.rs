//! Schema context prompt for answering questions from retrieved documents

use super::RankedResult;
use crate::corpus::DocumentKind;
use std::fmt::Write;

/// Columns listed per table
const MAX_COLUMNS: usize = 10;

struct TableBlock<'a> {
    table: &'a str,
    summary: Option<&'a str>,
    columns: Vec<&'a str>,
    relations: Vec<&'a str>,
}

fn block_for<'a, 'b>(blocks: &'b mut Vec<TableBlock<'a>>, table: &'a str) -> &'b mut TableBlock<'a> {
    let position = match blocks.iter().position(|b| b.table == table) {
        Some(position) => position,
        None => {
            blocks.push(TableBlock {
                table,
                summary: None,
                columns: Vec::new(),
                relations: Vec::new(),
            });
            blocks.len() - 1
        }
    };
    &mut blocks[position]
}

/// Group results by table into a compact schema block
///
/// Tables appear in order of their first result. A table line shows only
/// the first line of its document. Relations are listed under the table
/// that owns the foreign key.
pub fn build_schema_block(results: &[RankedResult]) -> String {
    let mut blocks: Vec<TableBlock<'_>> = Vec::new();

    for result in results {
        match &result.kind {
            Some(DocumentKind::Table { table }) => {
                let block = block_for(&mut blocks, table);
                if block.summary.is_none() {
                    block.summary = result.text.lines().next();
                }
            }
            Some(DocumentKind::Column { table, .. }) => {
                block_for(&mut blocks, table).columns.push(&result.text);
            }
            Some(DocumentKind::Relation { from_table, .. }) => {
                block_for(&mut blocks, from_table).relations.push(&result.text);
            }
            None => {}
        }
    }

    let mut out = String::new();
    for block in &blocks {
        let _ = writeln!(out, "- Table: {}", block.table);
        if let Some(summary) = block.summary {
            let _ = writeln!(out, "  {}", summary);
        }
        if !block.columns.is_empty() {
            out.push_str("  Columns:\n");
            for column in block.columns.iter().take(MAX_COLUMNS) {
                let _ = writeln!(out, "    - {}", column);
            }
        }
        if !block.relations.is_empty() {
            out.push_str("  Relations:\n");
            for relation in &block.relations {
                let _ = writeln!(out, "    - {}", relation);
            }
        }
    }

    out.truncate(out.trim_end().len());
    out
}

/// Prompt asking a model to answer `question` from the retrieved schema
pub fn build_prompt(question: &str, results: &[RankedResult]) -> String {
    format!(
        "SCHEMA CONTEXT:\n{}\n\nUSER QUESTION:\n{}\n\nINSTRUCTIONS:\n\
         Using only the SCHEMA CONTEXT above, answer the USER QUESTION. When referencing a \
         table or column, include the exact table/column names from the schema and a brief \
         justification (which columns or relations you used). If you can't answer, say you \
         don't know.\n",
        build_schema_block(results),
        question
    )
}
