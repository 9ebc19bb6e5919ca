//! CLI command definitions and parsing
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::schema::SchemaFormat;

#[derive(Parser, Debug)]
#[command(
    name = "erdrag",
    version,
    author = "neur0map",
    about = "Hybrid retrieval over relational schema documents",
    long_about = "erdrag indexes the tables, columns and foreign keys of a relational schema and answers \
                  natural-language questions by fusing dense embedding similarity, BM25 keyword matching \
                  and foreign-key adjacency."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/erdrag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the document store and indices from a schema file
    Index {
        /// Schema file (JSON, TOML or markdown ERD)
        #[arg(short, long, value_name = "FILE")]
        schema: PathBuf,

        /// Schema format (detected from the file extension by default)
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Search the indexed schema
    Query {
        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Show results in JSON format
        #[arg(long, conflicts_with = "prompt")]
        json: bool,

        /// Print a schema-context prompt built from the results
        #[arg(long)]
        prompt: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Json,
    Toml,
    Markdown,
}

impl From<FormatArg> for SchemaFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => SchemaFormat::Json,
            FormatArg::Toml => SchemaFormat::Toml,
            FormatArg::Markdown => SchemaFormat::Markdown,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
