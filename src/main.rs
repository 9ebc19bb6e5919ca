use erdrag::cli::{Cli, Commands, ConfigAction, FormatArg};
use erdrag::config::Config;
use erdrag::corpus::Corpus;
use erdrag::embedding::{provider_from_config, EmbeddingProvider, HnswParams};
use erdrag::error::{ErdRagError, Result};
use erdrag::retrieval::{build_prompt, RankedResult, Retriever, SearchQuery};
use erdrag::schema::Schema;
use erdrag::store::SqliteDocumentStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Index { schema, format } => {
            cmd_index(cli.config, cli.profile, &schema, format)?;
        }
        Commands::Query {
            query,
            top_k,
            json,
            prompt,
        } => {
            cmd_query(cli.config, cli.profile, &query, top_k, json, prompt)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "erdrag=debug" } else { "erdrag=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_index(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    schema_path: &Path,
    format: Option<FormatArg>,
) -> Result<()> {
    let config = load_config(config_path, profile)?;

    let schema = Schema::load(schema_path, format.map(Into::into))?;
    let corpus = Corpus::from_schema(&schema)?;
    tracing::info!(
        "Loaded {} tables ({} documents) from {}",
        schema.len(),
        corpus.len(),
        schema_path.display()
    );

    let provider = provider_from_config(&config)?;
    let mut retriever = open_retriever(&config, Arc::clone(&provider))?;

    let runtime = build_runtime()?;
    let report = runtime.block_on(retriever.ingest(&corpus))?;

    println!("✓ Indexed {}", schema_path.display());
    println!("  Documents: {}", report.documents);
    println!("  Tables:    {}", report.tables);
    println!("  Relations: {}", report.relations);
    println!("  Model:     {}", provider.model_name());
    println!("  Took:      {}ms", report.duration_ms);

    Ok(())
}

fn cmd_query(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    query: &str,
    top_k: Option<usize>,
    json: bool,
    prompt: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);

    let provider = provider_from_config(&config)?;
    let mut retriever = open_retriever(&config, provider)?;

    let runtime = build_runtime()?;
    let results = runtime.block_on(async {
        let restored = retriever.restore().await?;
        if restored == 0 {
            tracing::warn!("Document store is empty. Run 'erdrag index --schema <file>' first.");
        }
        retriever.query(&SearchQuery::new(query, top_k)).await
    })?;

    if json {
        let out = serde_json::to_string_pretty(&results).map_err(|e| ErdRagError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", out);
    } else if prompt {
        print!("{}", build_prompt(query, &results));
    } else {
        print_results(&results);
    }

    Ok(())
}

fn print_results(results: &[RankedResult]) {
    if results.is_empty() {
        println!("No results");
        return;
    }

    for (rank, result) in results.iter().enumerate() {
        let label = result.kind.as_ref().map(|k| k.label()).unwrap_or("unknown");
        println!("{:>2}. [{:.3}] {} ({})", rank + 1, result.score, result.id, label);
        if let Some(first_line) = result.text.lines().next() {
            println!("    {}", first_line);
        }
    }
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, None)?;
            let content = toml::to_string_pretty(&config)?;
            println!("{}", content);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Embedding:      {} ({})", config.embedding.model, config.embedding.mode);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ErdRagError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!("Config file not found, using defaults. Run 'erdrag config init' to create one.");
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}

fn open_retriever(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Retriever> {
    let store_path = expand_path(&config.storage.store_path())?;
    let params = HnswParams {
        m: config.indexing.hnsw_m,
        ef_construction: config.indexing.hnsw_ef_construction,
        ef_search: config.indexing.hnsw_ef_search,
        ..HnswParams::default()
    };

    let store = SqliteDocumentStore::open(&store_path, provider.dimension(), params)?;

    Ok(Retriever::new(provider, Arc::new(store), config.retrieval.clone())?
        .with_batch_size(config.embedding.batch_size))
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| ErdRagError::Io {
            source: e,
            context: "Failed to start async runtime".to_string(),
        })
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ErdRagError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ErdRagError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
