use anyhow::{Context, Result};
use knowledge_retriever::backend::LocalBackend;
use knowledge_retriever::cli::{Cli, Commands, ConfigAction};
use knowledge_retriever::config::{Config, ConfigValidator};
use knowledge_retriever::embedding::{provider_from_config, CorpusRecord, IndexConfig};
use knowledge_retriever::retrieval::{reranker_from_config, RetrievalOptions, SearchResult};
use knowledge_retriever::storage::StorageManager;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Query {
            query,
            corpus,
            top_k,
            pack,
            min_confidence,
            no_rerank,
            no_sources,
            json,
        } => {
            let options = RetrievalOptions::default()
                .with_top_k(top_k)
                .with_packs(pack)
                .with_min_confidence(min_confidence)
                .with_rerank(!no_rerank)
                .with_include_sources(!no_sources);

            cmd_query(cli.config, &query, &corpus, options, json).await?;
        }
        Commands::History { limit } => {
            cmd_history(cli.config, limit)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "knowledge_retriever=debug"
    } else {
        "knowledge_retriever=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_query(
    config_path: Option<PathBuf>,
    query: &str,
    corpus: &Path,
    options: RetrievalOptions,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;

    let embedder = provider_from_config(&config.embedding)
        .context("Failed to initialize embedding provider")?;
    let backend = LocalBackend::new(embedder, storage.database.clone(), &IndexConfig::default())?;

    let records = CorpusRecord::read_jsonl(corpus)?;
    let report = backend.load(records, config.embedding.batch_size).await?;
    if report.indexed == 0 {
        tracing::warn!("No corpus records were indexed from {}", corpus.display());
    }

    let mut builder = backend
        .retriever_builder()
        .config(config.retrieval.clone())
        .cache_ttl(config.cache.ttl());
    if let Some(reranker) =
        reranker_from_config(&config.reranker).context("Failed to initialize reranker")?
    {
        builder = builder.reranker(reranker);
    }
    let retriever = builder.build()?;

    let results = retriever.retrieve(query, &options).await?;

    if json {
        let output =
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?;
        println!("{}", output);
    } else {
        print_results(&results);
    }

    Ok(())
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results above the confidence threshold");
        return;
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}",
            rank + 1,
            result.confidence,
            result.title.as_deref().unwrap_or(&result.id)
        );
        println!("   {}", preview(&result.content, 160));

        for citation in &result.citations {
            let date = citation
                .date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "undated".to_string());
            println!(
                "   source: {} ({}, {}){}",
                citation.title,
                citation.source,
                date,
                citation
                    .url
                    .as_deref()
                    .map(|u| format!(" {}", u))
                    .unwrap_or_default()
            );
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    } else {
        flat
    }
}

fn cmd_history(config_path: Option<PathBuf>, limit: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;

    let entries = storage.database.recent_retrievals(limit)?;
    if entries.is_empty() {
        println!("No retrievals logged yet");
        return Ok(());
    }

    for entry in entries {
        println!(
            "{}  {} results  {}",
            entry.logged_at.format("%Y-%m-%d %H:%M:%S"),
            entry.record.results.len(),
            entry.record.query_text
        );
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
            println!("{}", rendered);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
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
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!("Config file not found, using defaults. Run 'kret config init' to create one.");
        let mut config = Config::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    Ok(Config::load(&path)?)
}

fn open_storage(config: &Config) -> Result<StorageManager> {
    let data_dir = expand_path(&config.storage.data_dir)?;
    StorageManager::new(data_dir.clone())
        .with_context(|| format!("Failed to open storage at {}", data_dir.display()))
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_str().context("Invalid path encoding")?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
