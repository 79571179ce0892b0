use lexfuse::cli::{Cli, Commands, ConfigAction};
use lexfuse::config::{Config, SCHEMA_VERSION};
use lexfuse::embedding::FastEmbedProvider;
use lexfuse::error::{LexfuseError, Result};
use lexfuse::patterns::{PatternRegistry, BUILTIN_PATTERNS};
use lexfuse::query::QueryOptions;
use lexfuse::retrieval::{Orchestrator, RetrievalOptions, RetrievalResult};
use lexfuse::store::{SqliteStore, StoreError, StoredDocument};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    match cli.command {
        Commands::Search {
            query,
            corpora,
            top_k,
            min_confidence,
            no_diversify,
            json,
        } => {
            let config = load_config(cli.config)?;
            let mut options = RetrievalOptions::from_config(&config.retrieval)?;
            options.max_follow_up_questions = config.query.max_follow_up_questions;
            if !corpora.is_empty() {
                options.corpora = corpora.into_iter().collect();
            }
            if let Some(top_k) = top_k {
                options.top_k = top_k;
            }
            if let Some(min_confidence) = min_confidence {
                options.min_confidence = min_confidence;
            }
            if no_diversify {
                options.diversify = false;
            }
            cmd_search(&config, &query, &options, json)?;
        }
        Commands::Normalize { query } => {
            let config = load_config(cli.config)?;
            let registry = load_registry(&config)?;
            let normalizer =
                lexfuse::query::QueryNormalizer::new(registry, &config.query.default_jurisdiction);
            let opts = QueryOptions {
                max_follow_up_questions: config.query.max_follow_up_questions,
                ..QueryOptions::default()
            };
            print_json(&normalizer.normalize(&query, &opts))?;
        }
        Commands::Citations { text } => {
            let config = load_config(cli.config)?;
            let detector = lexfuse::citations::CitationDetector::new(load_registry(&config)?);
            print_json(&detector.analyze(&text))?;
        }
        Commands::Import { file, batch_size } => {
            let config = load_config(cli.config)?;
            cmd_import(&config, &file, batch_size.max(1))?;
        }
        Commands::Stats => {
            let config = load_config(cli.config)?;
            let store = open_store(&config)?;
            let stats = store.stats()?;

            println!("Lexfuse Store");
            println!("=============");
            for (corpus, count) in &stats.per_corpus {
                println!("  {:<16} {}", corpus.as_str(), count);
            }
            println!("\nTotal: {} ({} embedded)", stats.total(), stats.embedded_count);
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "lexfuse=debug" } else { "lexfuse=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_search(config: &Config, query: &str, options: &RetrievalOptions, json: bool) -> Result<()> {
    let registry = load_registry(config)?;
    let store = Arc::new(open_store(config)?);
    let embedder = FastEmbedProvider::new(&config.embedding.model).map_err(StoreError::from)?;

    let orchestrator = Orchestrator::new(
        registry,
        &config.query.default_jurisdiction,
        Arc::new(embedder),
        store.clone(),
        store.clone(),
        store,
    );

    let rt = tokio::runtime::Runtime::new().map_err(|e| LexfuseError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    let result = rt.block_on(orchestrator.retrieve(query, options))?;

    if json {
        print_json(&result)
    } else {
        print_results(&result);
        Ok(())
    }
}

fn print_results(result: &RetrievalResult) {
    let stats = &result.retrieval_stats;

    if !result.normalized_query.follow_up_questions.is_empty() {
        println!("To narrow the search:");
        for question in &result.normalized_query.follow_up_questions {
            println!("  - {}", question);
        }
        println!();
    }

    if result.chunks.is_empty() {
        println!("No results");
    }

    for (i, chunk) in result.chunks.iter().enumerate() {
        let methods: Vec<String> = chunk.retrieval_methods.iter().map(|m| m.to_string()).collect();
        println!(
            "{}. [{}] {} (confidence {:.2}, via {})",
            i + 1,
            chunk.corpus,
            if chunk.title.is_empty() { &chunk.id } else { &chunk.title },
            chunk.confidence(),
            methods.join("+")
        );
        println!("   {}", chunk.preview(200));
    }

    println!(
        "\n{} results from {} candidates (vector {}, keyword {}, graph {}) in {}ms",
        stats.final_count,
        stats.merged_count,
        stats.vector_count,
        stats.keyword_count,
        stats.graph_count,
        stats.duration_ms
    );
    if !stats.failed_methods.is_empty() {
        let failed: Vec<String> = stats.failed_methods.iter().map(|m| m.to_string()).collect();
        println!("⚠ Unavailable: {}", failed.join(", "));
    }
}

/// One line of an import file
#[derive(Debug, Deserialize)]
struct ImportRecord {
    #[serde(flatten)]
    document: StoredDocument,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

fn cmd_import(config: &Config, path: &Path, batch_size: usize) -> Result<()> {
    let file = std::fs::File::open(path).map_err(|e| LexfuseError::Io {
        source: e,
        context: format!("Failed to open import file: {:?}", path),
    })?;

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| LexfuseError::Io {
            source: e,
            context: format!("Failed to read {:?}", path),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ImportRecord = serde_json::from_str(&line).map_err(|e| LexfuseError::Json {
            source: e,
            context: format!("Invalid record on line {}", line_no + 1),
        })?;
        records.push(record);
    }

    let dimension = config.embedding.dimension;
    let mut provided = Vec::new();
    let mut pending = Vec::new();
    for record in records {
        match record.embedding {
            Some(vector) if vector.len() == dimension => provided.push((record.document, vector)),
            Some(vector) => {
                tracing::warn!(
                    "Embedding for {} has {} dimensions (expected {}), re-embedding",
                    record.document.id,
                    vector.len(),
                    dimension
                );
                pending.push(record.document);
            }
            None => pending.push(record.document),
        }
    }

    let store = open_store(config)?;
    for (document, vector) in &provided {
        store.upsert_document(document, Some(vector))?;
    }

    if !pending.is_empty() {
        let provider =
            FastEmbedProvider::new(&config.embedding.model).map_err(StoreError::from)?;
        for batch in pending.chunks(batch_size) {
            let texts: Vec<String> = batch
                .iter()
                .map(|d| format!("{} {}", d.title, d.content).trim().to_string())
                .collect();
            let vectors = provider.embed_batch(&texts).map_err(StoreError::from)?;
            for (document, vector) in batch.iter().zip(&vectors) {
                store.upsert_document(document, Some(vector))?;
            }
            tracing::debug!("Embedded batch of {}", batch.len());
        }
    }

    println!(
        "✓ Imported {} documents ({} embedded on import)",
        provided.len() + pending.len(),
        pending.len()
    );
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
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

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
            println!("  Schema version: {}", SCHEMA_VERSION);

            let patterns_path = path.with_file_name("patterns.toml");
            if force || !patterns_path.exists() {
                std::fs::write(&patterns_path, BUILTIN_PATTERNS).map_err(|e| LexfuseError::Io {
                    source: e,
                    context: format!("Failed to write patterns.toml: {:?}", patterns_path),
                })?;
                println!("✓ Pattern table installed at: {}", patterns_path.display());
            }
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };
    Config::load_or_default(&path)
}

fn load_registry(config: &Config) -> Result<Arc<PatternRegistry>> {
    let registry = match &config.query.patterns_file {
        Some(path) => PatternRegistry::from_file(&lexfuse::config::expand_home(path)?)?,
        None => PatternRegistry::builtin()?,
    };
    Ok(Arc::new(registry))
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.storage.resolved_database_path()?;
    tracing::debug!("Opening store at {:?}", path);
    SqliteStore::new(&path, config.storage.pool_size)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| LexfuseError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

