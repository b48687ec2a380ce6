use anyhow::{Context, Result};
use clap::Parser;
use corpus_ingest::config::{HistoryBackend, IndexBackend};
use corpus_ingest::db::Db;
use corpus_ingest::embeddings::OpenAIEmbedder;
use corpus_ingest::fingerprint::{
    ChangeDetector, EligibilityPolicy, FingerprintStore, JsonFingerprintStore,
    SqliteFingerprintStore,
};
use corpus_ingest::index::{ChunkUpserter, EmbeddingUpserter, PineconeIndex, SqliteIndex};
use corpus_ingest::ingest::{CharacterSplitter, DirectoryState, IngestionDriver, PdfLoader, SkipReason};
use corpus_ingest::Config;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Ingest changed PDF topic directories into the vector index")]
struct Args {
    /// Config file (defaults to $INGEST_CONFIG, then ./ingest.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process every directory even when its fingerprint is unchanged
    #[arg(short, long)]
    force: bool,

    /// Only process these directory names (repeatable)
    #[arg(short, long)]
    only: Vec<String>,

    /// Exit with an error when any directory partially failed
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();

    log::info!("Starting corpus ingestion");

    let config = Config::load(args.config.as_deref())?;
    log::info!("Configuration loaded successfully");
    log::info!("Docs root: {}", config.docs_root().display());

    let store: Arc<dyn FingerprintStore> = match config.history.backend {
        HistoryBackend::Json => {
            log::info!("Fingerprint history: {}", config.history.dir.display());
            Arc::new(JsonFingerprintStore::new(&config.history.dir))
        }
        HistoryBackend::Sqlite => {
            log::info!("Fingerprint history: {}", config.history.db_path.display());
            let db = Db::open_migrated(&config.history.db_path).await?;
            Arc::new(SqliteFingerprintStore::new(db))
        }
    };

    let policy = EligibilityPolicy::from_config(&config.corpus)?;
    let detector = ChangeDetector::new(store, policy);
    let upserter = build_upserter(&config).await?;

    let driver = IngestionDriver::new(
        detector,
        Arc::new(PdfLoader),
        Arc::new(CharacterSplitter),
        upserter,
        config.splitter.clone(),
        config.upsert.batch_size,
    )
    .with_force(args.force);

    if args.force {
        log::info!("Mode: forced (fingerprints ignored)");
    }

    let report = driver.run(config.docs_root(), &args.only).await?;

    log::info!("=== Ingestion Complete ===");
    log::info!("Directories: {}", report.directories.len());
    log::info!("  Completed: {}", report.completed());
    log::info!("  Skipped: {}", report.skipped());
    log::info!("  Partially failed: {}", report.partially_failed());
    log::info!("Files ingested: {} (errors: {})", report.files_ok(), report.files_failed());
    log::info!("Chunks upserted: {} in {} batches", report.chunks(), report.batches());
    log::info!("Time: {:?}", report.elapsed);

    for directory in &report.directories {
        match directory.state {
            DirectoryState::PartiallyFailed => {
                for failure in &directory.failures {
                    log::warn!("{}: {}: {}", directory.directory_id, failure.path.display(), failure.error);
                }
            }
            DirectoryState::Skipped => {
                if let Some(SkipReason::DetectionFailed(e)) = &directory.skip_reason {
                    log::warn!("{}: not checked: {}", directory.directory_id, e);
                }
            }
            DirectoryState::Completed if !directory.fingerprint_written => {
                log::warn!(
                    "{}: ingested but fingerprint not saved; it will be reprocessed next run",
                    directory.directory_id
                );
            }
            _ => {}
        }
    }

    if report.has_failures() {
        log::warn!("Some files failed to ingest. They will be retried on the next run.");
        if args.strict {
            anyhow::bail!("{} directories partially failed", report.partially_failed());
        }
    }

    Ok(())
}

/// Embedder plus the configured index backend
async fn build_upserter(config: &Config) -> Result<Arc<dyn ChunkUpserter>> {
    let openai_key = std::env::var(&config.embeddings.api_key_env)
        .with_context(|| format!("{} not set", config.embeddings.api_key_env))?;
    let embedder = OpenAIEmbedder::new(
        openai_key,
        config.embeddings.model.clone(),
        config.embeddings.max_retries,
    )?;
    let dimensions = config.embeddings.dimensions;

    let upserter: Arc<dyn ChunkUpserter> = match config.index.backend {
        IndexBackend::Pinecone => {
            let host = config
                .index
                .pinecone_host
                .as_deref()
                .context("index.pinecone_host is required for the pinecone backend")?;
            let api_key = std::env::var(&config.index.api_key_env)
                .with_context(|| format!("{} not set", config.index.api_key_env))?;
            log::info!("Vector index: Pinecone at {}", host);
            let index = PineconeIndex::new(host, api_key, config.embeddings.max_retries)?;
            Arc::new(EmbeddingUpserter::new(embedder, index, dimensions))
        }
        IndexBackend::Sqlite => {
            log::info!("Vector index: SQLite at {}", config.index.db_path.display());
            let db = Db::open_migrated(&config.index.db_path).await?;
            Arc::new(EmbeddingUpserter::new(embedder, SqliteIndex::new(db), dimensions))
        }
    };

    Ok(upserter)
}
