use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Maximum vectors per upsert request accepted by the index
pub const MAX_UPSERT_BATCH: usize = 100;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub splitter: SplitterConfig,
    #[serde(default)]
    pub upsert: UpsertConfig,
    pub embeddings: EmbeddingsConfig,
    pub index: IndexConfig,
}

/// Corpus layout and eligibility rules
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusConfig {
    /// Root directory; each immediate sub-directory is one namespace.
    pub docs_root: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Glob patterns matched against entry names while fingerprinting.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_extension() -> String {
    "pdf".to_string()
}

fn default_exclude() -> Vec<String> {
    crate::fingerprint::policy::DEFAULT_EXCLUDE
        .iter()
        .map(|p| p.to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    Json,
    Sqlite,
}

/// Where directory fingerprints are persisted
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_backend")]
    pub backend: HistoryBackend,
    #[serde(default = "default_history_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_history_db")]
    pub db_path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: default_history_backend(),
            dir: default_history_dir(),
            db_path: default_history_db(),
        }
    }
}

fn default_history_backend() -> HistoryBackend {
    HistoryBackend::Json
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("history")
}

fn default_history_db() -> PathBuf {
    PathBuf::from("history/fingerprints.db")
}

/// Chunking parameters, in characters
#[derive(Debug, Clone, Deserialize)]
pub struct SplitterConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for UpsertConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

/// Embeddings configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_max_retries() -> usize {
    3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Pinecone,
    Sqlite,
}

/// Vector index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    /// Index host, e.g. `https://my-index-abc123.svc.us-east1-gcp.pinecone.io`
    #[serde(default)]
    pub pinecone_host: Option<String>,
    #[serde(default = "default_pinecone_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_index_db")]
    pub db_path: PathBuf,
}

fn default_pinecone_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}

fn default_index_db() -> PathBuf {
    PathBuf::from("vectors.db")
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. `explicit` (the `--config` flag)
    /// 2. Path specified in INGEST_CONFIG environment variable
    /// 3. ./ingest.toml in current directory
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        // Optional; missing .env is fine
        let _ = dotenv::dotenv();

        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::var("INGEST_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ingest.toml")),
        };

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validation
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).context("Failed to parse ingest config")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.corpus.extension.trim().is_empty() {
            anyhow::bail!("corpus.extension must not be empty");
        }

        if self.splitter.chunk_size == 0 {
            anyhow::bail!("splitter.chunk_size must be greater than 0");
        }

        if self.splitter.chunk_overlap >= self.splitter.chunk_size {
            anyhow::bail!("splitter.chunk_overlap must be less than chunk_size");
        }

        if self.upsert.batch_size == 0 || self.upsert.batch_size > MAX_UPSERT_BATCH {
            anyhow::bail!(
                "upsert.batch_size must be between 1 and {}",
                MAX_UPSERT_BATCH
            );
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        std::env::var(&self.embeddings.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your OpenAI API key.",
                self.embeddings.api_key_env
            )
        })?;

        if self.index.backend == IndexBackend::Pinecone {
            if self.index.pinecone_host.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("index.pinecone_host is required for the pinecone backend");
            }
            std::env::var(&self.index.api_key_env).with_context(|| {
                format!(
                    "Environment variable {} not set. It must hold your Pinecone API key.",
                    self.index.api_key_env
                )
            })?;
        }

        Ok(())
    }

    /// Get the corpus root path
    pub fn docs_root(&self) -> &Path {
        &self.corpus.docs_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const MINIMAL: &str = r#"
[corpus]
docs_root = "./docs"

[embeddings]
api_key_env = "INGEST_TEST_OPENAI_KEY"

[index]
backend = "sqlite"
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.corpus.extension, "pdf");
        assert_eq!(
            config.corpus.exclude,
            vec![".*", "node_modules", "test_coverage"]
        );
        assert_eq!(config.history.backend, HistoryBackend::Json);
        assert_eq!(config.history.dir, PathBuf::from("history"));
        assert_eq!(config.splitter.chunk_size, 1000);
        assert_eq!(config.splitter.chunk_overlap, 200);
        assert_eq!(config.upsert.batch_size, 50);
        assert_eq!(config.index.backend, IndexBackend::Sqlite);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("ingest.toml");
        fs::write(
            &config_path,
            format!("{}\n[upsert]\nbatch_size = 25\n", MINIMAL),
        )
        .unwrap();

        std::env::set_var("INGEST_TEST_OPENAI_KEY", "sk-test");
        let config = Config::load(Some(&config_path));
        std::env::remove_var("INGEST_TEST_OPENAI_KEY");

        let config = config.unwrap();
        assert_eq!(config.upsert.batch_size, 25);
        assert_eq!(config.docs_root(), Path::new("./docs"));
    }

    #[test]
    fn test_missing_api_key() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        std::env::remove_var("INGEST_TEST_OPENAI_KEY");
        let config = Config::from_toml(MINIMAL).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("INGEST_TEST_OPENAI_KEY"));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        std::env::set_var("INGEST_TEST_OPENAI_KEY", "sk-test");
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.splitter.chunk_overlap = config.splitter.chunk_size;
        let result = config.validate();
        std::env::remove_var("INGEST_TEST_OPENAI_KEY");
        assert!(result.unwrap_err().to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_batch_size_limits() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        std::env::set_var("INGEST_TEST_OPENAI_KEY", "sk-test");
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.upsert.batch_size = MAX_UPSERT_BATCH + 1;
        let too_big = config.validate();
        config.upsert.batch_size = 0;
        let zero = config.validate();
        std::env::remove_var("INGEST_TEST_OPENAI_KEY");
        assert!(too_big.is_err());
        assert!(zero.is_err());
    }

    #[test]
    fn test_pinecone_requires_host() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        std::env::set_var("INGEST_TEST_OPENAI_KEY", "sk-test");
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.index.backend = IndexBackend::Pinecone;
        config.index.pinecone_host = None;
        let result = config.validate();
        std::env::remove_var("INGEST_TEST_OPENAI_KEY");
        assert!(result.unwrap_err().to_string().contains("pinecone_host"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let source = MINIMAL.replace("backend = \"sqlite\"", "backend = \"milvus\"");
        assert!(Config::from_toml(&source).is_err());
    }

    #[test]
    fn test_config_invalid_path() {
        let result = Config::load(Some(Path::new("definitely/not/here.toml")));
        assert!(result.is_err());
    }
}
