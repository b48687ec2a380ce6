pub mod config;
pub mod error;
pub mod db;
pub mod fingerprint;
pub mod ingest;
pub mod embeddings;
pub mod index;
pub mod retry;

pub use config::Config;
pub use error::{IngestError, Result};
pub use fingerprint::{ChangeDetector, ChangeStatus, Fingerprint, FingerprintStore};
pub use ingest::{IngestionDriver, RunReport};
