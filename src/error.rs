use thiserror::Error;

/// Main error type for corpus ingestion
#[derive(Error, Debug)]
pub enum IngestError {
    /// Stored fingerprint could not be read or parsed
    #[error("Fingerprint read error for {directory}: {reason}")]
    FingerprintRead { directory: String, reason: String },

    /// Fingerprint could not be persisted
    #[error("Fingerprint write error for {directory}: {reason}")]
    FingerprintWrite { directory: String, reason: String },

    /// Directory contents could not be fingerprinted
    #[error("Hashing failed for {path}: {reason}")]
    Hashing { path: String, reason: String },

    /// File could not be loaded into raw documents
    #[error("Load error for {path}: {reason}")]
    Load { path: String, reason: String },

    /// Raw documents could not be split into chunks
    #[error("Split error: {0}")]
    Split(String),

    /// A batch could not be embedded or written to the index
    #[error("Upsert error in namespace {namespace}: {reason}")]
    Upsert { namespace: String, reason: String },

    /// The corpus root could not be enumerated
    #[error("Cannot scan corpus root {path}: {reason}")]
    RootScan { path: String, reason: String },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding API errors
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Vector index API errors
    #[error("Vector index error: {0}")]
    Index(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using IngestError
pub type Result<T> = std::result::Result<T, IngestError>;
