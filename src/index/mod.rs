//! Vector index side of the pipeline: records, index backends, and the
//! embed-then-upsert step applied to each [`UpsertBatch`].

pub mod pinecone;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::embeddings::Embedder;
use crate::error::{IngestError, Result};
use crate::ingest::batch::UpsertBatch;
use crate::ingest::chunker::{Chunk, ChunkMetadata};

pub use pinecone::PineconeIndex;
pub use sqlite::SqliteIndex;

/// Metadata key holding the chunk text
pub const TEXT_KEY: &str = "text";

/// One vector with its identity and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// Namespaced vector storage.
///
/// Upserting a record whose `id` already exists in the namespace must
/// overwrite it; failed files are retried by re-sending every batch.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()>;
}

/// Embeds and stores one batch of chunks. Failures are `IngestError::Upsert`.
#[async_trait]
pub trait ChunkUpserter: Send + Sync {
    async fn upsert(&self, batch: &UpsertBatch) -> Result<()>;
}

/// Stable identity of a chunk: same namespace, file name and position give the same id.
///
/// Only the file name within the topic directory takes part, so the id does
/// not depend on how the corpus root was spelled or where it lives.
pub fn chunk_id(namespace: &str, metadata: &ChunkMetadata) -> String {
    let source = Path::new(&metadata.source);
    let file_name = source
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_else(|| source.to_string_lossy());

    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0u8]);
    hasher.update(file_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(metadata.chunk_index.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Index metadata for a chunk: its text plus source and position fields.
pub fn chunk_metadata(chunk: &Chunk) -> Map<String, Value> {
    let mut metadata = match serde_json::to_value(&chunk.metadata) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    metadata.insert(TEXT_KEY.to_string(), Value::String(chunk.text.clone()));
    metadata
}

/// [`ChunkUpserter`] that embeds chunk texts and writes them to a [`VectorIndex`]
pub struct EmbeddingUpserter<E, I> {
    embedder: E,
    index: I,
    dimensions: usize,
}

impl<E: Embedder, I: VectorIndex> EmbeddingUpserter<E, I> {
    pub fn new(embedder: E, index: I, dimensions: usize) -> Self {
        Self {
            embedder,
            index,
            dimensions,
        }
    }
}

#[async_trait]
impl<E: Embedder, I: VectorIndex> ChunkUpserter for EmbeddingUpserter<E, I> {
    async fn upsert(&self, batch: &UpsertBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let upsert_error = |reason: String| IngestError::Upsert {
            namespace: batch.namespace.clone(),
            reason,
        };

        let texts: Vec<String> = batch.chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed(texts)
            .await
            .map_err(|e| upsert_error(e.to_string()))?;

        if embeddings.len() != batch.len() {
            return Err(upsert_error(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                batch.len()
            )));
        }

        let mut records = Vec::with_capacity(batch.len());
        for (chunk, values) in batch.chunks.iter().zip(embeddings) {
            if values.len() != self.dimensions {
                return Err(upsert_error(format!(
                    "embedding has {} dimensions, index expects {}",
                    values.len(),
                    self.dimensions
                )));
            }
            records.push(VectorRecord {
                id: chunk_id(&batch.namespace, &chunk.metadata),
                values,
                metadata: chunk_metadata(chunk),
            });
        }

        self.index
            .upsert(&batch.namespace, records)
            .await
            .map_err(|e| upsert_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::batch::plan_batches;
    use std::sync::Mutex;

    struct FixedEmbedder {
        dims: usize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            if self.fail {
                return Err(IngestError::Embedding("quota exceeded".to_string()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32; self.dims]).collect())
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        calls: Mutex<Vec<(String, Vec<VectorRecord>)>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()> {
            self.calls.lock().unwrap().push((namespace.to_string(), records));
            Ok(())
        }
    }

    fn chunk(i: usize) -> Chunk {
        Chunk {
            text: format!("chunk text {}", i),
            metadata: ChunkMetadata {
                source: "docs/A/a.pdf".to_string(),
                page: Some(1),
                chunk_index: i,
                start_char: 0,
                end_char: 10,
            },
        }
    }

    #[test]
    fn test_chunk_id_is_stable_and_distinct() {
        let a = chunk_id("A", &chunk(0).metadata);
        assert_eq!(a, chunk_id("A", &chunk(0).metadata));
        assert_ne!(a, chunk_id("B", &chunk(0).metadata));
        assert_ne!(a, chunk_id("A", &chunk(1).metadata));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_chunk_id_ignores_root_spelling() {
        let with_source = |source: &str| ChunkMetadata {
            source: source.to_string(),
            ..chunk(0).metadata
        };
        let id = chunk_id("A", &with_source("docs/A/a.pdf"));
        assert_eq!(id, chunk_id("A", &with_source("./docs/A/a.pdf")));
        assert_eq!(id, chunk_id("A", &with_source("/srv/corpus/docs/A/a.pdf")));
        assert_ne!(id, chunk_id("A", &with_source("docs/A/b.pdf")));
    }

    #[test]
    fn test_chunk_metadata_contains_text_and_source() {
        let metadata = chunk_metadata(&chunk(3));
        assert_eq!(metadata[TEXT_KEY], "chunk text 3");
        assert_eq!(metadata["source"], "docs/A/a.pdf");
        assert_eq!(metadata["chunk_index"], 3);
        assert_eq!(metadata["page"], 1);
    }

    #[tokio::test]
    async fn test_upsert_embeds_and_writes_namespace() {
        let upserter = EmbeddingUpserter::new(
            FixedEmbedder { dims: 4, fail: false },
            RecordingIndex::default(),
            4,
        );
        let batches = plan_batches("A", (0..3).map(chunk).collect(), 50).unwrap();
        upserter.upsert(&batches[0]).await.unwrap();

        let calls = upserter.index.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "A");
        assert_eq!(calls[0].1.len(), 3);
        assert_eq!(calls[0].1[0].values.len(), 4);
        assert_eq!(calls[0].1[2].id, chunk_id("A", &chunk(2).metadata));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_upsert_error() {
        let upserter = EmbeddingUpserter::new(
            FixedEmbedder { dims: 4, fail: true },
            RecordingIndex::default(),
            4,
        );
        let batches = plan_batches("A", vec![chunk(0)], 50).unwrap();
        let err = upserter.upsert(&batches[0]).await.unwrap_err();
        assert!(matches!(err, IngestError::Upsert { ref namespace, .. } if namespace == "A"));
        assert!(upserter.index.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_rejected() {
        let upserter = EmbeddingUpserter::new(
            FixedEmbedder { dims: 3, fail: false },
            RecordingIndex::default(),
            1536,
        );
        let batches = plan_batches("A", vec![chunk(0)], 50).unwrap();
        assert!(upserter.upsert(&batches[0]).await.is_err());
        assert!(upserter.index.calls.lock().unwrap().is_empty());
    }
}
