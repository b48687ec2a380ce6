use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde_json::{Map, Value};

use super::{VectorIndex, VectorRecord};
use crate::db::Db;
use crate::error::{IngestError, Result};

/// Local vector table in SQLite, keyed by `(namespace, id)`.
///
/// Useful for offline runs and tests; embeddings are stored as
/// little-endian f32 BLOBs.
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    db: Db,
}

impl SqliteIndex {
    /// `db` must already be migrated (see [`Db::open_migrated`]).
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Number of vectors stored in `namespace`
    pub async fn count(&self, namespace: &str) -> Result<usize> {
        let namespace = namespace.to_string();
        self.db
            .with_connection(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM vectors WHERE namespace = ?1",
                    params![namespace],
                    |row| row.get(0),
                )?;
                Ok(n as usize)
            })
            .await
    }

    /// Fetch a single stored vector
    pub async fn fetch(&self, namespace: &str, id: &str) -> Result<Option<VectorRecord>> {
        let namespace = namespace.to_string();
        let id = id.to_string();
        let row = self
            .db
            .with_connection(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT metadata, embedding FROM vectors WHERE namespace = ?1 AND id = ?2",
                        params![namespace, id],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)),
                    )
                    .optional()?;
                Ok(row.map(|r| (id, r)))
            })
            .await?;

        let Some((id, (metadata, blob))) = row else {
            return Ok(None);
        };

        let metadata: Map<String, Value> = serde_json::from_str(&metadata)
            .map_err(|e| IngestError::Index(format!("Corrupt metadata for {}: {}", id, e)))?;
        Ok(Some(VectorRecord {
            id,
            values: blob_to_embedding(&blob)?,
            metadata,
        }))
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let namespace = namespace.to_string();
        let updated_at = Utc::now().to_rfc3339();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let text = record
                .metadata
                .get(super::TEXT_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let metadata = serde_json::to_string(&record.metadata)
                .map_err(|e| IngestError::Index(format!("Failed to encode metadata: {}", e)))?;
            rows.push((record.id, text, metadata, embedding_to_blob(&record.values)));
        }

        self.db
            .with_connection(move |conn| {
                // One transaction per batch: the batch lands entirely or not at all
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO vectors (namespace, id, text, metadata, embedding, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(namespace, id) DO UPDATE SET
                            text = excluded.text,
                            metadata = excluded.metadata,
                            embedding = excluded.embedding,
                            updated_at = excluded.updated_at",
                    )?;
                    for (id, text, metadata, blob) in &rows {
                        stmt.execute(params![namespace, id, text, metadata, blob, updated_at])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }
}

/// Convert Vec<f32> to BLOB (raw bytes, little-endian)
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert BLOB back to Vec<f32>
fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(IngestError::Index("Invalid embedding BLOB length".to_string()));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect())
}
