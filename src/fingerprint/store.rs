use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};

use super::{Fingerprint, FingerprintStore};
use crate::db::Db;
use crate::error::{IngestError, Result};

/// One `<directory_id>.json` record per directory inside a history folder.
#[derive(Debug, Clone)]
pub struct JsonFingerprintStore {
    dir: PathBuf,
}

impl JsonFingerprintStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn record_path(&self, directory_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", directory_id))
    }
}

#[async_trait]
impl FingerprintStore for JsonFingerprintStore {
    async fn load(&self, directory_id: &str) -> Result<Option<Fingerprint>> {
        let path = self.record_path(directory_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(read_error(directory_id, e)),
        };

        let mut fingerprint: Fingerprint =
            serde_json::from_str(&data).map_err(|e| read_error(directory_id, e))?;
        // The key is authoritative; the stored name may be missing or stale.
        fingerprint.directory_id = directory_id.to_string();
        Ok(Some(fingerprint))
    }

    async fn save(&self, fingerprint: &Fingerprint) -> Result<()> {
        let id = fingerprint.directory_id.as_str();
        let data = serde_json::to_string_pretty(fingerprint).map_err(|e| write_error(id, e))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_error(id, e))?;

        // Write-then-rename so a crash never leaves a truncated record behind
        let target = self.record_path(id);
        let tmp = self.dir.join(format!(".{}.json.tmp", id));
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| write_error(id, e))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| write_error(id, e))?;

        log::debug!("Stored fingerprint for {} at {}", id, target.display());
        Ok(())
    }
}

/// Fingerprints kept in the `fingerprints` table of a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteFingerprintStore {
    db: Db,
}

impl SqliteFingerprintStore {
    /// `db` must already be migrated (see [`Db::open_migrated`]).
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FingerprintStore for SqliteFingerprintStore {
    async fn load(&self, directory_id: &str) -> Result<Option<Fingerprint>> {
        let id = directory_id.to_string();
        let row = self
            .db
            .with_connection(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT hash, file_count, updated_at FROM fingerprints WHERE directory_id = ?1",
                        params![id],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, i64>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(|e| read_error(directory_id, e))?;

        Ok(row.map(|(hash, file_count, updated_at)| Fingerprint {
            directory_id: directory_id.to_string(),
            hash,
            file_count: usize::try_from(file_count).unwrap_or(0),
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        }))
    }

    async fn save(&self, fingerprint: &Fingerprint) -> Result<()> {
        let id = fingerprint.directory_id.clone();
        let hash = fingerprint.hash.clone();
        let file_count = fingerprint.file_count as i64;
        let updated_at = fingerprint.updated_at.unwrap_or_else(Utc::now).to_rfc3339();

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO fingerprints (directory_id, hash, file_count, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(directory_id) DO UPDATE SET
                        hash = excluded.hash,
                        file_count = excluded.file_count,
                        updated_at = excluded.updated_at",
                    params![id, hash, file_count, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| write_error(&fingerprint.directory_id, e))
    }
}

fn read_error(directory_id: &str, reason: impl std::fmt::Display) -> IngestError {
    IngestError::FingerprintRead {
        directory: directory_id.to_string(),
        reason: reason.to_string(),
    }
}

fn write_error(directory_id: &str, reason: impl std::fmt::Display) -> IngestError {
    IngestError::FingerprintWrite {
        directory: directory_id.to_string(),
        reason: reason.to_string(),
    }
}
