//! Directory fingerprints: content digests that decide whether a topic
//! directory needs to be re-ingested.
//!
//! A fingerprint is computed by [`hasher::compute_fingerprint`], persisted
//! through a [`FingerprintStore`], and compared by the [`ChangeDetector`].
//! Stores never surface errors to the caller: an unreadable record reads as
//! the empty sentinel, and a failed write only means the next run re-detects
//! a change.

pub mod detector;
pub mod hasher;
pub mod policy;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{IngestError, Result};

pub use detector::{ChangeDetector, ChangeStatus};
pub use hasher::compute_fingerprint;
pub use policy::EligibilityPolicy;
pub use store::{JsonFingerprintStore, SqliteFingerprintStore};

/// Content digest of a directory's eligible files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(default, alias = "name")]
    pub directory_id: String,
    pub hash: String,
    #[serde(default)]
    pub file_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Fingerprint {
    /// Sentinel for "no usable history"; never equal to a computed hash.
    pub fn empty(directory_id: &str) -> Self {
        Self {
            directory_id: directory_id.to_string(),
            hash: String::new(),
            file_count: 0,
            updated_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_empty()
    }

    /// Same eligible content. Only the hash takes part in the comparison.
    pub fn same_content(&self, other: &Fingerprint) -> bool {
        self.hash == other.hash
    }
}

/// Directory id and namespace for a topic directory: its base name.
pub fn directory_id(directory: &Path) -> Result<String> {
    directory
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            IngestError::InvalidInput(format!(
                "directory has no base name: {}",
                directory.display()
            ))
        })
}

/// Key-value persistence for directory fingerprints.
///
/// Backends implement [`load`](FingerprintStore::load) and
/// [`save`](FingerprintStore::save); the ingestion pipeline only calls the
/// absorbing [`read`](FingerprintStore::read) and
/// [`write`](FingerprintStore::write).
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// `Ok(None)` when no record exists for `directory_id`.
    async fn load(&self, directory_id: &str) -> Result<Option<Fingerprint>>;

    /// Overwrites any previous record for `fingerprint.directory_id`.
    async fn save(&self, fingerprint: &Fingerprint) -> Result<()>;

    /// Last persisted fingerprint, or the empty sentinel on miss or failure.
    async fn read(&self, directory_id: &str) -> Fingerprint {
        match self.load(directory_id).await {
            Ok(Some(fingerprint)) => fingerprint,
            Ok(None) => {
                log::debug!("No stored fingerprint for {}", directory_id);
                Fingerprint::empty(directory_id)
            }
            Err(e) => {
                log::warn!("{}; treating {} as never ingested", e, directory_id);
                Fingerprint::empty(directory_id)
            }
        }
    }

    /// Persist `fingerprint`. Returns false when the write failed.
    async fn write(&self, fingerprint: &Fingerprint) -> bool {
        match self.save(fingerprint).await {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "{}; {} will be re-ingested on the next run",
                    e,
                    fingerprint.directory_id
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sentinel_never_matches_real_hash() {
        let empty = Fingerprint::empty("A");
        let real = Fingerprint {
            directory_id: "A".to_string(),
            hash: "ab12".to_string(),
            file_count: 1,
            updated_at: None,
        };
        assert!(empty.is_empty());
        assert!(!empty.same_content(&real));
    }

    #[test]
    fn test_same_content_ignores_metadata() {
        let a = Fingerprint {
            directory_id: "A".to_string(),
            hash: "ab12".to_string(),
            file_count: 1,
            updated_at: None,
        };
        let b = Fingerprint {
            file_count: 7,
            updated_at: Some(Utc::now()),
            ..a.clone()
        };
        assert!(a.same_content(&b));
    }

    #[test]
    fn test_directory_id_is_base_name() {
        assert_eq!(directory_id(Path::new("docs/Contracts")).unwrap(), "Contracts");
        assert_eq!(directory_id(Path::new("./docs/tax law")).unwrap(), "tax law");
        assert!(directory_id(Path::new("/")).is_err());
    }

    #[test]
    fn test_record_with_only_hash_parses() {
        let parsed: Fingerprint = serde_json::from_str(r#"{"hash":"abc"}"#).unwrap();
        assert_eq!(parsed.hash, "abc");
        assert_eq!(parsed.directory_id, "");
        assert_eq!(parsed.file_count, 0);
    }
}
