use std::path::Path;
use std::sync::Arc;

use super::{compute_fingerprint, EligibilityPolicy, Fingerprint, FingerprintStore};
use crate::error::{IngestError, Result};

/// Outcome of comparing a directory against its stored fingerprint
#[derive(Debug)]
pub enum ChangeStatus {
    /// Eligible content differs from the stored record, or there is no record.
    Changed {
        current: Fingerprint,
        previous: Fingerprint,
    },
    Unchanged(Fingerprint),
    /// Fingerprinting failed; callers must not ingest on this signal.
    Failed(IngestError),
}

impl ChangeStatus {
    pub fn is_changed(&self) -> bool {
        matches!(self, ChangeStatus::Changed { .. })
    }
}

/// Compares freshly computed fingerprints with the injected store
#[derive(Clone)]
pub struct ChangeDetector {
    store: Arc<dyn FingerprintStore>,
    policy: EligibilityPolicy,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn FingerprintStore>, policy: EligibilityPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn FingerprintStore> {
        &self.store
    }

    pub fn policy(&self) -> &EligibilityPolicy {
        &self.policy
    }

    /// Hash the directory tree on a blocking thread
    pub async fn compute_fingerprint(&self, directory: &Path) -> Result<Fingerprint> {
        let directory_path = directory.to_path_buf();
        let policy = self.policy.clone();
        tokio::task::spawn_blocking(move || compute_fingerprint(&directory_path, &policy))
            .await
            .map_err(|e| IngestError::Hashing {
                path: directory.display().to_string(),
                reason: format!("hashing task failed: {}", e),
            })?
    }

    pub async fn has_changed(&self, directory: &Path) -> ChangeStatus {
        let current = match self.compute_fingerprint(directory).await {
            Ok(fingerprint) => fingerprint,
            Err(e) => return ChangeStatus::Failed(e),
        };

        let previous = self.store.read(&current.directory_id).await;
        if current.same_content(&previous) {
            ChangeStatus::Unchanged(current)
        } else {
            log::debug!(
                "{}: new hash {} (previous: {})",
                current.directory_id,
                current.hash,
                if previous.is_empty() { "<none>" } else { previous.hash.as_str() }
            );
            ChangeStatus::Changed { current, previous }
        }
    }
}
