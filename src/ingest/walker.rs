use walkdir::WalkDir;
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};
use crate::fingerprint::EligibilityPolicy;

/// List the topic directories directly under the corpus root.
///
/// Only immediate sub-directories are returned, sorted by name, skipping
/// entries the policy excludes (hidden folders, artifact folders). An error
/// reading the root itself is fatal for the run and reported as `RootScan`;
/// an unreadable child (e.g. a dangling symlink) is logged and skipped.
pub fn list_directories(root: &Path, policy: &EligibilityPolicy) -> Result<Vec<PathBuf>> {
    let mut directories = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(IngestError::RootScan {
                    path: root.display().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                log::warn!("Ignoring unreadable entry in {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }
        if policy.is_excluded(entry.file_name()) {
            log::debug!("Ignoring excluded directory {}", entry.path().display());
            continue;
        }
        directories.push(entry.into_path());
    }

    log::info!("Discovered {} directories in {}", directories.len(), root.display());
    Ok(directories)
}

/// List the eligible files directly inside `directory` (non-recursive), sorted by name.
///
/// Symlinks are not followed, matching what the fingerprint hashes.
pub fn list_eligible_files(directory: &Path, policy: &EligibilityPolicy) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            IngestError::Io(std::io::Error::other(format!(
                "Failed to list {}: {}",
                directory.display(),
                e
            )))
        })?;

        if !entry.file_type().is_file()
            || policy.is_excluded(entry.file_name())
            || !policy.has_target_extension(entry.path())
        {
            continue;
        }
        files.push(entry.into_path());
    }

    Ok(files)
}
