use sha2::{Digest, Sha256};
use std::path::Path;
use walkdir::WalkDir;

use super::{directory_id, EligibilityPolicy, Fingerprint};
use crate::error::{IngestError, Result};

/// Compute SHA256 hash of file contents
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let content = std::fs::read(path).map_err(|e| hashing_error(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint every eligible file below `directory`, recursively.
///
/// Each eligible file contributes `(relative path, content hash)`; entries are
/// sorted by relative path (always `/`-separated) before being folded into
/// the directory digest, so traversal order never affects the result.
/// Excluded entries are pruned together with everything beneath them. Any
/// unreadable entry fails the whole fingerprint.
pub fn compute_fingerprint(directory: &Path, policy: &EligibilityPolicy) -> Result<Fingerprint> {
    let id = directory_id(directory)?;
    let mut entries: Vec<(String, String)> = Vec::new();

    let walker = WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !policy.is_excluded(e.file_name()));

    for entry in walker {
        let entry = entry.map_err(|e| hashing_error(directory, e))?;
        if !entry.file_type().is_file() || !policy.has_target_extension(entry.path()) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(directory)
            .map_err(|e| hashing_error(entry.path(), e))?
            .to_string_lossy()
            .replace('\\', "/");

        entries.push((relative, compute_file_hash(entry.path())?));
    }

    entries.sort();

    let mut hasher = Sha256::new();
    for (relative, file_hash) in &entries {
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(file_hash.as_bytes());
        hasher.update([b'\n']);
    }

    Ok(Fingerprint {
        directory_id: id,
        hash: format!("{:x}", hasher.finalize()),
        file_count: entries.len(),
        updated_at: None,
    })
}

fn hashing_error(path: &Path, reason: impl std::fmt::Display) -> IngestError {
    IngestError::Hashing {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn policy() -> EligibilityPolicy {
        EligibilityPolicy::pdf_defaults().unwrap()
    }

    #[test]
    fn test_compute_file_hash() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.pdf");
        fs::write(&file_path, "test content").unwrap();

        let hash = compute_file_hash(&file_path).unwrap();
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_fingerprint_counts_only_eligible_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("Contracts");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::create_dir_all(dir.join("node_modules")).unwrap();
        fs::create_dir_all(dir.join(".cache")).unwrap();
        fs::write(dir.join("a.pdf"), "a").unwrap();
        fs::write(dir.join("nested/b.PDF"), "b").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
        fs::write(dir.join(".hidden.pdf"), "ignored").unwrap();
        fs::write(dir.join("node_modules/c.pdf"), "ignored").unwrap();
        fs::write(dir.join(".cache/d.pdf"), "ignored").unwrap();

        let fingerprint = compute_fingerprint(&dir, &policy()).unwrap();
        assert_eq!(fingerprint.directory_id, "Contracts");
        assert_eq!(fingerprint.file_count, 2);
        assert_eq!(fingerprint.hash.len(), 64);
    }

    #[test]
    fn test_excluded_and_ineligible_changes_do_not_alter_hash() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("A");
        fs::create_dir_all(dir.join("test_coverage")).unwrap();
        fs::write(dir.join("a.pdf"), "a").unwrap();
        let before = compute_fingerprint(&dir, &policy()).unwrap();

        fs::write(dir.join("readme.md"), "new").unwrap();
        fs::write(dir.join("test_coverage/report.pdf"), "new").unwrap();
        fs::write(dir.join(".draft.pdf"), "new").unwrap();
        let after = compute_fingerprint(&dir, &policy()).unwrap();

        assert!(before.same_content(&after));
    }

    #[test]
    fn test_content_change_alters_hash() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("A");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.pdf"), "first").unwrap();
        let before = compute_fingerprint(&dir, &policy()).unwrap();

        fs::write(dir.join("a.pdf"), "second").unwrap();
        let after = compute_fingerprint(&dir, &policy()).unwrap();
        assert!(!before.same_content(&after));
    }

    #[test]
    fn test_rename_alters_hash() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("A");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.pdf"), "same").unwrap();
        let before = compute_fingerprint(&dir, &policy()).unwrap();

        fs::rename(dir.join("a.pdf"), dir.join("b.pdf")).unwrap();
        let after = compute_fingerprint(&dir, &policy()).unwrap();
        assert!(!before.same_content(&after));
    }

    #[test]
    fn test_hash_independent_of_creation_order_and_location() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("one/Topic");
        let second = temp_dir.path().join("two/Topic");
        fs::create_dir_all(first.join("sub")).unwrap();
        fs::create_dir_all(second.join("sub")).unwrap();

        // Same eligible layout and content, written in opposite orders
        fs::write(first.join("z.pdf"), "z").unwrap();
        fs::write(first.join("sub/m.pdf"), "m").unwrap();
        fs::write(first.join("a.pdf"), "a").unwrap();

        fs::write(second.join("a.pdf"), "a").unwrap();
        fs::write(second.join("sub/m.pdf"), "m").unwrap();
        fs::write(second.join("z.pdf"), "z").unwrap();

        let a = compute_fingerprint(&first, &policy()).unwrap();
        let b = compute_fingerprint(&second, &policy()).unwrap();
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_empty_directory_has_real_hash() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("Empty");
        fs::create_dir_all(&dir).unwrap();
        let fingerprint = compute_fingerprint(&dir, &policy()).unwrap();
        assert_eq!(fingerprint.file_count, 0);
        assert!(!fingerprint.is_empty());
    }

    #[test]
    fn test_missing_directory_is_hashing_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = compute_fingerprint(&temp_dir.path().join("gone"), &policy());
        assert!(matches!(result, Err(IngestError::Hashing { .. })));
    }
}
