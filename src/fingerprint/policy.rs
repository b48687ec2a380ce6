use globset::{Glob, GlobSet, GlobSetBuilder};
use std::ffi::OsStr;
use std::path::Path;

use crate::config::CorpusConfig;
use crate::error::{IngestError, Result};

/// Hidden entries plus dependency and coverage artifact folders
pub const DEFAULT_EXCLUDE: &[&str] = &[".*", "node_modules", "test_coverage"];

/// Which files count towards a directory's fingerprint and ingestion set.
///
/// A file is eligible when its extension equals the target extension
/// (case-insensitive) and neither its name nor any ancestor directory name
/// below the scanned directory matches an exclude pattern.
#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    extension: String,
    patterns: Vec<String>,
    exclude: GlobSet,
}

impl EligibilityPolicy {
    pub fn new(extension: &str, exclude: &[String]) -> Result<Self> {
        let extension = extension.trim().trim_start_matches('.').to_lowercase();
        if extension.is_empty() {
            return Err(IngestError::Config(
                "target extension must not be empty".to_string(),
            ));
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in exclude {
            let glob = Glob::new(pattern).map_err(|e| {
                IngestError::Config(format!("invalid exclude pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let exclude_set = builder
            .build()
            .map_err(|e| IngestError::Config(format!("invalid exclude patterns: {}", e)))?;

        Ok(Self {
            extension,
            patterns: exclude.to_vec(),
            exclude: exclude_set,
        })
    }

    pub fn from_config(corpus: &CorpusConfig) -> Result<Self> {
        Self::new(&corpus.extension, &corpus.exclude)
    }

    /// `.pdf` files with [`DEFAULT_EXCLUDE`]
    pub fn pdf_defaults() -> Result<Self> {
        let exclude: Vec<String> = DEFAULT_EXCLUDE.iter().map(|p| p.to_string()).collect();
        Self::new("pdf", &exclude)
    }

    /// Target extension without the leading dot, lowercased
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Entry name matches an exclude pattern
    pub fn is_excluded(&self, name: &OsStr) -> bool {
        self.exclude.is_match(Path::new(name))
    }

    pub fn has_target_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}
