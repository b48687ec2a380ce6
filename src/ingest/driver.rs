use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::batch::plan_batches;
use super::chunker::Splitter;
use super::loader::Loader;
use super::walker::{list_directories, list_eligible_files};
use crate::config::SplitterConfig;
use crate::error::{IngestError, Result};
use crate::fingerprint::{directory_id, ChangeDetector, ChangeStatus, Fingerprint, FingerprintStore};
use crate::index::ChunkUpserter;

/// Lifecycle of one directory within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    Pending,
    Checking,
    Skipped,
    Processing,
    Completed,
    PartiallyFailed,
}

#[derive(Debug)]
pub enum SkipReason {
    Unchanged,
    /// Fingerprinting failed; acting on it could ingest stale or partial content
    DetectionFailed(IngestError),
}

/// A file that made it through every batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub chunks: usize,
    pub batches: usize,
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: IngestError,
}

#[derive(Debug)]
pub struct DirectoryReport {
    pub directory_id: String,
    pub path: PathBuf,
    pub state: DirectoryState,
    pub skip_reason: Option<SkipReason>,
    pub files: Vec<FileReport>,
    pub failures: Vec<FileFailure>,
    /// Only meaningful for `Completed`; false when the store rejected the write
    pub fingerprint_written: bool,
}

impl DirectoryReport {
    fn new(directory_id: String, path: &Path) -> Self {
        Self {
            directory_id,
            path: path.to_path_buf(),
            state: DirectoryState::Pending,
            skip_reason: None,
            files: Vec::new(),
            failures: Vec::new(),
            fingerprint_written: false,
        }
    }

    fn advance(&mut self, next: DirectoryState) {
        log::debug!("{}: {:?} -> {:?}", self.directory_id, self.state, next);
        self.state = next;
    }

    fn skip(mut self, reason: SkipReason) -> Self {
        self.advance(DirectoryState::Skipped);
        self.skip_reason = Some(reason);
        self
    }

    pub fn chunks(&self) -> usize {
        self.files.iter().map(|f| f.chunks).sum()
    }

    pub fn batches(&self) -> usize {
        self.files.iter().map(|f| f.batches).sum()
    }
}

/// Aggregate of one pass over the corpus root
#[derive(Debug, Default)]
pub struct RunReport {
    pub directories: Vec<DirectoryReport>,
    pub elapsed: Duration,
}

impl RunReport {
    fn count(&self, state: DirectoryState) -> usize {
        self.directories.iter().filter(|d| d.state == state).count()
    }

    pub fn skipped(&self) -> usize {
        self.count(DirectoryState::Skipped)
    }

    pub fn completed(&self) -> usize {
        self.count(DirectoryState::Completed)
    }

    pub fn partially_failed(&self) -> usize {
        self.count(DirectoryState::PartiallyFailed)
    }

    pub fn files_ok(&self) -> usize {
        self.directories.iter().map(|d| d.files.len()).sum()
    }

    pub fn files_failed(&self) -> usize {
        self.directories.iter().map(|d| d.failures.len()).sum()
    }

    pub fn chunks(&self) -> usize {
        self.directories.iter().map(DirectoryReport::chunks).sum()
    }

    pub fn batches(&self) -> usize {
        self.directories.iter().map(DirectoryReport::batches).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.partially_failed() > 0
    }
}

/// Drives incremental ingestion: one directory at a time, one file at a
/// time, one batch at a time.
///
/// A directory's fingerprint is written only when every file of the pass
/// succeeded, so anything that failed looks "changed" on the next run.
pub struct IngestionDriver {
    detector: ChangeDetector,
    loader: Arc<dyn Loader>,
    splitter: Arc<dyn Splitter>,
    upserter: Arc<dyn ChunkUpserter>,
    splitter_config: SplitterConfig,
    batch_size: usize,
    force: bool,
}

impl IngestionDriver {
    pub fn new(
        detector: ChangeDetector,
        loader: Arc<dyn Loader>,
        splitter: Arc<dyn Splitter>,
        upserter: Arc<dyn ChunkUpserter>,
        splitter_config: SplitterConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            detector,
            loader,
            splitter,
            upserter,
            splitter_config,
            batch_size,
            force: false,
        }
    }

    /// Process directories even when their fingerprint is unchanged
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Ingest every topic directory under `root`.
    ///
    /// `only`, when non-empty, restricts the run to those directory names.
    /// Only a failure to enumerate `root` is returned as an error.
    pub async fn run(&self, root: &Path, only: &[String]) -> Result<RunReport> {
        let start = Instant::now();
        let directories = list_directories(root, self.detector.policy())?;

        let mut report = RunReport::default();
        for directory in directories {
            if !only.is_empty() {
                let name = directory
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !only.iter().any(|o| o == &name) {
                    log::debug!("Skipping {} (not selected)", directory.display());
                    continue;
                }
            }
            report.directories.push(self.process_directory(&directory).await);
        }

        report.elapsed = start.elapsed();
        Ok(report)
    }

    /// Run the state machine for a single directory
    pub async fn process_directory(&self, directory: &Path) -> DirectoryReport {
        let id = match directory_id(directory) {
            Ok(id) => id,
            Err(e) => {
                let report = DirectoryReport::new(directory.display().to_string(), directory);
                log::error!("Skip {}: {}", directory.display(), e);
                return report.skip(SkipReason::DetectionFailed(e));
            }
        };
        let mut report = DirectoryReport::new(id, directory);
        report.advance(DirectoryState::Checking);

        let current = match self.detector.has_changed(directory).await {
            ChangeStatus::Changed { current, .. } => {
                log::info!("Changes detected in {}, processing", report.directory_id);
                current
            }
            ChangeStatus::Unchanged(current) if self.force => {
                log::info!("No changes in {}, processing anyway (--force)", report.directory_id);
                current
            }
            ChangeStatus::Unchanged(_) => {
                log::info!("No changes detected in {}, skipping", report.directory_id);
                return report.skip(SkipReason::Unchanged);
            }
            ChangeStatus::Failed(e) => {
                log::error!("Skip {}: {}", report.directory_id, e);
                return report.skip(SkipReason::DetectionFailed(e));
            }
        };

        report.advance(DirectoryState::Processing);
        self.process_files(&mut report, directory).await;

        if report.failures.is_empty() {
            report.advance(DirectoryState::Completed);
            let fingerprint = Fingerprint {
                updated_at: Some(Utc::now()),
                ..current
            };
            report.fingerprint_written = self.detector.store().write(&fingerprint).await;
            log::info!(
                "Completed {}: {} files, {} chunks in {} batches",
                report.directory_id,
                report.files.len(),
                report.chunks(),
                report.batches()
            );
        } else {
            report.advance(DirectoryState::PartiallyFailed);
            log::warn!(
                "{}: {} of {} files failed; fingerprint not updated",
                report.directory_id,
                report.failures.len(),
                report.failures.len() + report.files.len()
            );
        }

        report
    }

    async fn process_files(&self, report: &mut DirectoryReport, directory: &Path) {
        let files = match list_eligible_files(directory, self.detector.policy()) {
            Ok(files) => files,
            Err(e) => {
                log::error!("✗ {}: {}", directory.display(), e);
                report.failures.push(FileFailure {
                    path: directory.to_path_buf(),
                    error: e,
                });
                return;
            }
        };

        let total = files.len();
        for (idx, file) in files.into_iter().enumerate() {
            log::info!("[{}/{}] Processing file: {}", idx + 1, total, file.display());
            match self.process_file(&file, &report.directory_id).await {
                Ok(file_report) => {
                    log::info!(
                        "✓ {} ({} chunks, {} batches)",
                        file.display(),
                        file_report.chunks,
                        file_report.batches
                    );
                    report.files.push(file_report);
                }
                Err(e) => {
                    log::error!("✗ {}: {}", file.display(), e);
                    report.failures.push(FileFailure { path: file, error: e });
                }
            }
        }
    }

    /// Load, split, batch and upsert one file under `namespace`.
    ///
    /// Batches already upserted when a later batch fails stay in the index.
    pub async fn process_file(&self, path: &Path, namespace: &str) -> Result<FileReport> {
        let documents = self.loader.load(path).await?;
        let chunks = self.splitter.split(&documents, &self.splitter_config)?;
        let chunk_count = chunks.len();
        let batches = plan_batches(namespace, chunks, self.batch_size)?;
        let batch_count = batches.len();

        for batch in &batches {
            log::debug!(
                "Upserting batch {}/{} ({} chunks) into {}",
                batch.index + 1,
                batch_count,
                batch.len(),
                namespace
            );
            self.upserter.upsert(batch).await?;
        }

        Ok(FileReport {
            path: path.to_path_buf(),
            chunks: chunk_count,
            batches: batch_count,
        })
    }
}
