use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

use crate::error::{IngestError, Result};

/// Where a piece of extracted text came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub source: String,
    /// 1-based page number, when the loader can tell pages apart
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

/// Text extracted from a file, before splitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Turns a file into raw documents. Failures are `IngestError::Load`.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Vec<RawDocument>>;
}

/// PDF loader backed by `pdf-extract`
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

#[async_trait]
impl Loader for PdfLoader {
    async fn load(&self, path: &Path) -> Result<Vec<RawDocument>> {
        let bytes = tokio::fs::read(path).await.map_err(|e| load_error(path, e))?;

        // CPU-bound, and may panic on malformed input
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| load_error(path, format!("extraction aborted: {}", e)))?
            .map_err(|e| load_error(path, e))?;

        let documents = split_pages(&text, &path.display().to_string());
        if documents.is_empty() {
            return Err(load_error(path, "no extractable text"));
        }
        Ok(documents)
    }
}

/// One document per non-blank page. Pages are separated by form feeds;
/// text without any form feed is a single page.
pub fn split_pages(text: &str, source: &str) -> Vec<RawDocument> {
    text.split('\u{c}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(idx, page)| RawDocument {
            text: page.to_string(),
            metadata: DocumentMetadata {
                source: source.to_string(),
                page: Some(idx + 1),
            },
        })
        .collect()
}

fn load_error(path: &Path, reason: impl std::fmt::Display) -> IngestError {
    IngestError::Load {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
