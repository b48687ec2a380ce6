use serde::Serialize;

use crate::config::SplitterConfig;
use crate::error::{IngestError, Result};
use super::loader::RawDocument;

/// Positional and source metadata carried by every chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Position of the chunk within its file, across pages
    pub chunk_index: usize,
    /// Character offsets of the chunk window within its raw document
    pub start_char: usize,
    pub end_char: usize,
}

/// A chunk of text with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Divides raw documents into overlapping chunks.
///
/// Must be deterministic for identical input and configuration.
pub trait Splitter: Send + Sync {
    fn split(&self, documents: &[RawDocument], config: &SplitterConfig) -> Result<Vec<Chunk>>;
}

/// Character-window splitter with overlap.
///
/// Windows hold at most `chunk_size` characters. When a window does not
/// reach the end of the text, it is cut after the last whitespace or
/// sentence punctuation in its final 20%, if any. The next window starts
/// `chunk_overlap` characters before the cut.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterSplitter;

impl Splitter for CharacterSplitter {
    fn split(&self, documents: &[RawDocument], config: &SplitterConfig) -> Result<Vec<Chunk>> {
        if config.chunk_size == 0 {
            return Err(IngestError::Split("chunk_size must be greater than 0".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(IngestError::Split(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }

        let mut chunks = Vec::new();
        for document in documents {
            for (start_char, end_char, text) in
                chunk_text(&document.text, config.chunk_size, config.chunk_overlap)
            {
                chunks.push(Chunk {
                    text,
                    metadata: ChunkMetadata {
                        source: document.metadata.source.clone(),
                        page: document.metadata.page,
                        chunk_index: chunks.len(),
                        start_char,
                        end_char,
                    },
                });
            }
        }
        Ok(chunks)
    }
}

/// Chunk text with overlap, returning `(start_char, end_char, trimmed text)`.
///
/// Works on `char`s so multi-byte UTF-8 text is never cut mid-character.
/// Windows that are blank after trimming are dropped.
fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<(usize, usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < len {
        let end = (start + size).min(len);

        let cut = if end < len {
            let search_start = end.saturating_sub(size / 5).max(start + 1);
            chars[search_start..end]
                .iter()
                .rposition(|c| c.is_whitespace() || matches!(c, '.' | '!' | '?'))
                .map(|offset| search_start + offset + 1)
                .unwrap_or(end)
        } else {
            end
        };

        let window: String = chars[start..cut].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push((start, cut, trimmed.to_string()));
        }

        if cut >= len {
            break;
        }

        // Step back by the overlap, but always move forward
        let next = cut.saturating_sub(overlap);
        start = if next > start { next } else { cut };
    }

    chunks
}
