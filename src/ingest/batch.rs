use crate::error::{IngestError, Result};
use super::chunker::Chunk;

/// Ordered group of chunks sent to the index in one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertBatch {
    pub namespace: String,
    /// Position of this batch within its file
    pub index: usize,
    pub chunks: Vec<Chunk>,
}

impl UpsertBatch {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Partition `chunks` into batches of at most `batch_size`, preserving order.
///
/// Produces `ceil(chunks.len() / batch_size)` batches; only the last one may
/// be smaller. No chunks means no batches.
pub fn plan_batches(namespace: &str, chunks: Vec<Chunk>, batch_size: usize) -> Result<Vec<UpsertBatch>> {
    if batch_size == 0 {
        return Err(IngestError::InvalidInput(
            "batch_size must be greater than 0".to_string(),
        ));
    }

    let mut batches = Vec::with_capacity(chunks.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);

    for chunk in chunks {
        current.push(chunk);
        if current.len() == batch_size {
            batches.push(UpsertBatch {
                namespace: namespace.to_string(),
                index: batches.len(),
                chunks: std::mem::replace(&mut current, Vec::with_capacity(batch_size)),
            });
        }
    }

    if !current.is_empty() {
        batches.push(UpsertBatch {
            namespace: namespace.to_string(),
            index: batches.len(),
            chunks: current,
        });
    }

    Ok(batches)
}
