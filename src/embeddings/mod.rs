pub mod openai;

use async_trait::async_trait;

use crate::error::Result;

pub use openai::OpenAIEmbedder;

/// Turns texts into embedding vectors, one per input, in input order
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}
