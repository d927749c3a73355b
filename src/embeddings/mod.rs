// Embeddings module
// Document chunking and the Ollama client used for embeddings and text generation

pub mod chunking;
pub mod ollama;

use anyhow::Result;

pub use chunking::{ChunkingConfig, DocumentChunk, TextSplitter, chunk_documents};
pub use ollama::{OllamaClient, OllamaLanguageModel};

/// Turns text into vectors for the similarity index
pub trait Embedder: Send + Sync {
    /// Embed a batch of documents, returning one vector per input in the same order
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}
