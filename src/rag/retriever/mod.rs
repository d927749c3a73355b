
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::database::{SearchResult, VectorStore};
use crate::embeddings::Embedder;

/// Returns the passages most similar to a query, closest first
#[async_trait]
pub trait Retriever: Send + Sync {
    /// At most `k` passages. The same query against the same index always yields the same list.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>>;
}

/// Retriever backed by the LanceDB chunk index
pub struct VectorRetriever {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
}

impl VectorRetriever {
    #[inline]
    pub fn new(store: VectorStore, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Open the index at `path`; fails with `RagError::IndexNotBuilt` if it does not exist
    #[inline]
    pub async fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = VectorStore::open(path).await?;
        Ok(Self::new(store, embedder))
    }

    /// Search results with their source metadata, for callers that want more than the text
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_vector = self
            .embedder
            .embed_query(query)
            .context("Failed to embed query")?;

        let results = self.store.search_similar(&query_vector, k).await?;
        debug!("Retrieved {} chunks for query", results.len());
        Ok(results)
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    #[inline]
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .search(query, k)
            .await?
            .into_iter()
            .map(|result| result.chunk.content)
            .collect())
    }
}
