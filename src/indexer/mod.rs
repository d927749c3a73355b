// Indexer module
// Turns a directory of PDFs into the chunk index used for retrieval


use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::RagError;
use crate::database::{ChunkRecord, VectorStore};
use crate::documents::{SourceDocument, load_pdf_directory};
use crate::embeddings::chunking::{ChunkingConfig, chunk_documents};
use crate::embeddings::{DocumentChunk, Embedder};

const DEFAULT_BATCH_SIZE: usize = 32;

/// Builds (and rebuilds) the vector index from source documents
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    chunking_config: ChunkingConfig,
    /// Used only when there is nothing to embed and an empty index must still be created
    empty_index_dimension: usize,
    batch_size: usize,
}

/// Summary of one index build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    /// Pages loaded from the source PDFs
    pub documents_loaded: usize,
    pub chunks_created: usize,
    pub embeddings_stored: usize,
    pub vector_dimension: usize,
}

impl IndexingStats {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks_created == 0
    }
}

impl Indexer {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, chunking_config: ChunkingConfig) -> Self {
        Self {
            embedder,
            chunking_config,
            empty_index_dimension: crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION as usize,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[inline]
    pub fn with_empty_index_dimension(mut self, dimension: usize) -> Self {
        self.empty_index_dimension = dimension;
        self
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Load every PDF in `source_dir` and rebuild the index at `index_path` from them.
    ///
    /// A directory without PDFs produces an empty index, a missing directory is an error.
    #[inline]
    pub async fn build_index(&self, source_dir: &Path, index_path: &Path) -> Result<IndexingStats> {
        info!(
            "Building index at {} from {}",
            index_path.display(),
            source_dir.display()
        );

        let documents = load_pdf_directory(source_dir)?;
        if documents.is_empty() {
            warn!("No PDF documents found in {}", source_dir.display());
        }

        self.index_documents(&documents, index_path).await
    }

    /// Chunk and embed `documents`, replacing whatever the index held before.
    ///
    /// Every chunk is embedded before anything is written, and the new index is built
    /// next to the old one and moved into place only once it is complete. A failed
    /// build leaves the previous index as it was.
    #[inline]
    pub async fn index_documents(
        &self,
        documents: &[SourceDocument],
        index_path: &Path,
    ) -> Result<IndexingStats> {
        let chunks = chunk_documents(documents, &self.chunking_config)
            .context("Failed to chunk documents")?;

        let mut stats = IndexingStats {
            documents_loaded: documents.len(),
            chunks_created: chunks.len(),
            ..IndexingStats::default()
        };

        if chunks.is_empty() {
            warn!("No chunks to index, creating an empty index");
        }

        let records = self.embed_chunks(&chunks)?;
        stats.vector_dimension = records
            .first()
            .map_or(self.empty_index_dimension, |r| r.vector.len());

        let staging_path = staging_path(index_path);
        if let Err(e) = self
            .write_index(&records, stats.vector_dimension, &staging_path)
            .await
        {
            if staging_path.exists() {
                if let Err(cleanup) = fs::remove_dir_all(&staging_path) {
                    warn!(
                        "Failed to remove staging index {}: {}",
                        staging_path.display(),
                        cleanup
                    );
                }
            }
            return Err(e);
        }
        replace_index(&staging_path, index_path)?;
        stats.embeddings_stored = records.len();

        info!(
            "Indexed {} chunks from {} pages into {}",
            stats.embeddings_stored,
            stats.documents_loaded,
            index_path.display()
        );
        Ok(stats)
    }

    fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<ChunkRecord>> {
        let bar = progress_bar(chunks.len());
        let mut records = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            records.extend(self.embed_batch(batch)?);
            bar.inc(batch.len() as u64);
        }

        bar.finish_and_clear();
        Ok(records)
    }

    async fn write_index(
        &self,
        records: &[ChunkRecord],
        dimension: usize,
        path: &Path,
    ) -> Result<()> {
        if path.exists() {
            fs::remove_dir_all(path).with_context(|| {
                format!("Failed to clear stale staging index {}", path.display())
            })?;
        }

        let mut store = VectorStore::create(path, dimension).await?;
        for batch in records.chunks(self.batch_size) {
            store.store_chunks_batch(batch).await?;
        }
        if !records.is_empty() {
            store.optimize().await?;
        }

        debug!("Staged {} chunks at {}", records.len(), path.display());
        Ok(())
    }

    fn embed_batch(&self, batch: &[DocumentChunk]) -> Result<Vec<ChunkRecord>> {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = self
            .embedder
            .embed_documents(&texts)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        if vectors.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                vectors.len()
            ))
            .into());
        }

        debug!("Embedded batch of {} chunks", batch.len());
        Ok(batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord::from_chunk(chunk, vector))
            .collect::<crate::Result<Vec<_>>>()?)
    }
}

/// Sibling directory the next index is built in, e.g. `db_lance.staging`
fn staging_path(index_path: &Path) -> PathBuf {
    let mut name = index_path
        .file_name()
        .map_or_else(|| OsString::from("index"), OsString::from);
    name.push(".staging");
    index_path.with_file_name(name)
}

/// Move a completed staging index over the live one
fn replace_index(staging_path: &Path, index_path: &Path) -> Result<()> {
    if index_path.exists() {
        fs::remove_dir_all(index_path)
            .with_context(|| format!("Failed to remove old index {}", index_path.display()))?;
    }
    fs::rename(staging_path, index_path).with_context(|| {
        format!(
            "Failed to move new index from {} to {}",
            staging_path.display(),
            index_path.display()
        )
    })?;
    Ok(())
}

fn progress_bar(len: usize) -> ProgressBar {
    if console::user_attended_stderr() {
        let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks {wide_bar}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(len as u64).with_style(style)
    } else {
        ProgressBar::hidden()
    }
}
