// LanceDB vector database module
// Stores chunk text alongside its embedding and answers nearest-neighbour queries


pub mod vector_store;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embeddings::DocumentChunk;
use crate::{RagError, Result};

pub use vector_store::{SearchResult, TABLE_NAME, VectorStore};

/// Chunk row stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique identifier for this row
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Everything stored next to a chunk's embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the PDF the chunk was cut from
    pub source: String,
    /// Zero-based page within the source
    pub page: u32,
    /// Position of the chunk within the index build
    pub chunk_index: u32,
    pub content: String,
    /// RFC 3339 timestamp of when the chunk was indexed
    pub created_at: String,
}

impl ChunkRecord {
    /// Pair a chunk with its embedding, assigning a fresh id and timestamp.
    ///
    /// Page and chunk positions are stored as `u32`; larger values are rejected.
    #[inline]
    pub fn from_chunk(chunk: &DocumentChunk, vector: Vec<f32>) -> Result<Self> {
        let page = u32::try_from(chunk.page).map_err(|_| {
            RagError::Database(format!(
                "Page {} of {} does not fit in the index",
                chunk.page, chunk.source
            ))
        })?;
        let chunk_index = u32::try_from(chunk.chunk_index).map_err(|_| {
            RagError::Database(format!(
                "Chunk index {} does not fit in the index",
                chunk.chunk_index
            ))
        })?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            vector,
            metadata: ChunkMetadata {
                source: chunk.source.clone(),
                page,
                chunk_index,
                content: chunk.content.clone(),
                created_at: Utc::now().to_rfc3339(),
            },
        })
    }
}
