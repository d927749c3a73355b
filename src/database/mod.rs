// Database module
// Persistent vector index for document chunks, backed by LanceDB

pub mod lancedb;

pub use lancedb::{ChunkMetadata, ChunkRecord, SearchResult, VectorStore};
