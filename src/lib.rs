use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Judge error: {0}")]
    Judge(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Vector index has not been built at {}. Run `rag-eval index` first.", .0.display())]
    IndexNotBuilt(PathBuf),

    #[error("Test set error: {0}")]
    TestSet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod dashboard;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod evaluation;
pub mod indexer;
pub mod rag;
