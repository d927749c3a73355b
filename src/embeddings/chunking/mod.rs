
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::documents::SourceDocument;

/// Separators tried in order, from paragraph breaks down to single characters
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// A chunk of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// The chunk text
    pub content: String,
    /// Path of the document this chunk was cut from
    pub source: String,
    /// Zero-based page number within the source document
    pub page: usize,
    /// Position of this chunk across the whole build, in document order
    pub chunk_index: usize,
}

impl DocumentChunk {
    /// Length in characters, which is what chunk sizes are measured in
    #[inline]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Configuration for document chunking, measured in characters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters carried over from the end of one chunk into the next
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

/// Recursive character splitter.
///
/// Text is split on the first separator that occurs in it. Pieces that are still
/// too long are split again with the remaining separators, and short pieces are
/// merged back together up to `chunk_size` with `chunk_overlap` characters of
/// trailing context repeated at the start of the next chunk.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("Chunk size must be greater than 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap,
                chunk_size
            );
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    #[inline]
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    #[inline]
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Split text into trimmed, non-empty chunks of at most `chunk_size` characters
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Pick the first separator present in the text; "" always matches
        let mut separator = separators.last().map_or("", String::as_str);
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits = split_keeping_separator(text, separator);

        // Separators stay attached to the pieces, so merging joins with nothing
        let mut good_splits: Vec<&str> = Vec::new();
        for split in splits {
            if char_len(split) < self.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if remaining.is_empty() {
                let trimmed = split.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(split, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0;

        for split in splits {
            let len = char_len(split);

            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, self.chunk_size
                    );
                }

                if !current.is_empty() {
                    if let Some(doc) = join_pieces(&current) {
                        docs.push(doc);
                    }

                    // Drop pieces from the front until what is left fits in the
                    // overlap and leaves room for the incoming piece
                    while total > self.chunk_overlap
                        || (total + len > self.chunk_size && total > 0)
                    {
                        let first = current.remove(0);
                        total -= char_len(first);
                    }
                }
            }

            current.push(split);
            total += len;
        }

        if let Some(doc) = join_pieces(&current) {
            docs.push(doc);
        }

        docs
    }
}

/// Chunk every document in order, assigning a global chunk index
#[inline]
pub fn chunk_documents(
    documents: &[SourceDocument],
    config: &ChunkingConfig,
) -> Result<Vec<DocumentChunk>> {
    let splitter = TextSplitter::from_config(config)?;
    let mut chunks = Vec::new();

    for document in documents {
        for content in splitter.split_text(&document.text) {
            chunks.push(DocumentChunk {
                content,
                source: document.source.clone(),
                page: document.page,
                chunk_index: chunks.len(),
            });
        }
    }

    debug!(
        "Chunked {} documents into {} chunks (avg {} chars)",
        documents.len(),
        chunks.len(),
        chunks.iter().map(DocumentChunk::char_len).sum::<usize>() / chunks.len().max(1)
    );

    Ok(chunks)
}

/// Split on `separator`, attaching each separator to the start of the piece that follows it
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces.retain(|piece| !piece.is_empty());
    pieces
}

fn join_pieces(pieces: &[&str]) -> Option<String> {
    let joined = pieces.concat();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[inline]
fn char_len(text: &str) -> usize {
    text.chars().count()
}
