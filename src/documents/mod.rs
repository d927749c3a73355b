// Source document loading
// PDFs are read one document per page so chunks can point back to where they came from


use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::RagError;

/// The extracted text of a single PDF page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Path of the file the page was read from
    pub source: String,
    /// Zero-based page number
    pub page: usize,
    pub text: String,
}

/// List the PDF files directly inside `dir`, sorted by path
#[inline]
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RagError::Document(format!(
            "Source document directory not found: {}",
            dir.display()
        ))
        .into());
    }

    let mut pdfs = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("Failed to read entry in {}", dir.display()))?
            .path();

        if path.is_file() && is_pdf(&path) {
            pdfs.push(path);
        }
    }

    pdfs.sort();
    debug!("Found {} PDF files in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Extract one document per page from a PDF file
#[inline]
pub fn load_pdf(path: &Path) -> Result<Vec<SourceDocument>> {
    let pages = pdf_extract::extract_text_by_pages(path).map_err(|e| {
        RagError::Document(format!("Failed to extract text from {}: {}", path.display(), e))
    })?;

    let source = path.display().to_string();
    let documents = pages_to_documents(&source, pages);

    debug!("Loaded {} pages from {}", documents.len(), source);
    Ok(documents)
}

pub(crate) fn pages_to_documents(source: &str, pages: Vec<String>) -> Vec<SourceDocument> {
    pages
        .into_iter()
        .enumerate()
        .map(|(page, text)| SourceDocument {
            source: source.to_string(),
            page,
            text,
        })
        .collect()
}

/// Load every PDF in `dir`. An empty directory yields no documents.
#[inline]
pub fn load_pdf_directory(dir: &Path) -> Result<Vec<SourceDocument>> {
    let pdfs = discover_pdfs(dir)?;

    if pdfs.is_empty() {
        warn!("No PDF documents found in {}", dir.display());
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    for pdf in &pdfs {
        documents.extend(load_pdf(pdf)?);
    }

    info!(
        "Loaded {} pages from {} PDF files in {}",
        documents.len(),
        pdfs.len(),
        dir.display()
    );
    Ok(documents)
}
