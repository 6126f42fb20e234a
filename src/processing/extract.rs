//! Page-level PDF text extraction backed by `lopdf`.

use lopdf::Document;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while reading text out of a PDF.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// File does not exist.
    #[error("PDF file not found: {0}")]
    NotFound(PathBuf),
    /// File exists but cannot be opened.
    #[error("Permission denied reading PDF: {0}")]
    PermissionDenied(PathBuf),
    /// Other read failure.
    #[error("Error reading PDF file {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Bytes are not a parseable PDF.
    #[error("Error processing PDF content: {0}")]
    InvalidPdf(String),
    /// PDF parsed but no page yielded any text.
    #[error("No text content could be extracted from the PDF")]
    NoText,
}

/// Text of a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number.
    pub page: u32,
    /// Cleaned page text.
    pub text: String,
}

/// Read `path` and extract text page by page. Blocking; run on a blocking thread.
pub fn extract_pages(path: &Path) -> Result<Vec<PageText>, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ExtractError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied(path.to_path_buf()),
        _ => ExtractError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    extract_pages_from_bytes(&bytes)
}

/// Extract text page by page from an in-memory PDF.
///
/// Pages whose content streams cannot be decoded are skipped with a warning; the document
/// only fails when it cannot be parsed at all or no page yields text.
pub fn extract_pages_from_bytes(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    let document =
        Document::load_mem(bytes).map_err(|error| ExtractError::InvalidPdf(error.to_string()))?;

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(ExtractError::InvalidPdf("document has no pages".into()));
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for page in page_numbers {
        match document.extract_text(&[page]) {
            Ok(raw) => {
                let text = clean_page_text(&raw);
                if !text.is_empty() {
                    pages.push(PageText { page, text });
                }
            }
            Err(error) => {
                tracing::warn!(page, error = %error, "Skipping page with undecodable text");
            }
        }
    }

    if pages.is_empty() {
        return Err(ExtractError::NoText);
    }
    Ok(pages)
}

/// Drop NUL bytes, trim every line, and remove blank lines.
fn clean_page_text(raw: &str) -> String {
    raw.replace('\0', "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
