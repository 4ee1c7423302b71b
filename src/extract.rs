//! PDF text extraction
//!
//! Reads the text layer of every page with `pdf_oxide` and concatenates it in
//! page order. Pages without a text layer contribute nothing; no OCR.

use crate::error::{Error, Result};
use pdf_oxide::document::PdfDocument;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Text pulled out of a PDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Per-page text joined with no separator
    pub text: String,
    /// Number of pages in the source document
    pub page_count: usize,
}

impl ExtractedText {
    /// Number of characters extracted
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Extract the text of every page of the PDF at `path`.
///
/// A page whose text layer cannot be read fails the whole extraction with
/// [`Error::Parse`]. A page with no text layer yields an empty string.
pub fn extract_text(path: &Path) -> Result<ExtractedText> {
    // Surface unreadable paths as access errors rather than parse errors
    let metadata = fs::metadata(path).map_err(|e| Error::file_access(path, e))?;
    if !metadata.is_file() {
        return Err(Error::file_access(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    File::open(path).map_err(|e| Error::file_access(path, e))?;

    let mut doc = PdfDocument::open(path).map_err(|e| parse_error(path, e))?;
    let page_count = doc.page_count().map_err(|e| parse_error(path, e))?;
    let text = collect_pages(path, page_count, |page_idx| doc.extract_text(page_idx))?;

    tracing::info!(
        path = %path.display(),
        pages = page_count,
        chars = text.chars().count(),
        "extracted text"
    );

    Ok(ExtractedText { text, page_count })
}

/// Concatenate pages `0..page_count` in order, stopping at the first failure.
fn collect_pages<E, F>(path: &Path, page_count: usize, mut page_text: F) -> Result<String>
where
    E: fmt::Display,
    F: FnMut(usize) -> std::result::Result<String, E>,
{
    let mut text = String::new();
    for page_idx in 0..page_count {
        let page = page_text(page_idx).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: format!("page {}: {}", page_idx + 1, e),
        })?;
        if page.is_empty() {
            tracing::debug!(page = page_idx, "page has no text layer");
        }
        text.push_str(&page);
    }
    Ok(text)
}

fn parse_error(path: &Path, e: impl fmt::Display) -> Error {
    Error::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
