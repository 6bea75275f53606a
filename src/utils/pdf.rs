//! PDF text extraction utilities.
//!
//! Text is pulled from an in-memory document page by page with `lopdf`. When
//! that yields nothing (unusual font encodings, odd content streams) the
//! whole document is handed to `pdf-extract` as a fallback.

use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

/// Leading bytes of every PDF file
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Errors that can occur during PDF extraction
#[derive(Debug, Error)]
pub enum PdfExtractError {
    #[error("Not a PDF document (first bytes: {0:?})")]
    NotAPdf(Vec<u8>),

    #[error("PDF is encrypted")]
    Encrypted,

    #[error("PDF structure is corrupt: {0}")]
    Corrupt(String),

    #[error("Failed to extract text from PDF: {0}")]
    ExtractionFailed(String),
}

/// Text of a single page
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page number
    pub number: u32,
    pub text: String,
}

/// Check the `%PDF-` header
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Extract text from each page of an in-memory PDF.
///
/// Pages without text are still returned (with empty `text`) so callers can
/// keep page numbering intact.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>, PdfExtractError> {
    if !looks_like_pdf(bytes) {
        return Err(PdfExtractError::NotAPdf(
            bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
        ));
    }

    let document =
        lopdf::Document::load_mem(bytes).map_err(|e| PdfExtractError::Corrupt(e.to_string()))?;

    if document.is_encrypted() {
        return Err(PdfExtractError::Encrypted);
    }

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(PdfExtractError::Corrupt("document has no pages".to_string()));
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        let text = match document.extract_text(&[number]) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::debug!("No text extracted from page {}: {}", number, e);
                String::new()
            }
        };
        pages.push(PageText { number, text });
    }

    if pages.iter().all(|p| p.text.is_empty()) {
        tracing::debug!("Per-page extraction empty, falling back to pdf-extract");
        let text = extract_whole(bytes)?;
        if !text.trim().is_empty() {
            return Ok(vec![PageText {
                number: 1,
                text: text.trim().to_string(),
            }]);
        }
    }

    Ok(pages)
}

/// Extract the whole document as a single string with `pdf-extract`
pub fn extract_whole(bytes: &[u8]) -> Result<String, PdfExtractError> {
    // pdf-extract panics on some malformed inputs instead of erroring
    match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(PdfExtractError::ExtractionFailed(e.to_string())),
        Err(_) => Err(PdfExtractError::ExtractionFailed(
            "pdf-extract aborted on malformed content".to_string(),
        )),
    }
}
