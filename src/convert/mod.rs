//! Document conversion.
//!
//! A [`Converter`] turns downloaded bytes into structured text. Converters
//! are pure: no shared state, no I/O, safe to run concurrently for different
//! tasks. They are CPU-bound, so the task manager runs them on the blocking
//! thread pool.

mod markdown;

pub use markdown::PdfMarkdownConverter;

use thiserror::Error;

use crate::sources::FetchedDocument;
use crate::utils::PdfExtractError;

/// Why a fetched document could not be converted
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Document is not a PDF (content type: {content_type})")]
    NotAPdf { content_type: String },

    #[error("PDF is encrypted and cannot be read")]
    Encrypted,

    #[error("PDF is corrupt: {0}")]
    Corrupt(String),

    #[error("PDF contains no extractable text (scanned or image-only document)")]
    NoText,

    #[error("Conversion failed: {0}")]
    Failed(String),
}

impl ConversionError {
    fn from_extract(err: PdfExtractError, document: &FetchedDocument) -> Self {
        match err {
            PdfExtractError::NotAPdf(_) => ConversionError::NotAPdf {
                content_type: document
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            },
            PdfExtractError::Encrypted => ConversionError::Encrypted,
            PdfExtractError::Corrupt(detail) => ConversionError::Corrupt(detail),
            PdfExtractError::ExtractionFailed(detail) => ConversionError::Failed(detail),
        }
    }
}

/// Raw document bytes to structured text
pub trait Converter: Send + Sync + std::fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Convert `document`, failing with a human-readable cause
    fn convert(&self, document: &FetchedDocument) -> Result<String, ConversionError>;
}
