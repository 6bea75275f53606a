//! Upstream document sources.
//!
//! A [`DocumentSource`] retrieves one document by identifier from a remote
//! service while honoring that service's usage policy. The task manager only
//! depends on this trait; [`ArxivSource`] is the production implementation
//! and [`MockSource`] serves canned documents in tests.

mod arxiv;
pub mod mock;

pub use arxiv::{ArxivSource, ARXIV_API_URL, ARXIV_PDF_URL};
pub use mock::MockSource;

use async_trait::async_trait;

use crate::models::PaperMetadata;
use crate::utils::{Retryable, TransientError};

/// Raw document returned by a source
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Normalized identifier the document was fetched under
    pub paper_id: String,

    /// Bibliographic metadata, when the source provides it
    pub metadata: Option<PaperMetadata>,

    /// Document bytes as downloaded
    pub bytes: Vec<u8>,

    /// Content type reported by the server (e.g. `application/pdf`)
    pub content_type: Option<String>,
}

impl FetchedDocument {
    pub fn new(paper_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            paper_id: paper_id.into(),
            metadata: None,
            bytes,
            content_type: None,
        }
    }

    pub fn with_metadata(mut self, metadata: PaperMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// The Upstream Fetcher contract used by the task manager
#[async_trait]
pub trait DocumentSource: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source (e.g. "arxiv")
    fn id(&self) -> &str;

    /// Normalize an identifier, rejecting malformed ones without any network call
    fn validate_id(&self, id: &str) -> Result<String, FetchError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(FetchError::InvalidId("empty identifier".to_string()));
        }
        Ok(id.to_string())
    }

    /// Retrieve the document and its metadata
    async fn fetch(&self, id: &str) -> Result<FetchedDocument, FetchError>;
}

/// Errors that can occur when fetching from a source
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network or transport error (timeout, reset, refused)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status that may succeed on retry
    #[error("Upstream returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Upstream asked us to slow down
    #[error("Rate limit exceeded")]
    RateLimit(Option<u64>),

    /// Document does not exist upstream
    #[error("Paper not found: {0}")]
    NotFound(String),

    /// Identifier is malformed
    #[error("Invalid paper ID: {0}")]
    InvalidId(String),

    /// Response could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

impl FetchError {
    /// Map a non-success HTTP status for `id`
    pub fn from_status(status: reqwest::StatusCode, id: &str) -> Self {
        match status.as_u16() {
            404 | 410 => FetchError::NotFound(id.to_string()),
            400 => FetchError::InvalidId(id.to_string()),
            429 => FetchError::RateLimit(None),
            code => FetchError::Status {
                status: code,
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            },
        }
    }
}

impl Retryable for FetchError {
    fn transient(&self) -> Option<TransientError> {
        match self {
            FetchError::Network(msg) if msg.to_lowercase().contains("timed out") => {
                Some(TransientError::Timeout)
            }
            FetchError::Network(_) => Some(TransientError::Network),
            FetchError::Status { status, .. } if *status >= 500 => {
                Some(TransientError::ServerError)
            }
            FetchError::Status { .. } => Some(TransientError::Network),
            FetchError::RateLimit(after) => Some(TransientError::TooManyRequests(*after)),
            FetchError::NotFound(_) | FetchError::InvalidId(_) | FetchError::Parse(_) => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Network(format!("request timed out: {}", err))
        } else {
            FetchError::Network(err.to_string())
        }
    }
}
