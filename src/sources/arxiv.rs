//! arXiv document source.
//!
//! Fetching a paper takes two requests: the Atom query API for metadata and
//! the PDF itself. Every request goes through the shared [`RateGate`] and is
//! retried on transport failures with exponential backoff.

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use std::sync::{Arc, OnceLock};

use crate::models::{clean_text, PaperMetadata};
use crate::sources::{DocumentSource, FetchError, FetchedDocument};
use crate::utils::{with_retry, HttpClient, RateGate, RetryConfig};

/// Base URL for arXiv API
pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";
/// Base URL for arXiv PDFs
pub const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";

fn new_style_id() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").expect("valid arXiv id pattern")
    })
}

fn old_style_id() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^[a-z][a-z\-]*(\.[A-Za-z]{2})?/\d{7}(v\d+)?$")
            .expect("valid legacy arXiv id pattern")
    })
}

/// arXiv research source
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: HttpClient,
    gate: Arc<RateGate>,
    retry: RetryConfig,
    api_url: String,
    pdf_url: String,
}

impl ArxivSource {
    /// Create a source sharing `gate` with every other arXiv call site
    pub fn new(client: HttpClient, gate: Arc<RateGate>) -> Self {
        Self {
            client,
            gate,
            retry: RetryConfig::default(),
            api_url: ARXIV_API_URL.to_string(),
            pdf_url: ARXIV_PDF_URL.to_string(),
        }
    }

    /// Point at different endpoints (mirrors, tests)
    pub fn with_endpoints(mut self, api_url: impl Into<String>, pdf_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self.pdf_url = pdf_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Parse an arXiv ID from various formats
    ///
    /// Handles formats like:
    /// - "2301.12345"
    /// - "2301.12345v1" (version is kept)
    /// - "arxiv:2301.12345"
    /// - "https://arxiv.org/abs/2301.12345v1"
    /// - "https://arxiv.org/pdf/2301.12345.pdf"
    /// - "math.GT/0104020"
    pub fn parse_id(id: &str) -> Result<String, FetchError> {
        let raw = id.trim();
        if raw.is_empty() {
            return Err(FetchError::InvalidId("empty arXiv ID".to_string()));
        }

        let lower = raw.to_ascii_lowercase();
        let mut id = raw;

        for marker in ["/abs/", "/pdf/"] {
            if let Some(pos) = lower.find(marker) {
                id = &raw[pos + marker.len()..];
                break;
            }
        }

        if id
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("arxiv:"))
        {
            id = &id[6..];
        }

        let id = id.trim_end_matches('/');
        let id = match id.len().checked_sub(4).and_then(|cut| id.get(cut..)) {
            Some(suffix) if suffix.eq_ignore_ascii_case(".pdf") => &id[..id.len() - 4],
            _ => id,
        };

        if new_style_id().is_match(id) || old_style_id().is_match(id) {
            Ok(id.to_string())
        } else {
            Err(FetchError::InvalidId(raw.to_string()))
        }
    }

    /// One gated GET. The permit is held until the body is fully read.
    async fn get_gated(
        &self,
        url: &str,
        paper_id: &str,
    ) -> Result<(Vec<u8>, Option<String>), FetchError> {
        let _permit = self.gate.acquire().await;
        tracing::debug!(url = %url, "Requesting from arXiv");

        let response = self.client.client().get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok());
                return Err(FetchError::RateLimit(retry_after));
            }
            return Err(FetchError::from_status(status, paper_id));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), content_type))
    }

    /// Look up paper metadata through the Atom query API
    pub async fn fetch_metadata(&self, paper_id: &str) -> Result<PaperMetadata, FetchError> {
        let url = format!(
            "{}?id_list={}&max_results=1",
            self.api_url,
            urlencoding::encode(paper_id)
        );
        let url = url.as_str();

        let (body, _) = with_retry(self.retry, || self.get_gated(url, paper_id)).await?;
        Self::parse_metadata(&body, paper_id)
    }

    /// Download the PDF bytes
    pub async fn fetch_pdf(
        &self,
        paper_id: &str,
    ) -> Result<(Vec<u8>, Option<String>), FetchError> {
        let url = format!("{}/{}", self.pdf_url, paper_id);
        let url = url.as_str();

        with_retry(self.retry, || self.get_gated(url, paper_id)).await
    }

    /// Parse the Atom feed returned for an `id_list` query
    fn parse_metadata(body: &[u8], paper_id: &str) -> Result<PaperMetadata, FetchError> {
        let feed = parser::parse(body)
            .map_err(|e| FetchError::Parse(format!("Failed to parse Atom feed: {}", e)))?;

        let entry = feed
            .entries
            .first()
            .ok_or_else(|| FetchError::NotFound(paper_id.to_string()))?;

        // arXiv reports bad identifiers as a pseudo-entry under /api/errors
        if entry.id.contains("/api/errors") {
            let detail = entry
                .summary
                .as_ref()
                .map(|s| clean_text(&s.content))
                .unwrap_or_else(|| paper_id.to_string());
            return Err(FetchError::InvalidId(detail));
        }

        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.as_str())
            .unwrap_or("");
        if title.trim().is_empty() {
            return Err(FetchError::NotFound(paper_id.to_string()));
        }

        let mut metadata = PaperMetadata::new(paper_id, title)
            .authors(entry.authors.iter().map(|a| clean_text(&a.name)));

        if let Some(published) = entry.published {
            metadata = metadata.published(published.to_rfc3339());
        }
        if let Some(category) = entry.categories.first() {
            metadata = metadata.primary_category(category.term.clone());
        }
        if let Some(link) = entry
            .links
            .iter()
            .find(|l| l.media_type.as_deref() == Some("application/pdf"))
        {
            metadata = metadata.pdf_url(link.href.clone());
        }

        Ok(metadata)
    }
}

#[async_trait]
impl DocumentSource for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn validate_id(&self, id: &str) -> Result<String, FetchError> {
        Self::parse_id(id)
    }

    async fn fetch(&self, id: &str) -> Result<FetchedDocument, FetchError> {
        let paper_id = Self::parse_id(id)?;

        let metadata = self.fetch_metadata(&paper_id).await?;
        let (bytes, content_type) = self.fetch_pdf(&paper_id).await?;

        tracing::info!(
            paper_id = %paper_id,
            bytes = bytes.len(),
            "Downloaded paper from arXiv"
        );

        let mut document = FetchedDocument::new(paper_id, bytes).with_metadata(metadata);
        if let Some(content_type) = content_type {
            document = document.with_content_type(content_type);
        }
        Ok(document)
    }
}
