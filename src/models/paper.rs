//! Bibliographic metadata for a fetched paper.

use serde::{Deserialize, Serialize};

/// Metadata returned by the arXiv query API alongside a document download.
///
/// Used to render the header of the converted Markdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    /// arXiv identifier, including a version suffix when one was requested
    pub paper_id: String,

    /// Paper title, whitespace-normalized
    pub title: String,

    /// Author names in listed order
    pub authors: Vec<String>,

    /// Publication date (RFC 3339)
    pub published: Option<String>,

    /// Primary arXiv category (e.g. `cs.AI`)
    pub primary_category: Option<String>,

    /// Direct PDF URL advertised by the feed
    pub pdf_url: Option<String>,
}

impl PaperMetadata {
    /// Create metadata with the required fields
    pub fn new(paper_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            title: clean_text(&title.into()),
            ..Default::default()
        }
    }

    /// Set authors
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Set publication date
    pub fn published(mut self, published: impl Into<String>) -> Self {
        self.published = Some(published.into());
        self
    }

    /// Set primary category
    pub fn primary_category(mut self, category: impl Into<String>) -> Self {
        self.primary_category = Some(category.into());
        self
    }

    /// Set PDF URL
    pub fn pdf_url(mut self, url: impl Into<String>) -> Self {
        self.pdf_url = Some(url.into());
        self
    }

    /// Authors joined for display
    pub fn author_line(&self) -> String {
        self.authors.join(", ")
    }
}

/// Collapse runs of whitespace (feed titles wrap across lines)
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
