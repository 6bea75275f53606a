//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::models::PaperMetadata;
use crate::sources::{DocumentSource, FetchError, FetchedDocument};

/// A mock source that serves predefined documents.
///
/// Unknown identifiers yield [`FetchError::NotFound`].
#[derive(Debug, Default)]
pub struct MockSource {
    documents: Mutex<HashMap<String, FetchedDocument>>,
    broken: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl MockSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `document` under its `paper_id`.
    pub fn add_document(&self, document: FetchedDocument) {
        let mut guard = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(document.paper_id.clone(), document);
    }

    /// Serve raw `bytes` as a PDF with minimal metadata.
    pub fn add_pdf(&self, paper_id: &str, title: &str, bytes: Vec<u8>) {
        self.add_document(
            FetchedDocument::new(paper_id, bytes)
                .with_metadata(PaperMetadata::new(paper_id, title))
                .with_content_type("application/pdf"),
        );
    }

    /// Make every fetch of `paper_id` fail with a network error.
    pub fn break_document(&self, paper_id: &str) {
        let mut guard = self.broken.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(paper_id.to_string());
    }

    /// Delay every fetch by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        let mut guard = self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = delay;
    }

    /// Number of fetches issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for MockSource {
    fn id(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, id: &str) -> Result<FetchedDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let id = self.validate_id(id)?;
        if self.broken.lock().unwrap_or_else(PoisonError::into_inner).contains(&id) {
            return Err(FetchError::Network("connection reset by peer".to_string()));
        }

        let guard = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(&id)
            .cloned()
            .ok_or(FetchError::NotFound(id))
    }
}
