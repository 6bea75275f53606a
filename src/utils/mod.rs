//! Utility modules shared by the fetcher, converter and task manager.
//!
//! - [`HttpClient`]: shared reqwest client with the crate's user agent
//! - [`RateGate`]: global minimum spacing and single-flight for outbound requests
//! - [`with_retry`]: exponential backoff for errors implementing [`Retryable`]
//! - [`extract_pages`]: in-memory PDF text extraction
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use arxiv_fulltext::utils::{with_retry, RetryConfig, Retryable, TransientError};
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str("flaky")
//!     }
//! }
//!
//! impl Retryable for Flaky {
//!     fn transient(&self) -> Option<TransientError> {
//!         Some(TransientError::Network)
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = RetryConfig::default()
//!     .max_attempts(3)
//!     .initial_delay(Duration::from_millis(200));
//! let result: Result<u32, Flaky> = with_retry(config, || async { Ok(42) }).await;
//! assert_eq!(result.ok(), Some(42));
//! # }
//! ```

mod http;
pub(crate) mod pdf;
mod rate_gate;
mod retry;

pub use http::{HttpClient, DEFAULT_USER_AGENT};
pub use pdf::{extract_pages, extract_whole, looks_like_pdf, PageText, PdfExtractError, PDF_MAGIC};
pub use rate_gate::{RateGate, RatePermit};
pub use retry::{with_retry, RetryConfig, Retryable, TransientError};
