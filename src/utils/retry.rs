//! Retry utilities with exponential backoff for resilient upstream and store calls.

use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum total time to spend sleeping between attempts
    pub max_total_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of attempts
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the initial delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Backoff before retry number `attempt` (1-based attempt that just failed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .powf(attempt.saturating_sub(1) as f64);
        let nanos = (self.initial_delay.as_nanos() as f64 * factor)
            .min(self.max_delay.as_nanos() as f64);
        Duration::from_nanos(nanos as u64)
    }
}

/// Transient errors that should trigger a retry
#[derive(Debug, Clone, PartialEq)]
pub enum TransientError {
    /// Network connectivity issues
    Network,
    /// Request timeout
    Timeout,
    /// Server error (5xx)
    ServerError,
    /// Too many requests (429), with optional Retry-After seconds
    TooManyRequests(Option<u64>),
    /// Backing service temporarily unreachable
    Unavailable,
}

impl TransientError {
    /// Classify a reqwest error
    pub fn from_reqwest_error(err: &reqwest::Error) -> Option<Self> {
        if err.is_timeout() {
            return Some(TransientError::Timeout);
        }
        if err.is_connect() || err.is_request() || err.is_body() {
            return Some(TransientError::Network);
        }
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Some(TransientError::TooManyRequests(None));
            }
            if status.is_server_error() {
                return Some(TransientError::ServerError);
            }
        }
        None
    }

    /// Minimum delay requested by the remote side, if any
    pub fn requested_delay(&self) -> Option<Duration> {
        match self {
            TransientError::TooManyRequests(Some(seconds)) => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }
}

/// Errors that can tell whether retrying might help
pub trait Retryable {
    /// `Some` when the failure is transient
    fn transient(&self) -> Option<TransientError>;
}

/// Execute an async operation with retry logic
///
/// Permanent errors are returned immediately. Transient errors are retried
/// with exponential backoff until `max_attempts` or `max_total_time` is hit,
/// after which the last error is returned.
pub async fn with_retry<T, E, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    let mut slept = Duration::ZERO;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Recovered after {} transient failure(s)", attempt - 1);
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let Some(transient) = error.transient() else {
            return Err(error);
        };

        let backoff = config.delay_for(attempt);
        let backoff = match transient.requested_delay() {
            Some(requested) => backoff.max(requested),
            None => backoff,
        };
        slept += backoff;

        if attempt >= config.max_attempts || slept > config.max_total_time {
            tracing::warn!(attempt, backoff_total = ?slept, "Giving up: {}", error);
            return Err(error);
        }

        tracing::debug!(attempt, ?transient, ?backoff, "Transient failure, backing off");
        sleep(backoff).await;
    }
}
