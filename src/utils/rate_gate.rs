//! Shared rate gate for outbound requests to a single upstream service.
//!
//! The gate combines two policies imposed by the arXiv API: consecutive
//! requests must start at least `interval` apart, and only one request may
//! be in flight at a time. Callers hold a [`RatePermit`] for the whole
//! request; dropping it (on success, error or cancellation) releases the gate.

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};

/// Single-owner gate shared by every fetch call site
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

/// Scoped access to the upstream service
#[derive(Debug)]
pub struct RatePermit<'a> {
    started_at: Instant,
    _guard: MutexGuard<'a, Option<Instant>>,
}

impl RatePermit<'_> {
    /// When this permit was granted
    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

impl RateGate {
    /// Create a gate enforcing `interval` between request starts
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: Mutex::new(None),
        }
    }

    /// Wait until the gate is free and the interval has elapsed, then take it.
    ///
    /// Requests issued too early wait; they are never rejected.
    pub async fn acquire(&self) -> RatePermit<'_> {
        let mut guard = self.last_start.lock().await;

        if let Some(last) = *guard {
            let ready_at = last + self.interval;
            if Instant::now() < ready_at {
                tracing::debug!(
                    "Rate gate closed, waiting {:?}",
                    ready_at - Instant::now()
                );
                sleep_until(ready_at).await;
            }
        }

        let started_at = Instant::now();
        *guard = Some(started_at);

        RatePermit {
            started_at,
            _guard: guard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let gate = RateGate::new(Duration::from_secs(3));
        let before = Instant::now();
        let permit = gate.acquire().await;
        assert_eq!(permit.started_at(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_between_rapid_requests() {
        let interval = Duration::from_secs(3);
        let gate = Arc::new(RateGate::new(interval));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                let permit = gate.acquire().await;
                permit.started_at()
            }));
        }

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort();

        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_request_in_flight() {
        let gate = Arc::new(RateGate::new(Duration::from_millis(10)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                // Request slower than the interval
                tokio::time::sleep(Duration::from_millis(50)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_reopens_after_idle() {
        let interval = Duration::from_secs(1);
        let gate = RateGate::new(interval);

        drop(gate.acquire().await);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let before = Instant::now();
        let permit = gate.acquire().await;
        assert_eq!(permit.started_at(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_released_when_holder_is_cancelled() {
        let gate = Arc::new(RateGate::new(Duration::from_millis(100)));

        let holder = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _permit = gate.acquire().await;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
        };
        tokio::task::yield_now().await;
        holder.abort();
        let _ = holder.await;

        let acquired = tokio::time::timeout(Duration::from_secs(1), gate.acquire()).await;
        assert!(acquired.is_ok());
    }
}
