//! Concurrency limiter
//!
//! Caps the number of backend requests in flight. Slots are handed out in
//! FIFO order by the underlying semaphore and returned when the permit is
//! dropped, whether the request succeeded, failed or panicked.

use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Bounds simultaneous backend calls to a fixed ceiling
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held request slot; released on drop
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// Creates a limiter admitting at most `capacity` concurrent requests
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot
    ///
    /// Fails only after [`close`](Self::close), so work queued behind a
    /// cancelled batch never reaches the backend.
    pub async fn acquire(&self) -> Result<LimiterPermit, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(LimiterPermit { _permit: permit })
    }

    /// Refuses all pending and future acquisitions
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_are_returned_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.acquire().await.unwrap();
        let b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight(), 2);

        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        drop(b);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_is_never_exceeded() {
        let limiter = ConcurrencyLimiter::new(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..20u64 {
            let limiter = limiter.clone();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10 + i % 7)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_holder_releases_slot() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.clone();
        let result = tokio::spawn(async move {
            let _permit = held.acquire().await.unwrap();
            panic!("backend call blew up");
        })
        .await;

        assert!(result.is_err());
        assert_eq!(limiter.in_flight(), 0);
        assert!(limiter.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_rejects_waiters() {
        let limiter = ConcurrencyLimiter::new(1);
        let _held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.is_err() })
        };
        tokio::task::yield_now().await;
        limiter.close();

        assert!(waiter.await.unwrap());
        assert!(limiter.is_closed());
    }
}
