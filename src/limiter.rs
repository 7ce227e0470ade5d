//! Weighted admission control for a collection cycle.
//!
//! Directory inspections and per-process reads both draw from the same
//! budget, so the number of open file descriptors and in-flight blocking
//! tasks stays bounded no matter how large the cgroup hierarchy is.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::CollectError;

/// Weight of inspecting one directory during a cgroup walk.
pub const TRAVERSAL_WEIGHT: u32 = 2;

/// Counting semaphore with weighted acquire and cancellation.
///
/// Clones share the same budget. Cancelling closes the semaphore, which wakes
/// every pending `acquire` with an error instead of leaving it parked.
#[derive(Clone, Debug)]
pub struct WeightedLimiter {
    semaphore: Arc<Semaphore>,
    capacity: u32,
}

impl WeightedLimiter {
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    /// Limiter that never makes callers wait in practice.
    pub fn permissive() -> Self {
        Self::new(Semaphore::MAX_PERMITS.min(u32::MAX as usize) as u32)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Units currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits until `weight` units are free. The units return when the permit drops.
    ///
    /// Weights larger than the capacity are clamped so a tiny limiter serializes
    /// work instead of deadlocking.
    pub async fn acquire(&self, weight: u32) -> Result<OwnedSemaphorePermit, CollectError> {
        let effective = weight.clamp(1, self.capacity);
        Arc::clone(&self.semaphore)
            .acquire_many_owned(effective)
            .await
            .map_err(|_| {
                debug!("Limiter closed while waiting for {} units", weight);
                CollectError::Admission { weight }
            })
    }

    /// Fails every pending and future acquisition.
    pub fn cancel(&self) {
        self.semaphore.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.semaphore.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release_restores_capacity() {
        let limiter = WeightedLimiter::new(10);
        {
            let _permit = limiter.acquire(4).await.expect("acquire failed");
            assert_eq!(limiter.available(), 6);
        }
        assert_eq!(limiter.available(), 10);
    }

    #[tokio::test]
    async fn test_weight_is_clamped_to_capacity() {
        let limiter = WeightedLimiter::new(1);
        let permit = limiter.acquire(TRAVERSAL_WEIGHT).await;
        assert!(permit.is_ok());
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_acquire() {
        let limiter = WeightedLimiter::new(2);
        let held = limiter.acquire(2).await.expect("acquire failed");

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(1).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.cancel();

        let result = waiter.await.expect("waiter panicked");
        assert!(matches!(result, Err(CollectError::Admission { weight: 1 })));
        assert!(limiter.is_cancelled());
        drop(held);
    }

    #[tokio::test]
    async fn test_acquire_after_cancel_fails() {
        let limiter = WeightedLimiter::new(5);
        limiter.cancel();
        assert!(limiter.acquire(1).await.is_err());
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        assert_eq!(WeightedLimiter::new(0).capacity(), 1);
    }
}
