//! Bulkhead: a per-target concurrency cap.
//!
//! Calls beyond the cap are rejected immediately rather than queued, so a
//! degraded downstream cannot absorb unbounded concurrent load from this
//! caller.

use std::sync::Arc;

use pars_core::RpcError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Configuration for [`Bulkhead`].
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Maximum in-flight calls toward the target.
    pub max_concurrent: u32,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self { max_concurrent: 64 }
    }
}

/// Semaphore-backed in-flight counter. The permit is held for the duration
/// of the call and released on any outcome.
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
}

impl Bulkhead {
    #[must_use]
    pub fn new(config: &BulkheadConfig) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(config.max_concurrent as usize)) }
    }

    /// Claims an in-flight slot without waiting.
    ///
    /// # Errors
    ///
    /// [`RpcError::BulkheadRejected`] with a one-second retry hint when the
    /// cap is reached.
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, RpcError> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| RpcError::BulkheadRejected(1))
    }

    /// Remaining free slots, for observability.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_beyond_capacity_and_releases_on_drop() {
        let bulkhead = Bulkhead::new(&BulkheadConfig { max_concurrent: 2 });

        let p1 = bulkhead.try_acquire().unwrap();
        let _p2 = bulkhead.try_acquire().unwrap();
        assert_eq!(bulkhead.available(), 0);

        match bulkhead.try_acquire() {
            Err(RpcError::BulkheadRejected(retry_after)) => assert_eq!(retry_after, 1),
            other => panic!("expected BulkheadRejected, got {other:?}"),
        }

        drop(p1);
        assert!(bulkhead.try_acquire().is_ok());
    }
}
