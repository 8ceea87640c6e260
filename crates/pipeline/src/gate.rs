//! Counting admission gate bounding in-flight jobs.
//!
//! Wraps a [`tokio::sync::Semaphore`]: `acquire` suspends until a slot is
//! free and hands back an owned permit that returns the slot on drop, so
//! every exit path — success, error, timeout, panic unwind — releases.
//! No fairness beyond tokio's; starvation under sustained load is
//! acceptable, deadlock is not.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use shotforge_core::CoreError;

/// Shared admission gate for one batch.
#[derive(Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
}

/// A held slot. Dropping it releases the slot.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `max_concurrency` concurrent
    /// holders. Zero is fatal misuse and is rejected.
    pub fn new(max_concurrency: usize) -> Result<Self, CoreError> {
        if max_concurrency == 0 {
            return Err(CoreError::Validation(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        })
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> GatePermit {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            // The semaphore is never closed.
            .expect("gate semaphore closed");
        GatePermit { _permit: permit }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// The configured cap.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn zero_concurrency_rejected() {
        assert!(ConcurrencyGate::new(0).is_err());
    }

    #[tokio::test]
    async fn permit_returns_slot_on_drop() {
        let gate = ConcurrencyGate::new(1).unwrap();
        assert_eq!(gate.available(), 1);

        let permit = gate.acquire().await;
        assert_eq!(gate.available(), 0);

        drop(permit);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn never_admits_more_than_cap() {
        let gate = ConcurrencyGate::new(2).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let gate = gate.clone();
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn slot_released_when_holder_panics() {
        let gate = ConcurrencyGate::new(1).unwrap();
        let gate_clone = gate.clone();

        let handle = tokio::spawn(async move {
            let _permit = gate_clone.acquire().await;
            panic!("holder died");
        });
        assert!(handle.await.is_err());

        // The unwind dropped the permit.
        assert_eq!(gate.available(), 1);
    }
}
