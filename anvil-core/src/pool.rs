//! Bounded worker pool
//!
//! A semaphore caps how many builds (or probes) run at once. Work is spawned
//! onto the tokio runtime immediately, so the caller never blocks; each task
//! waits for a slot before doing anything.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::debug;

/// Semaphore-bounded task spawner
#[derive(Clone)]
pub struct WorkerPool {
    name: Arc<str>,
    size: usize,
    semaphore: Arc<Semaphore>,
}

/// A held pool slot; released on drop
#[derive(Debug)]
pub struct WorkerSlot {
    _permit: Option<OwnedSemaphorePermit>,
}

impl WorkerPool {
    /// Creates a pool with `size` slots (at least one)
    pub fn new(name: &str, size: usize) -> Self {
        let size = size.max(1);
        Self {
            name: Arc::from(name),
            size,
            semaphore: Arc::new(Semaphore::new(size)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of currently free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot
    pub async fn acquire(&self) -> WorkerSlot {
        // The semaphore is never closed, so acquisition only fails in theory.
        let permit = self.semaphore.clone().acquire_owned().await.ok();
        debug!(
            "{} pool slot acquired ({} free)",
            self.name,
            self.semaphore.available_permits()
        );
        WorkerSlot { _permit: permit }
    }

    /// Spawns a task that runs once a slot is free
    pub fn spawn<F, T>(&self, task: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.clone();
        tokio::spawn(async move {
            let _slot = pool.acquire().await;
            task.await
            // Slot is released when dropped
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = WorkerPool::new("test", 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_zero_size_is_clamped() {
        assert_eq!(WorkerPool::new("test", 0).size(), 1);
    }
}
