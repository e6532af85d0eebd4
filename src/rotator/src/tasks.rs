//! Tracked background work with cooperative cancellation.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Spawns compression and eviction work so shutdown can cancel it and wait
/// for it.
#[derive(Debug, Clone, Default)]
pub struct TaskPool {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl TaskPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when the pool shuts down. Tasks check it between
    /// units of work.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    pub fn spawn_blocking<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.tracker.spawn_blocking(task);
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait for every task spawned so far, leaving the pool usable.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel outstanding work and wait up to `grace` for it to stop.
    ///
    /// Returns false if tasks were still running when the grace period ran
    /// out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.token.cancel();
        self.tracker.close();
        debug!(pending = self.tracker.len(), "Waiting for background tasks");
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    pending = self.tracker.len(),
                    grace_ms = grace.as_millis() as u64,
                    "Background tasks still running after shutdown grace period"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_drain_waits_and_reopens() {
        let pool = TaskPool::new();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let done = done.clone();
            pool.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 4);
        assert!(pool.is_empty());

        let done_blocking = done.clone();
        pool.spawn_blocking(move || {
            done_blocking.fetch_add(1, Ordering::SeqCst);
        });
        pool.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_waiting_tasks() {
        let pool = TaskPool::new();
        let token = pool.token();
        pool.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
            }
        });

        assert!(pool.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_shutdown_times_out() {
        let pool = TaskPool::new();
        pool.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert!(!pool.shutdown(Duration::from_millis(20)).await);
    }
}
