//! Graceful shutdown coordination via `CancellationToken` and `TaskTracker`.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Default time to wait for tracked tasks before giving up.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates shutdown across the gateway's long-lived tasks.
///
/// Every per-connection worker and the broadcast fan-out worker is spawned
/// through the tracker so `stop` can join them all.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Fresh token and an open tracker.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// The gateway-wide token. Sessions derive child tokens from it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker handle for work that `stop` must join.
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Spawn a task that shutdown will wait for.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Cancel the token. Calling it again has no effect.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Cancel this coordinator's token when `parent` is cancelled.
    ///
    /// The watcher task ends as soon as either token fires.
    pub fn follow(&self, parent: &CancellationToken) {
        let parent = parent.clone();
        let token = self.token.clone();
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = parent.cancelled() => token.cancel(),
                () = token.cancelled() => {}
            }
        });
    }

    /// `true` once the token is cancelled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of tracked tasks still running.
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel, then wait up to `timeout` for every tracked task.
    ///
    /// Returns `false` if the timeout expired first.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.tracker.close();
        info!(
            task_count = self.tracker.len(),
            timeout_secs = timeout.as_secs(),
            "draining tracked tasks"
        );

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "shutdown timed out after {timeout:?}, some tasks may still be running"
            );
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert_eq!(coord.task_count(), 0);
    }

    #[test]
    fn shutdown_is_idempotent_and_reaches_every_token() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancel_reaches_followers() {
        let parent = CancellationToken::new();
        let coord = ShutdownCoordinator::new();
        coord.follow(&parent);
        let token = coord.token();

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn own_cancel_leaves_parent_alone() {
        let parent = CancellationToken::new();
        let coord = ShutdownCoordinator::new();
        coord.follow(&parent);
        coord.shutdown();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_tracked_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        let _handle = coord.spawn(async move {
            token.cancelled().await;
            let _ = done_tx.send(());
        });

        assert!(coord.graceful_shutdown(None).await);
        assert!(done_rx.await.is_ok());
        assert_eq!(coord.task_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();

        // Ignores cancellation.
        let _handle = coord.spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        let drained = coord
            .graceful_shutdown(Some(Duration::from_millis(100)))
            .await;
        assert!(!drained);
        assert!(coord.is_shutting_down());
    }
}
