//! Graceful shutdown coordination.
//!
//! The coordinator's token stops the listener and refuses new upgrades;
//! its tracker follows every session task so shutdown can wait for the
//! connections to drain. Hooks run last, each retried a bounded number of
//! times.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::{DeferredError, try_times};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Attempts per shutdown hook.
pub const HOOK_ATTEMPTS: u32 = 3;

/// Cancels the server and tracks its session tasks.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Fresh coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the shutdown token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker for session tasks.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Signal shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown was signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop tracking new tasks and wait for the tracked ones.
    ///
    /// Returns `false` if some were still running after `timeout`.
    pub async fn wait_for_tasks(&self, timeout: Duration) -> bool {
        let _ = self.tracker.close();
        info!(task_count = self.tracker.len(), timeout_ms = timeout.as_millis(), "waiting for sessions to end");
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            true
        } else {
            warn!(remaining = self.tracker.len(), "shutdown timed out with sessions still running");
            false
        }
    }
}

/// Cleanup run once the connections are gone.
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// One attempt.
    async fn run(&self) -> Result<(), String>;
}

/// A hook that failed every attempt.
#[derive(Debug)]
pub struct HookFailure {
    /// [`ShutdownHook::name`].
    pub name: String,
    /// Final outcome.
    pub error: DeferredError,
}

/// Aggregated hook failures.
#[derive(Debug, Error)]
#[error("{} shutdown hook(s) failed: {}", .failures.len(), failed_names(.failures))]
pub struct ShutdownError {
    /// One entry per failed hook, in run order.
    pub failures: Vec<HookFailure>,
}

fn failed_names(failures: &[HookFailure]) -> String {
    failures
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run every hook in order, each up to [`HOOK_ATTEMPTS`] times. A failing
/// hook does not stop the others.
pub async fn run_shutdown_hooks(hooks: &[Arc<dyn ShutdownHook>]) -> Result<(), ShutdownError> {
    let mut failures = Vec::new();
    for hook in hooks {
        let hook: &dyn ShutdownHook = hook.as_ref();
        match try_times(move || hook.run(), HOOK_ATTEMPTS).await {
            Ok(()) => info!(hook = hook.name(), "shutdown hook done"),
            Err(error) => {
                warn!(hook = hook.name(), error = %error, "shutdown hook failed");
                failures.push(HookFailure {
                    name: hook.name().to_owned(),
                    error,
                });
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ShutdownError { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        name: &'static str,
        fail_first: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(name: &'static str, fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail_first,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ShutdownHook for Flaky {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self) -> Result<(), String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                Err(format!("attempt {call} failed"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn shutdown_is_idempotent() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn waits_for_tracked_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let _ = coord.tracker().spawn(async move { token.cancelled().await });

        coord.shutdown();
        assert!(coord.wait_for_tasks(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out() {
        let coord = ShutdownCoordinator::new();
        let _ = coord
            .tracker()
            .spawn(tokio::time::sleep(Duration::from_secs(300)));
        assert!(!coord.wait_for_tasks(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn hooks_retry_then_succeed() {
        let hook = Flaky::new("flush", 2);
        let hooks = [Arc::clone(&hook) as Arc<dyn ShutdownHook>];
        run_shutdown_hooks(&hooks).await.unwrap();
        assert_eq!(hook.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failures_are_aggregated() {
        let broken = Flaky::new("broken", u32::MAX);
        let fine = Flaky::new("fine", 0);
        let hooks = [
            Arc::clone(&broken) as Arc<dyn ShutdownHook>,
            Arc::clone(&fine) as Arc<dyn ShutdownHook>,
        ];

        let err = run_shutdown_hooks(&hooks).await.unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].name, "broken");
        assert_matches!(err.failures[0].error, DeferredError::Exhausted { attempts: 3, .. });
        assert_eq!(broken.calls.load(Ordering::SeqCst), HOOK_ATTEMPTS);
        assert_eq!(fine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.to_string(), "1 shutdown hook(s) failed: broken");
    }
}
