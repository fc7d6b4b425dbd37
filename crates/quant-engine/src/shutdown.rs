//! Stop signal for the collection loops.
//!
//! The binary owns one [`ShutdownController`]; [`crate::Engine::run`] derives a
//! child token per loop from it. A loop checks its token before every cache
//! write and publish, and abandons a sleep or an in-flight iteration through
//! [`run_until_shutdown`].

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct ShutdownController {
    root: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`ShutdownController::new`], plus a task that triggers on Ctrl+C.
    /// Needs a running Tokio runtime.
    pub fn with_ctrl_c() -> Self {
        let controller = Self::new();
        let on_signal = controller.clone();

        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Ctrl+C listener unavailable, stop the bridge another way");
                return;
            }
            on_signal.trigger("ctrl-c");
        });

        controller
    }

    /// The root token. Cancelling it stops every loop.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Cancel all loops. Idempotent.
    pub fn trigger(&self, reason: &str) {
        if !self.root.is_cancelled() {
            info!(reason, "Stopping collection loops...");
        }
        self.root.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Resolves once [`ShutdownController::trigger`] has been called.
    pub async fn triggered(&self) {
        self.root.cancelled().await
    }
}

/// Drive `work` unless `token` is cancelled first; `None` means it was.
pub async fn run_until_shutdown<F, T>(token: &CancellationToken, work: F) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        output = work => Some(output),
        () = token.cancelled() => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_loop_tokens_follow_the_root() {
        let controller = ShutdownController::new();
        let root = controller.token();
        let macro_loop = root.child_token();
        let primary_loop = root.child_token();

        macro_loop.cancel();
        assert!(!primary_loop.is_cancelled());
        assert!(!controller.is_triggered());

        controller.trigger("test");
        controller.trigger("test again");
        assert!(primary_loop.is_cancelled());
        controller.triggered().await;
    }

    #[tokio::test]
    async fn test_sleep_abandoned_on_trigger() {
        let controller = ShutdownController::new();
        let token = controller.token();
        assert_eq!(run_until_shutdown(&token, async { "cycle" }).await, Some("cycle"));

        let remote = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.trigger("test");
        });

        let started = std::time::Instant::now();
        let slept = run_until_shutdown(&token, tokio::time::sleep(Duration::from_secs(30))).await;
        assert!(slept.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
