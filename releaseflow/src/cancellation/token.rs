//! Shared interrupt flag for a release run.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

#[derive(Default)]
struct Shared {
    interrupted: AtomicBool,
    reason: Mutex<Option<String>>,
    wakeup: Notify,
}

/// Interrupts a run between stages and wakes long remote waits.
///
/// Clones observe the same interrupt. The first reason given wins.
#[derive(Clone, Default)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

impl CancellationToken {
    /// Creates a token that is not interrupted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupts the run.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.shared.reason.lock();
        if self.shared.interrupted.swap(true, Ordering::SeqCst) {
            return;
        }
        let reason = reason.into();
        info!(reason = %reason, "Run interrupted");
        *slot = Some(reason);
        drop(slot);
        self.shared.wakeup.notify_waiters();
    }

    /// Returns whether the run was interrupted.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.interrupted.load(Ordering::SeqCst)
    }

    /// Returns why the run was interrupted.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.shared.reason.lock().clone()
    }

    /// Resolves once the run is interrupted.
    pub async fn cancelled(&self) {
        loop {
            let wakeup = self.shared.wakeup.notified();
            if self.is_cancelled() {
                return;
            }
            wakeup.await;
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_token_is_not_interrupted() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        token.cancel("ctrl-c");
        token.cancel("second ctrl-c");

        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("ctrl-c"));
    }

    #[test]
    fn test_clones_observe_interrupt() {
        let token = CancellationToken::new();
        token.clone().cancel("shutdown");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_waiters_wake_on_interrupt() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("stop");

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_after_interrupt_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel("done");
        token.cancelled().await;
    }
}
