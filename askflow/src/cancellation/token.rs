//! Cooperative cancellation for pipeline runs.

use std::fmt;
use std::sync::OnceLock;
use tokio::sync::Notify;
use tracing::debug;

/// Signals a running pipeline to stop.
///
/// Shared through [`crate::context::RunOptions`]; the runner races every
/// stage against [`CancellationToken::cancelled`]. Only the first reason
/// given is kept.
#[derive(Default)]
pub struct CancellationToken {
    reason: OnceLock<String>,
    notify: Notify,
}

impl CancellationToken {
    /// Creates a token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token. Later calls are ignored.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self.reason.set(reason.into()).is_ok() {
            debug!(reason = ?self.reason.get(), "Cancellation requested");
            self.notify.notify_waiters();
        }
    }

    /// Returns true once the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Returns the reason given to the first [`CancellationToken::cancel`].
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.get().cloned()
    }

    /// Completes once the token has fired.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register interest first so a cancel between the check and the await still wakes us.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken").field("reason", &self.reason.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);

        token.cancel("user pressed stop");
        token.cancel("shutdown");

        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("user pressed stop"));
    }

    #[tokio::test]
    async fn test_waiters_are_woken() {
        let token = Arc::new(CancellationToken::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let token = token.clone();
                tokio::spawn(async move { token.cancelled().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("stop");

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_already_cancelled_returns_at_once() {
        let token = CancellationToken::new();
        token.cancel("done");
        tokio::time::timeout(Duration::from_millis(100), token.cancelled()).await.unwrap();
    }
}
