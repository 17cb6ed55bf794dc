//! Cooperative cancellation for in-flight syntheses.

use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{Result, TtsError};

/// A clonable cancellation token.
///
/// Cancellation is observed at every suspension point of a synthesis:
/// `cancelled()` resolves when (or immediately after) `cancel()` is called,
/// so callers race it against I/O with `tokio::select!`. Loops that do not
/// suspend poll `check()` instead.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Err(`Cancelled`) once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TtsError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation is requested. Never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // The sender lives inside self, so the channel cannot close while
        // this future is polled; park forever rather than spuriously resolve.
        std::future::pending::<()>().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_resolves_waiters() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let resolved = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(resolved);
        assert!(matches!(token.check(), Err(TtsError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_after_cancel() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already-cancelled token must resolve at once");
    }

    #[tokio::test]
    async fn test_uncancelled_token_keeps_waiting() {
        let token = CancelToken::new();
        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(timed_out.is_err());
    }
}
