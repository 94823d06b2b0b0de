//! Run-level cancellation signal.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable cancellation flag shared by a run and its group workers.
///
/// Cancelling stops new issues from being scheduled; an issue already in its
/// apply/validate/rollback sequence runs to completion.
#[derive(Debug, Clone)]
pub struct RunCancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl RunCancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in `self`, so `wait_for` cannot observe a closed channel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for RunCancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_share_state() {
        let cancel = RunCancellation::new();
        let worker = cancel.clone();
        assert!(!worker.is_cancelled());
        cancel.cancel();
        assert!(worker.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let cancel = RunCancellation::new();
        let waiter = cancel.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
