//! Cancellation signal shared by the discovery sources

use tokio::sync::watch;

/// Receiving side of a scan's cancel flag
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is set. Pends forever if the sender is gone.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_fires() {
        let (tx, rx) = watch::channel(false);
        let mut signal = CancelSignal::new(rx);
        assert!(!signal.is_cancelled());

        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("cancel should resolve");
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_sender_does_not_cancel() {
        let (tx, rx) = watch::channel(false);
        let mut signal = CancelSignal::new(rx);
        drop(tx);

        let waited = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_never() {
        let mut signal = CancelSignal::never();
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
        assert!(!signal.is_cancelled());
    }
}
