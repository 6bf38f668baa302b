use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Best-effort progress channel for connected status clients.
///
/// Messages sent while nobody is subscribed are dropped, and slow
/// subscribers lose the oldest messages instead of applying backpressure.
#[derive(Debug, Clone)]
pub struct StatusNotifier {
    tx: broadcast::Sender<String>,
}

impl StatusNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn notify(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(status = %message, "status update");
        let _ = self.tx.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_without_subscribers_is_silent() {
        let notifier = StatusNotifier::default();
        notifier.notify("nobody listening");
        assert_eq!(notifier.subscribers(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let notifier = StatusNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.notify("Performing login...");
        notifier.notify("Navigating to reports...".to_string());

        assert_eq!(rx.recv().await.unwrap(), "Performing login...");
        assert_eq!(rx.recv().await.unwrap(), "Navigating to reports...");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_oldest() {
        let notifier = StatusNotifier::new(2);
        let mut rx = notifier.subscribe();

        for i in 0..5 {
            notifier.notify(format!("update {i}"));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(rx.recv().await.unwrap(), "update 3");
    }
}
