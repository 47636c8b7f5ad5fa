use serde_json::Value;
use tokio::sync::mpsc;

/// Full value of a watched path at delivery time (`None` when empty).
pub type Snapshot = Option<Value>;

/// Handle on a live store subscription.
///
/// Dropping or cancelling the handle unregisters the watcher.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Snapshot>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a delivery channel together with the backend's unregister hook.
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Snapshot>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Wait for the next delivery. Returns `None` once the backend has gone away.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    /// Wait for the next delivery and skip any that queued up behind it.
    ///
    /// Subtree deliveries are level-triggered, so only the newest one matters.
    pub async fn latest(&mut self) -> Option<Snapshot> {
        let mut snapshot = self.receiver.recv().await?;
        while let Ok(newer) = self.receiver.try_recv() {
            snapshot = newer;
        }
        Some(snapshot)
    }

    /// Stop receiving deliveries.
    pub fn cancel(mut self) {
        self.unregister();
    }

    fn unregister(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unregister();
    }
}
