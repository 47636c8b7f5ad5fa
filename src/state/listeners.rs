use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::debug;

/// Holds the task pumping one logical feed (wait-list, lobby list, game state,
/// comms). Installing a new task aborts the previous one, which drops its
/// subscription.
#[derive(Debug)]
pub struct ListenerSlot {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerSlot {
    /// Empty slot; `name` shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    /// Replace the running listener with `handle`.
    pub fn install(&self, handle: JoinHandle<()>) {
        let Ok(mut guard) = self.handle.lock() else {
            handle.abort();
            return;
        };
        if let Some(previous) = guard.replace(handle) {
            debug!(slot = self.name, "replacing listener");
            previous.abort();
        }
    }

    /// Stop the running listener, if any.
    pub fn cancel(&self) {
        let Ok(mut guard) = self.handle.lock() else {
            return;
        };
        if let Some(handle) = guard.take() {
            debug!(slot = self.name, "listener cancelled");
            handle.abort();
        }
    }

    /// Whether a listener is installed and still running.
    pub fn is_active(&self) -> bool {
        self.handle
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for ListenerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn installing_aborts_previous_listener() {
        let slot = ListenerSlot::new("test");
        let (alive_tx, alive_rx) = oneshot::channel::<()>();
        slot.install(tokio::spawn(async move {
            let _alive = alive_tx;
            tokio::time::sleep(Duration::from_secs(60)).await;
        }));
        assert!(slot.is_active());

        slot.install(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }));
        // The aborted task drops its sender without sending.
        let dropped = tokio::time::timeout(Duration::from_secs(5), alive_rx).await;
        assert!(matches!(dropped, Ok(Err(_))));

        slot.cancel();
        assert!(!slot.is_active());
    }
}
