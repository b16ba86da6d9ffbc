//! Shutdown coordination.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Broadcasts a single shutdown notice to every long-running task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify subscribers. Triggering twice is harmless.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for a background task to finish, giving up after `deadline`.
///
/// Returns false when the task had to be abandoned.
pub async fn drain(name: &str, task: JoinHandle<()>, deadline: Duration) -> bool {
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(task = name, error = %e, "Background task failed during shutdown");
            false
        }
        Err(_) => {
            tracing::warn!(task = name, deadline = ?deadline, "Background task did not drain in time");
            false
        }
    }
}
