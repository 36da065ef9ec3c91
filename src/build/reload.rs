//! Live-reload notifications for the development server.

use tokio::sync::broadcast;
use tracing::debug;

/// Broadcasts "reload" notifications to connected browsers.
///
/// Cloning yields another sender for the same channel.
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: broadcast::Sender<()>,
}

impl Default for LiveReload {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }
}

impl LiveReload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify every subscriber. Does nothing when nobody is listening.
    pub fn notify(&self) {
        match self.tx.send(()) {
            Ok(receivers) => debug!(receivers, "live reload sent"),
            Err(_) => debug!("live reload skipped, no clients"),
        }
    }
}
