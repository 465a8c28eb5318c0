//! Send-side handle for one leg of a bridged call.

use std::fmt;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Non-blocking sender into a connection's writer task.
///
/// Audio is time-sensitive, so a send to a closed or saturated connection
/// is dropped with a warning instead of waiting.
pub struct ConnectionHandle<T> {
    label: &'static str,
    sender: mpsc::Sender<T>,
}

impl<T> ConnectionHandle<T> {
    pub fn new(label: &'static str, sender: mpsc::Sender<T>) -> Self {
        Self { label, sender }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue `item` for the writer. Returns false if it was dropped.
    pub fn try_send(&self, item: T) -> bool {
        match self.sender.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => {
                warn!(connection = self.label, "Connection not open, dropping frame");
                false
            }
            Err(TrySendError::Full(_)) => {
                warn!(connection = self.label, "Connection backlog full, dropping frame");
                false
            }
        }
    }
}

impl<T> Clone for ConnectionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label,
            sender: self.sender.clone(),
        }
    }
}

impl<T> fmt::Debug for ConnectionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("label", &self.label)
            .field("open", &self.is_open())
            .finish()
    }
}
