//! Delivery queue: FIFO hand-off from every refresher to the single dispatcher.
//!
//! Unbounded: producers never wait. One pending notification is a few dozen
//! bytes, so this only becomes a problem with far more users than a single
//! bot serves.

use barqing_core::error::{BarqingError, Result};
use barqing_core::types::Notification;
use tokio::sync::mpsc;

/// Producer side. Cheap to clone, one per refresher.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<Notification>,
}

/// Consumer side, owned by the dispatcher.
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::UnboundedReceiver<Notification>,
}

/// Create a connected queue pair.
pub fn delivery_queue() -> (DeliveryQueue, DeliveryReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DeliveryQueue { tx }, DeliveryReceiver { rx })
}

impl DeliveryQueue {
    /// Enqueue without waiting. Only fails once the receiver is gone.
    pub fn put(&self, notification: Notification) -> Result<()> {
        self.tx.send(notification).map_err(|_| BarqingError::QueueClosed)
    }
}

impl DeliveryReceiver {
    /// Wait for the next notification. `None` once every producer is dropped.
    pub async fn get(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
