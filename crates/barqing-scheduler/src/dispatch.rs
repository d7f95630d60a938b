//! Notification dispatch: drains the delivery queue into the channel.
//! At-most-once: a failed send is logged and dropped, never requeued.

use std::sync::Arc;

use barqing_core::error::Result;
use barqing_core::traits::Channel;
use barqing_core::types::Notification;
use tokio::sync::watch;

use crate::queue::DeliveryReceiver;

/// Counters returned when the dispatcher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Single consumer of the delivery queue.
pub struct Dispatcher {
    rx: DeliveryReceiver,
    channel: Arc<dyn Channel>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(rx: DeliveryReceiver, channel: Arc<dyn Channel>) -> Self {
        Self {
            rx,
            channel,
            stats: DispatchStats::default(),
        }
    }

    /// Deliver until shutdown. Whatever is still queued at that point is abandoned.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> DispatchStats {
        tracing::info!("📨 Dispatcher started ({})", self.channel.name());

        loop {
            if *shutdown.borrow() {
                break;
            }
            let notification = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                n = self.rx.get() => n,
            };
            let Some(notification) = notification else {
                tracing::info!("Delivery queue closed");
                break;
            };

            match self.dispatch(&notification).await {
                Ok(()) => self.stats.delivered += 1,
                Err(e) => {
                    self.stats.failed += 1;
                    tracing::warn!(
                        "⚠️ Delivery to {} failed, dropped: {e}",
                        notification.destination
                    );
                }
            }
        }

        if !self.rx.is_empty() {
            tracing::info!("Abandoning {} queued notifications", self.rx.len());
        }
        tracing::info!(
            "📨 Dispatcher stopped ({} delivered, {} failed)",
            self.stats.delivered,
            self.stats.failed
        );
        self.stats
    }

    /// Send one notification to its destination.
    pub async fn dispatch(&self, notification: &Notification) -> Result<()> {
        self.channel
            .send_text(notification.destination, &notification.render())
            .await?;
        tracing::debug!("✅ Notification sent to {}", notification.destination);
        Ok(())
    }
}
