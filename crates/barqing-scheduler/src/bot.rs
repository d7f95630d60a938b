//! Bot: ties the command channel, registry, dispatcher and flush task together.

use std::sync::Arc;
use std::time::Duration;

use barqing_core::error::Result;
use barqing_core::traits::Channel;
use barqing_core::types::{Command, IncomingMessage};
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatch::Dispatcher;
use crate::queue::DeliveryReceiver;
use crate::registry::SessionRegistry;

pub struct Bot {
    channel: Arc<dyn Channel>,
    registry: Arc<SessionRegistry>,
    deliveries: DeliveryReceiver,
    flush_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Bot {
    pub fn new(
        channel: Arc<dyn Channel>,
        registry: Arc<SessionRegistry>,
        deliveries: DeliveryReceiver,
        flush_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            channel,
            registry,
            deliveries,
            flush_interval,
            shutdown,
        }
    }

    /// Serve commands from `incoming` until shutdown or until the stream ends.
    /// On the way out every refresher is stopped and sessions are flushed once more.
    pub async fn run<S>(self, mut incoming: S) -> Result<()>
    where
        S: Stream<Item = IncomingMessage> + Unpin,
    {
        let Bot {
            channel,
            registry,
            deliveries,
            flush_interval,
            mut shutdown,
        } = self;

        if let Err(e) = channel.register_commands(&Command::specs()).await {
            tracing::warn!("⚠️ Could not register commands: {e}");
        }

        let dispatcher = tokio::spawn(
            Dispatcher::new(deliveries, channel.clone()).run(shutdown.clone()),
        );
        let flusher = tokio::spawn(flush_loop(registry.clone(), flush_interval, shutdown.clone()));
        registry.start_all().await;
        tracing::info!("🚀 barqing serving {} sessions", registry.len().await);

        loop {
            if *shutdown.borrow() {
                break;
            }
            let msg = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                msg = incoming.next() => msg,
            };
            match msg {
                Some(msg) => handle_message(channel.as_ref(), &registry, msg).await,
                None => {
                    tracing::info!("Command stream ended");
                    break;
                }
            }
        }

        registry.shutdown().await;
        flusher.abort();
        dispatcher.abort();
        let flushed = registry.flush().await?;
        tracing::info!("💾 Final flush: {flushed} sessions");
        Ok(())
    }
}

/// Parse one chat message and reply when the registry has something to say.
pub async fn handle_message(channel: &dyn Channel, registry: &SessionRegistry, msg: IncomingMessage) {
    let Some(text) = msg.text.as_deref() else {
        return;
    };
    let Some(command) = Command::parse(text) else {
        return;
    };
    tracing::debug!("📥 {:?} from {}", command_name(&command), msg.destination);

    if let Some(reply) = registry.handle(msg.destination, command).await
        && let Err(e) = channel.send_text(msg.destination, &reply).await {
            tracing::warn!("⚠️ Reply to {} failed: {e}", msg.destination);
        }
}

// keeps credentials out of the logs
fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Start => "start",
        Command::Stop => "stop",
        Command::Login(_) => "login",
    }
}

/// Flush every session to the store on a fixed interval until shutdown.
pub async fn flush_loop(registry: Arc<SessionRegistry>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    tracing::info!("💾 Session flush every {}s", every.as_secs());

    let mut interval = tokio::time::interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }
        match registry.flush().await {
            Ok(n) => tracing::debug!("💾 Flushed {n} sessions"),
            Err(e) => tracing::warn!("⚠️ Session flush failed: {e}"),
        }
    }
}
