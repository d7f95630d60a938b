//! Messaging channel trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CommandSpec, Destination};

/// Outbound side of the messaging endpoint users talk to.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name for logging.
    fn name(&self) -> &str;

    /// Advertise the bot's commands to users.
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<()>;

    /// Send a plain-text message.
    async fn send_text(&self, destination: Destination, text: &str) -> Result<()>;
}
