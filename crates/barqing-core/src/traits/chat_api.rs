//! Remote chat API trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Conversation;

/// The two queries a refresher needs from the remote chat service.
/// Every call authenticates with the caller's bearer `credential`.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// The caller's own profile id.
    async fn self_id(&self, credential: &str) -> Result<String>;

    /// All conversations, each with its latest message.
    async fn conversations(&self, credential: &str) -> Result<Vec<Conversation>>;
}
