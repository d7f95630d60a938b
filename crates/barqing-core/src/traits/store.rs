//! Durable session storage trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::UserSession;

/// Key-value storage of user sessions. `put` may stage writes;
/// they are only guaranteed durable after `sync`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<(String, UserSession)>>;

    async fn put(&self, key: &str, session: &UserSession) -> Result<()>;

    async fn sync(&self) -> Result<()>;
}
