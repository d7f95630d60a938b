//! Collaborator seams: the remote chat API, the messaging channel, and session storage.

pub mod channel;
pub mod chat_api;
pub mod store;

pub use channel::Channel;
pub use chat_api::ChatApi;
pub use store::SessionStore;
