//! # barqing scheduler
//!
//! Everything that moves: one refresher per logged-in user, the shared
//! delivery queue, the dispatcher draining it, and the session registry
//! that reacts to user commands.
//!
//! ## Architecture
//! ```text
//! Telegram command ──► SessionRegistry ──spawns──► Refresher (one per user)
//!                            │                        │ every tick: poll Barq,
//!                            │ flush every 600s       │ diff against ChatState
//!                            ▼                        ▼
//!                       SessionStore            DeliveryQueue (FIFO)
//!                                                     │
//!                                                     ▼
//!                                          Dispatcher ──► Telegram sendMessage
//! ```

pub mod bot;
pub mod dispatch;
pub mod persistence;
pub mod queue;
pub mod refresher;
pub mod registry;
pub mod retry;

#[cfg(test)]
mod test_support;

pub use bot::Bot;
pub use dispatch::{DispatchStats, Dispatcher};
pub use persistence::SessionDb;
pub use queue::{DeliveryQueue, DeliveryReceiver, delivery_queue};
pub use refresher::{Refresher, SharedSession, TickOutcome};
pub use registry::SessionRegistry;
pub use retry::RetryPolicy;
