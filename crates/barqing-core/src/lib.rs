//! # barqing core
//! Shared data model, collaborator traits, configuration and errors.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::BarqingConfig;
pub use error::{BarqingError, Result};
pub use types::{ChatState, Command, IncomingMessage, Notification, NotificationKind, UserSession};
