//! # barqing channels
//! Messaging channel implementations.

pub mod telegram;

pub use telegram::TelegramChannel;
