//! # barqing providers
//!
//! Clients for the remote chat services barqing polls.
//! Currently one: the Barq GraphQL API.

pub mod barq;

pub use barq::BarqClient;
