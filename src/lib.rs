//! Tradewire - real-time connectivity and credential lifecycle for a trading client
//!
//! - [`auth`] caches the long-lived credential and the short-lived stream token
//! - [`stream`] owns named streaming connections with backoff and lifecycle handling
//! - [`session`] wires both together on injectable adapters

pub mod adapters;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod session;
pub mod stream;
pub mod traits;

pub use session::Session;
