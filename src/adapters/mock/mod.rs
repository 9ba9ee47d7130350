//! Mock implementations for testing.
//!
//! These enable unit and integration testing without network or filesystem
//! access.
//!
//! - [`InMemoryStore`] - key-value storage with injectable failures
//! - [`MockExchange`] - stream-token exchange with queued responses
//! - [`MockTransport`] - streaming sockets driven by the test

pub mod exchange;
pub mod store;
pub mod transport;

pub use exchange::MockExchange;
pub use store::InMemoryStore;
pub use transport::{MockSocket, MockTransport};
