//! Concrete implementations of trait abstractions.
//!
//! - [`FileKeyValueStore`] - JSON file storage for the long-lived credential
//! - [`ReqwestTokenExchange`] - stream-token exchange over HTTP
//! - [`TungsteniteTransport`] - WebSocket streaming transport
//!
//! The [`mock`] submodule provides test doubles for all of them.

pub mod file_store;
pub mod mock;
pub mod reqwest_exchange;
pub mod tungstenite_ws;

pub use file_store::FileKeyValueStore;
pub use mock::{InMemoryStore, MockExchange, MockTransport};
pub use reqwest_exchange::{ReqwestTokenExchange, STREAM_TOKEN_PATH};
pub use tungstenite_ws::TungsteniteTransport;
