//! Trait abstractions for dependency injection and testability.
//!
//! Every external collaborator of the core sits behind one of these traits:
//!
//! - [`KeyValueStore`] - persistent storage for the long-lived credential
//! - [`TokenExchange`] - the stream-token exchange endpoint
//! - [`StreamTransport`] - bidirectional streaming sockets

pub mod exchange;
pub mod storage;
pub mod transport;

pub use exchange::{ExchangedToken, TokenExchange};
pub use storage::KeyValueStore;
pub use transport::{
    CloseInfo, StreamTransport, TransportCommand, TransportEvent, TransportHandle, CLOSE_NORMAL,
};
