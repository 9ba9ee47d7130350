//! Named streaming connections with reconnect and lifecycle handling.

pub mod backoff;
pub mod connection;
pub mod decoder;
pub mod lifecycle;
pub mod registry;

pub use backoff::backoff_delay;
pub use connection::{
    ChannelHandler, ConnectionConfig, ConnectionEvent, ConnectionHandler, ConnectionInfo,
    ConnectionStatus, ConnectionToken, TokenSource,
};
pub use decoder::{DecoderRegistry, JsonDecoder, PayloadDecoder, TextDecoder, JSON_DECODER, TEXT_DECODER};
pub use lifecycle::{AppLifecycle, AppState, LifecycleSource};
pub use registry::ConnectionRegistry;
