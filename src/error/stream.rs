//! Streaming transport and payload decoding errors.

use thiserror::Error;

use super::ErrorCategory;

/// Transport-level failure of a streaming socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A frame could not be written.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The socket is already closed.
    #[error("Connection closed")]
    Closed,
}

impl TransportError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Network
    }
}

/// A received payload could not be decoded.
///
/// Decode failures are logged and the message dropped; the connection stays
/// open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No decoder is registered under the connection's decoder tag.
    #[error("No decoder registered for tag '{0}'")]
    UnknownDecoder(String),

    /// The decoder rejected the payload.
    #[error("Malformed {decoder} payload: {message}")]
    Malformed { decoder: String, message: String },
}

impl DecodeError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Protocol
    }
}
