//! Streaming transport trait abstraction.
//!
//! A transport opens one bidirectional socket and hands back a pair of
//! channels: commands flow towards the socket, events flow out of it. The
//! connection registry is the only consumer; no caller ever touches a
//! [`TransportHandle`] directly.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Normal closure status code.
pub const CLOSE_NORMAL: u16 = 1000;

/// Why a socket closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close status code, if the peer sent one.
    pub code: Option<u16>,
    /// Close reason text.
    pub reason: String,
    /// Whether the close handshake completed normally.
    pub clean: bool,
}

impl CloseInfo {
    /// A completed close handshake with status 1000.
    pub fn normal() -> Self {
        Self {
            code: Some(CLOSE_NORMAL),
            reason: String::new(),
            clean: true,
        }
    }

    /// A close carrying `code`.
    ///
    /// `clean` records whether the close handshake completed, independent of
    /// the code: a server closing with 1008 or 4001 closed cleanly.
    pub fn with_code(code: u16, reason: impl Into<String>, clean: bool) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
            clean,
        }
    }

    /// The socket went away without a close handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
            clean: false,
        }
    }
}

/// Event emitted by an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An inbound text or binary frame.
    Message(Bytes),
    /// A socket-level error. Usually followed by `Closed`.
    Error(String),
    /// The socket closed. No further events follow.
    Closed(CloseInfo),
}

/// Instruction for an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Send a text frame.
    Send(String),
    /// Start a normal close handshake.
    Close,
}

/// Channels bound to one open socket.
///
/// Dropping `commands` closes the socket; dropping `events` detaches every
/// listener from it.
#[derive(Debug)]
pub struct TransportHandle {
    pub commands: mpsc::UnboundedSender<TransportCommand>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens streaming sockets.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a socket to `url`. Resolves once the socket is open.
    async fn open(&self, url: &str) -> Result<TransportHandle, TransportError>;
}
