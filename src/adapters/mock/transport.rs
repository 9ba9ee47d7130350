//! Mock streaming transport for testing.
//!
//! Every successful `open` produces a [`MockSocket`] the test can drive:
//! inject inbound frames, errors and closes, and inspect what the registry
//! sent. Connections can be refused to exercise the reconnect path.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::traits::{CloseInfo, StreamTransport, TransportCommand, TransportEvent, TransportHandle};

/// [`StreamTransport`] test double.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

#[derive(Debug, Default)]
struct MockTransportState {
    refuse: bool,
    attempts: Vec<(String, Instant)>,
    sockets: Vec<MockSocket>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `open` fail (or succeed again).
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Total number of `open` calls, successful or not.
    pub fn open_count(&self) -> usize {
        self.state.lock().attempts.len()
    }

    /// Number of `open` calls whose URL contains `fragment`.
    pub fn open_count_for(&self, fragment: &str) -> usize {
        self.state
            .lock()
            .attempts
            .iter()
            .filter(|(url, _)| url.contains(fragment))
            .count()
    }

    /// When each `open` call happened, in order.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.lock().attempts.iter().map(|(_, at)| *at).collect()
    }

    /// URLs passed to `open`, in order.
    pub fn opened_urls(&self) -> Vec<String> {
        self.state.lock().attempts.iter().map(|(url, _)| url.clone()).collect()
    }

    /// The most recent successfully opened socket whose URL contains `fragment`.
    pub fn last_socket(&self, fragment: &str) -> Option<MockSocket> {
        self.state
            .lock()
            .sockets
            .iter()
            .rev()
            .find(|socket| socket.url.contains(fragment))
            .cloned()
    }

    /// Every successfully opened socket, in order.
    pub fn sockets(&self) -> Vec<MockSocket> {
        self.state.lock().sockets.clone()
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn open(&self, url: &str) -> Result<TransportHandle, TransportError> {
        let mut state = self.state.lock();
        state.attempts.push((url.to_string(), Instant::now()));
        if state.refuse {
            return Err(TransportError::ConnectionFailed(
                "Mock connection refused".to_string(),
            ));
        }

        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let socket = MockSocket {
            url: url.to_string(),
            events: event_tx,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };

        let sent = socket.sent.clone();
        let closed = socket.closed.clone();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    TransportCommand::Send(text) => sent.lock().push(text),
                    TransportCommand::Close => break,
                }
            }
            closed.store(true, Ordering::SeqCst);
        });

        state.sockets.push(socket);
        Ok(TransportHandle {
            commands: command_tx,
            events: event_rx,
        })
    }
}

/// One socket opened through [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockSocket {
    /// URL the socket was opened with
    pub url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockSocket {
    /// Deliver an inbound text frame.
    pub fn push_text(&self, text: &str) {
        self.push_bytes(Bytes::copy_from_slice(text.as_bytes()));
    }

    /// Deliver an inbound binary frame.
    pub fn push_bytes(&self, payload: Bytes) {
        // Ignore send errors (listener detached)
        let _ = self.events.send(TransportEvent::Message(payload));
    }

    /// Deliver a socket error.
    pub fn push_error(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Error(message.to_string()));
    }

    /// Close from the server side.
    pub fn close(&self, info: CloseInfo) {
        let _ = self.events.send(TransportEvent::Closed(info));
    }

    /// Drop the connection without a close handshake.
    pub fn drop_connection(&self) {
        self.push_error("connection reset");
        self.close(CloseInfo::abnormal("connection reset"));
    }

    /// Text frames the client sent on this socket.
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Whether the client closed or abandoned this socket.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether the client still listens for events on this socket.
    pub fn is_attached(&self) -> bool {
        !self.events.is_closed()
    }
}
