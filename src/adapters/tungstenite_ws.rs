//! Tungstenite-based streaming transport adapter.
//!
//! Each opened socket gets its own pump task that owns the WebSocket stream,
//! forwards inbound frames as [`TransportEvent`]s and writes outbound
//! [`TransportCommand`]s. Dropping the command sender closes the socket.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::traits::{CloseInfo, StreamTransport, TransportCommand, TransportEvent, TransportHandle};

/// Default time allowed for the opening handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`StreamTransport`] using tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteTransport {
    connect_timeout: Duration,
}

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the time allowed for the opening handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for TungsteniteTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamTransport for TungsteniteTransport {
    async fn open(&self, url: &str) -> Result<TransportHandle, TransportError> {
        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                TransportError::ConnectionFailed(format!(
                    "timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!("Opened stream socket to {}", redact_query(url));

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(ws_stream, command_rx, event_tx));

        Ok(TransportHandle {
            commands: command_tx,
            events: event_rx,
        })
    }
}

/// Strip the query string so tokens never reach the logs.
fn redact_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Pump frames between the socket and the handle's channels until either
/// side goes away.
async fn run_socket<S>(
    ws_stream: WebSocketStream<S>,
    mut commands: mpsc::UnboundedReceiver<TransportCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                let event = match frame {
                    Some(Ok(Message::Text(text))) => TransportEvent::Message(Bytes::from(text)),
                    Some(Ok(Message::Binary(data))) => TransportEvent::Message(Bytes::from(data)),
                    Some(Ok(Message::Ping(data))) => {
                        debug!("Received ping, sending pong");
                        let _ = ws_sink.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        // A received close frame means the handshake completed.
                        let info = match frame {
                            Some(frame) => CloseInfo::with_code(u16::from(frame.code), frame.reason.to_string(), true),
                            None => CloseInfo { code: None, reason: String::new(), clean: true },
                        };
                        debug!("Received close frame: {:?}", info);
                        let _ = events.send(TransportEvent::Closed(info));
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Stream socket error: {}", e);
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        let _ = events.send(TransportEvent::Closed(CloseInfo::abnormal(e.to_string())));
                        break;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Closed(CloseInfo::abnormal("stream ended")));
                        break;
                    }
                };

                if events.send(event).is_err() {
                    debug!("Event listener detached, closing socket");
                    let _ = ws_sink.close().await;
                    break;
                }
            }
            command = commands.recv() => {
                match command {
                    Some(TransportCommand::Send(text)) => {
                        if let Err(e) = ws_sink.send(Message::Text(text)).await {
                            warn!("Failed to send frame: {}", e);
                            let _ = events.send(TransportEvent::Error(e.to_string()));
                        }
                    }
                    Some(TransportCommand::Close) | None => {
                        debug!("Closing stream socket");
                        let _ = ws_sink.close().await;
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_query() {
        assert_eq!(
            redact_query("wss://stream.example.com/prices?token=secret"),
            "wss://stream.example.com/prices"
        );
        assert_eq!(redact_query("ws://127.0.0.1:9000/ws"), "ws://127.0.0.1:9000/ws");
    }

    #[tokio::test]
    async fn test_open_failure() {
        // Nothing listens on this port.
        let transport = TungsteniteTransport::new().with_connect_timeout(Duration::from_secs(2));
        let result = transport.open("ws://127.0.0.1:59999/stream").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
