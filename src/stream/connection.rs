//! Connection configuration, status and callbacks.

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::ExchangeError;
use crate::traits::CloseInfo;

/// Observable state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Disconnected after a reported error. Reconnection may still follow.
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supplies a streaming credential on demand.
pub type TokenSource =
    Arc<dyn Fn() -> BoxFuture<'static, Result<String, ExchangeError>> + Send + Sync>;

/// Streaming credential for a connection, passed as the `token` query
/// parameter.
#[derive(Clone)]
pub enum ConnectionToken {
    /// The same token on every attempt.
    Fixed(String),
    /// Asked for a token before every connect attempt, so reconnects never
    /// present an expired one.
    Source(TokenSource),
}

impl ConnectionToken {
    pub async fn resolve(&self) -> Result<String, ExchangeError> {
        match self {
            ConnectionToken::Fixed(token) => Ok(token.clone()),
            ConnectionToken::Source(source) => source().await,
        }
    }
}

impl fmt::Debug for ConnectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionToken::Fixed(_) => f.write_str("Fixed(<redacted>)"),
            ConnectionToken::Source(_) => f.write_str("Source(..)"),
        }
    }
}

/// How to create one named connection.
///
/// Unset reconnect settings fall back to the registry's
/// [`ReconnectPolicy`](crate::config::ReconnectPolicy).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Unique key in the registry
    pub id: String,
    /// Path appended to the stream base URL
    pub endpoint: String,
    /// Sent once after every successful open
    pub subscription: Option<String>,
    /// Decoder tag; JSON when unset
    pub decoder: Option<String>,
    pub max_reconnect_attempts: Option<u32>,
    pub base_backoff: Option<Duration>,
    pub token: Option<ConnectionToken>,
}

impl ConnectionConfig {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            subscription: None,
            decoder: None,
            max_reconnect_attempts: None,
            base_backoff: None,
            token: None,
        }
    }

    pub fn with_subscription(mut self, message: impl Into<String>) -> Self {
        self.subscription = Some(message.into());
        self
    }

    pub fn with_decoder(mut self, tag: impl Into<String>) -> Self {
        self.decoder = Some(tag.into());
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    pub fn with_base_backoff(mut self, delay: Duration) -> Self {
        self.base_backoff = Some(delay);
        self
    }

    /// Present the same streaming credential on every attempt.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(ConnectionToken::Fixed(token.into()));
        self
    }

    /// Ask `source` for a streaming credential before every attempt.
    pub fn with_token_source(mut self, source: TokenSource) -> Self {
        self.token = Some(ConnectionToken::Source(source));
        self
    }

    /// Full socket URL under `base_url`, carrying `token` if given.
    pub fn url(&self, base_url: &str, token: Option<&str>) -> String {
        let url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        );
        match token {
            Some(token) => with_token_query(url, token),
            None => url,
        }
    }
}

pub(crate) fn with_token_query(mut url: String, token: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    url.push(separator);
    url.push_str("token=");
    url.push_str(&urlencoding::encode(token));
    url
}

/// Callbacks for one connection.
///
/// Invoked from the connection's driver task, never while the registry's
/// state lock is held, so handlers may call back into the registry. A
/// handler must not close a second connection whose own handler may close
/// this one at the same moment. Within one connection
/// `on_open` always precedes any `on_message`, and `on_close` precedes any
/// reconnect scheduled for the same failure.
pub trait ConnectionHandler: Send + Sync {
    fn on_open(&self, _id: &str) {}

    fn on_message(&self, id: &str, message: Value);

    fn on_close(&self, _id: &str, _info: &CloseInfo) {}

    fn on_error(&self, _id: &str, _error: &str) {}
}

/// A callback invocation, as delivered by [`ChannelHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened { id: String },
    Message { id: String, message: Value },
    Closed { id: String, info: CloseInfo },
    Error { id: String, error: String },
}

impl ConnectionEvent {
    pub fn id(&self) -> &str {
        match self {
            ConnectionEvent::Opened { id }
            | ConnectionEvent::Message { id, .. }
            | ConnectionEvent::Closed { id, .. }
            | ConnectionEvent::Error { id, .. } => id,
        }
    }
}

/// [`ConnectionHandler`] that forwards every callback into a channel.
#[derive(Debug)]
pub struct ChannelHandler {
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events }), rx)
    }

    fn emit(&self, event: ConnectionEvent) {
        // Ignore send errors (receiver dropped)
        let _ = self.events.send(event);
    }
}

impl ConnectionHandler for ChannelHandler {
    fn on_open(&self, id: &str) {
        self.emit(ConnectionEvent::Opened { id: id.to_string() });
    }

    fn on_message(&self, id: &str, message: Value) {
        self.emit(ConnectionEvent::Message {
            id: id.to_string(),
            message,
        });
    }

    fn on_close(&self, id: &str, info: &CloseInfo) {
        self.emit(ConnectionEvent::Closed {
            id: id.to_string(),
            info: info.clone(),
        });
    }

    fn on_error(&self, id: &str, error: &str) {
        self.emit(ConnectionEvent::Error {
            id: id.to_string(),
            error: error.to_string(),
        });
    }
}

/// Point-in-time view of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: String,
    pub endpoint: String,
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    /// Delay of the armed reconnect timer, if one is pending
    pub pending_reconnect: Option<Duration>,
}
