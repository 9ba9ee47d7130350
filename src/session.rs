//! Session wiring.
//!
//! A [`Session`] owns one instance of each manager, explicitly constructed and
//! shared by handle. There are no globals: tests build sessions from mocks and
//! the binary builds one from [`ClientConfig`].

use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::adapters::{FileKeyValueStore, ReqwestTokenExchange, TungsteniteTransport};
use crate::auth::{CredentialCache, StreamTokenCache};
use crate::config::ClientConfig;
use crate::error::ExchangeError;
use crate::stream::{ConnectionRegistry, DecoderRegistry, TokenSource};
use crate::traits::{KeyValueStore, StreamTransport, TokenExchange};

/// The credential caches and connection registry of one signed-in user.
#[derive(Clone)]
pub struct Session {
    credentials: CredentialCache,
    stream_tokens: StreamTokenCache,
    registry: ConnectionRegistry,
}

impl Session {
    pub fn new(
        config: &ClientConfig,
        store: Arc<dyn KeyValueStore>,
        exchange: Arc<dyn TokenExchange>,
        transport: Arc<dyn StreamTransport>,
    ) -> Self {
        Self::with_decoders(config, store, exchange, transport, DecoderRegistry::default())
    }

    pub fn with_decoders(
        config: &ClientConfig,
        store: Arc<dyn KeyValueStore>,
        exchange: Arc<dyn TokenExchange>,
        transport: Arc<dyn StreamTransport>,
        decoders: DecoderRegistry,
    ) -> Self {
        let credentials = CredentialCache::new(store, config.credentials.clone());
        let stream_tokens =
            StreamTokenCache::new(credentials.clone(), exchange, config.stream_token.clone());
        let registry = ConnectionRegistry::with_decoders(
            transport,
            config.stream_base_url.clone(),
            config.reconnect,
            decoders,
        );
        Self {
            credentials,
            stream_tokens,
            registry,
        }
    }

    /// Build a session on the production adapters.
    ///
    /// Returns `None` if no data directory can be determined.
    pub fn from_config(config: &ClientConfig) -> Option<Self> {
        let store = FileKeyValueStore::in_dir(config.resolved_data_dir()?);
        Some(Self::new(
            config,
            Arc::new(store),
            Arc::new(ReqwestTokenExchange::new(config.api_base_url.clone())),
            Arc::new(TungsteniteTransport::new()),
        ))
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    pub fn stream_tokens(&self) -> &StreamTokenCache {
        &self.stream_tokens
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Obtain a streaming credential, signing in through `identity_provider`
    /// if the long-lived credential must be refreshed.
    pub async fn stream_token<F, Fut>(&self, identity_provider: F) -> Result<String, ExchangeError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.stream_tokens.get_token(identity_provider).await
    }

    /// A token source for [`ConnectionConfig::with_token_source`] backed by
    /// this session's stream-token cache.
    ///
    /// Each connect attempt gets a usable stream token, exchanging a new one
    /// when the cached token has expired.
    ///
    /// [`ConnectionConfig::with_token_source`]: crate::stream::ConnectionConfig::with_token_source
    pub fn token_source<F, Fut>(&self, identity_provider: F) -> TokenSource
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let stream_tokens = self.stream_tokens.clone();
        let identity_provider = Arc::new(identity_provider);
        Arc::new(move || {
            let stream_tokens = stream_tokens.clone();
            let identity_provider = identity_provider.clone();
            async move {
                stream_tokens
                    .get_token(move || (*identity_provider)())
                    .await
            }
            .boxed()
        })
    }

    /// Forget every credential and close every connection.
    ///
    /// The registry stays usable for the next sign-in.
    pub async fn logout(&self) {
        for connection in self.registry.get_all_connections() {
            self.registry.close_connection(&connection.id);
        }
        self.stream_tokens.clear();
        self.credentials.clear_cache().await;
        info!("Logged out");
    }

    /// Tear down at process exit.
    pub fn shutdown(&self) {
        self.registry.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{InMemoryStore, MockExchange, MockTransport};
    use crate::config::CREDENTIAL_STORAGE_KEY;
    use crate::stream::{ChannelHandler, ConnectionConfig, ConnectionStatus};
    use crate::traits::ExchangedToken;
    use std::time::Duration;

    fn mock_session() -> (Session, InMemoryStore, MockExchange, MockTransport) {
        let store = InMemoryStore::new();
        let exchange = MockExchange::new();
        let transport = MockTransport::new();
        let session = Session::new(
            &ClientConfig::default().with_stream_base_url("ws://mock"),
            Arc::new(store.clone()),
            Arc::new(exchange.clone()),
            Arc::new(transport.clone()),
        );
        (session, store, exchange, transport)
    }

    #[tokio::test]
    async fn test_stream_token_signs_in() {
        let (session, store, exchange, _) = mock_session();
        let token = session
            .stream_token(|| async { Some("id-token".to_string()) })
            .await
            .unwrap();

        assert_eq!(token, "stream-token-1");
        assert_eq!(exchange.presented_credentials(), vec!["id-token"]);
        assert!(store.entry(CREDENTIAL_STORAGE_KEY).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_clears_everything() {
        let (session, store, _, transport) = mock_session();
        session
            .stream_token(|| async { Some("id-token".to_string()) })
            .await
            .unwrap();
        let (handler, _events) = ChannelHandler::new();
        session
            .registry()
            .create_connection(ConnectionConfig::new("prices", "v1/prices"), handler);
        tokio::time::sleep(Duration::from_millis(1)).await;

        session.logout().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(session.credentials().peek_token(), None);
        assert_eq!(session.stream_tokens().peek_token(), None);
        assert_eq!(store.entry(CREDENTIAL_STORAGE_KEY), None);
        assert_eq!(
            session.registry().get_connection_status("prices"),
            ConnectionStatus::Disconnected
        );
        assert!(transport.last_socket("prices").unwrap().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_exchanges_new_stream_token() {
        let (session, _, exchange, transport) = mock_session();
        // One second of life is inside the margin, so nothing is reused.
        exchange.push_response(Ok(ExchangedToken::new("first").with_expires_in(1)));
        exchange.push_response(Ok(ExchangedToken::new("second").with_expires_in(1)));
        let source = session.token_source(|| async { Some("id-token".to_string()) });
        let (handler, _events) = ChannelHandler::new();

        session.registry().create_connection(
            ConnectionConfig::new("prices", "v1/prices").with_token_source(source),
            handler,
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
        transport.last_socket("prices").unwrap().drop_connection();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(
            transport.opened_urls(),
            vec![
                "ws://mock/v1/prices?token=first".to_string(),
                "ws://mock/v1/prices?token=second".to_string(),
            ]
        );
        assert_eq!(exchange.presented_credentials(), vec!["id-token", "id-token"]);
        assert_eq!(
            session.registry().get_connection_status("prices"),
            ConnectionStatus::Connected
        );
    }

    #[test]
    fn test_from_config_uses_data_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = ClientConfig::default().with_data_dir(temp_dir.path());
        assert!(Session::from_config(&config).is_some());
    }
}
