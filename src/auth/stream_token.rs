//! Short-lived stream-token cache.
//!
//! Exchanges the long-lived credential for a streaming credential and keeps
//! the result in memory while it is usable. Stream tokens live for seconds,
//! so they are never persisted.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::credentials::{to_chrono, StreamToken};
use super::jwt::jwt_expiry;
use super::single_flight::{pending, InFlight};
use super::token_cache::CredentialCache;
use crate::config::StreamTokenConfig;
use crate::error::ExchangeError;
use crate::traits::{ExchangedToken, TokenExchange};

type ExchangeOutcome = Result<String, ExchangeError>;

/// Cache for the short-lived streaming credential.
#[derive(Clone)]
pub struct StreamTokenCache {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    credentials: CredentialCache,
    exchange: Arc<dyn TokenExchange>,
    config: StreamTokenConfig,
    state: Mutex<StreamState>,
}

#[derive(Default)]
struct StreamState {
    token: Option<StreamToken>,
    in_flight: Option<(u64, InFlight<ExchangeOutcome>)>,
    epoch: u64,
    next_flight_id: u64,
}

impl StreamTokenCache {
    pub fn new(
        credentials: CredentialCache,
        exchange: Arc<dyn TokenExchange>,
        config: StreamTokenConfig,
    ) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                credentials,
                exchange,
                config,
                state: Mutex::new(StreamState::default()),
            }),
        }
    }

    /// The long-lived credential cache this cache exchanges from.
    pub fn credentials(&self) -> &CredentialCache {
        &self.inner.credentials
    }

    /// Return a usable stream token, exchanging a fresh one if needed.
    ///
    /// `fetch_credential` is handed to the long-lived cache and only runs if
    /// that cache must refresh too. Overlapping callers share one exchange.
    ///
    /// # Errors
    ///
    /// - [`ExchangeError::MissingCredential`] if no long-lived credential is available
    /// - [`ExchangeError::RateLimited`] if the exchange endpoint answered 429
    /// - other [`ExchangeError`] variants for server, network or parse failures
    pub async fn get_token<F, Fut>(&self, fetch_credential: F) -> ExchangeOutcome
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let (leader, flight) = {
            let mut state = self.inner.state.lock();
            if let Some(token) = &state.token {
                if token.is_usable(self.inner.config.safety_margin) {
                    return Ok(token.token.clone());
                }
            }

            match &state.in_flight {
                Some((_, flight)) => {
                    debug!("Joining in-flight stream token exchange");
                    (None, flight.clone())
                }
                None => {
                    let id = state.next_flight_id;
                    state.next_flight_id += 1;
                    let (tx, flight) = pending(Err(ExchangeError::Network(
                        "stream token exchange abandoned".to_string(),
                    )));
                    state.in_flight = Some((id, flight.clone()));
                    (Some((tx, id, state.epoch)), flight)
                }
            }
        };

        if let Some((tx, id, epoch)) = leader {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let outcome = AssertUnwindSafe(inner.exchange_once(fetch_credential))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(ExchangeError::Network(
                            "stream token exchange panicked".to_string(),
                        ))
                    });
                let _ = tx.send(inner.settle(id, epoch, outcome));
            });
        }

        flight.await
    }

    /// Return the cached stream token if it is usable, without exchanging.
    pub fn peek_token(&self) -> Option<String> {
        let state = self.inner.state.lock();
        state
            .token
            .as_ref()
            .filter(|token| token.is_usable(self.inner.config.safety_margin))
            .map(|token| token.token.clone())
    }

    /// Drop the cached stream token.
    ///
    /// An exchange in flight still answers its current awaiters but is not
    /// cached.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.token = None;
        state.in_flight = None;
        state.epoch += 1;
    }
}

impl StreamInner {
    async fn exchange_once<F, Fut>(&self, fetch_credential: F) -> Result<StreamToken, ExchangeError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let credential = self
            .credentials
            .get_token(fetch_credential)
            .await
            .ok_or(ExchangeError::MissingCredential)?;

        let exchanged = self.exchange.exchange(&credential).await?;
        let expires_at = self.resolve_expiry(&exchanged);
        Ok(StreamToken::new(exchanged.token, expires_at))
    }

    /// Declared lifetime first, then the token's own `exp` claim, then the
    /// configured default.
    fn resolve_expiry(&self, exchanged: &ExchangedToken) -> DateTime<Utc> {
        let now = Utc::now();
        let after = |lifetime: chrono::Duration| {
            now.checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        };

        if let Some(seconds) = exchanged.expires_in {
            return after(to_chrono(std::time::Duration::from_secs(seconds)));
        }
        jwt_expiry(&exchanged.token).unwrap_or_else(|| after(to_chrono(self.config.default_lifetime)))
    }

    fn settle(
        &self,
        id: u64,
        epoch: u64,
        outcome: Result<StreamToken, ExchangeError>,
    ) -> ExchangeOutcome {
        let mut state = self.state.lock();
        if state.in_flight.as_ref().is_some_and(|(flight_id, _)| *flight_id == id) {
            state.in_flight = None;
        }

        match outcome {
            Ok(token) => {
                if state.epoch == epoch {
                    info!("Stream token refreshed (expires {})", token.expires_at);
                    state.token = Some(token.clone());
                } else {
                    debug!("Stream token cache cleared during exchange, result not cached");
                }
                Ok(token.token)
            }
            Err(e) => {
                warn!("Stream token exchange failed [{}]: {}", e.error_code(), e);
                Err(e)
            }
        }
    }
}
