//! Stream-token exchange trait abstraction.

use async_trait::async_trait;

use crate::error::ExchangeError;

/// A streaming credential as returned by the exchange endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangedToken {
    /// Opaque streaming token.
    pub token: String,
    /// Lifetime declared by the server in the response body, if any.
    pub expires_in: Option<u64>,
}

impl ExchangedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_in: None,
        }
    }

    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }
}

/// Trades a long-lived credential for a short-lived streaming credential.
///
/// Implementations perform exactly one request per call; retrying is the
/// caller's responsibility.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Present `credential` to the exchange endpoint.
    async fn exchange(&self, credential: &str) -> Result<ExchangedToken, ExchangeError>;
}
