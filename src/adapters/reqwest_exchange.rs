//! Reqwest-based stream-token exchange adapter.
//!
//! POST {base_url}/api/v1/stream/token with the long-lived credential as a
//! bearer token. A successful response is `{ "status": "success", "token": ... }`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ExchangeError;
use crate::traits::{ExchangedToken, TokenExchange};

/// Path of the stream-token exchange endpoint.
pub const STREAM_TOKEN_PATH: &str = "/api/v1/stream/token";

/// Body of the exchange endpoint's response.
#[derive(Debug, Deserialize)]
struct StreamTokenResponse {
    status: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

/// [`TokenExchange`] over HTTP using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTokenExchange {
    /// Base URL for the backend API
    pub base_url: String,
    /// Reusable HTTP client
    client: Client,
}

impl ReqwestTokenExchange {
    /// Create an exchange client for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create an exchange client with a custom reqwest::Client.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, STREAM_TOKEN_PATH)
    }
}

/// Validate a response body and extract the token.
fn parse_token_response(body: &str) -> Result<ExchangedToken, ExchangeError> {
    let data: StreamTokenResponse = serde_json::from_str(body)
        .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;

    if data.status != "success" {
        let detail = data.message.unwrap_or_else(|| format!("status '{}'", data.status));
        return Err(ExchangeError::InvalidResponse(detail));
    }

    match data.token {
        Some(token) if !token.is_empty() => Ok(ExchangedToken {
            token,
            expires_in: data.expires_in,
        }),
        _ => Err(ExchangeError::InvalidResponse(
            "response did not contain a token".to_string(),
        )),
    }
}

#[async_trait]
impl TokenExchange for ReqwestTokenExchange {
    async fn exchange(&self, credential: &str) -> Result<ExchangedToken, ExchangeError> {
        let url = self.endpoint();
        debug!("Requesting stream token from {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", credential))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Stream token exchange rate limited");
            return Err(ExchangeError::RateLimited);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ExchangeError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        parse_token_response(&body)
    }
}
