//! Stream-token exchange errors.
//!
//! Raised by the stream-token cache when the long-lived credential cannot be
//! traded for a streaming credential. These are values, never panics: the
//! caller decides whether to back off, retry or ask the user to sign in.

use thiserror::Error;

use super::ErrorCategory;

/// Failure of a stream-token exchange.
///
/// `Clone` because one exchange outcome is shared by every caller that joined
/// the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// The identity provider returned no long-lived credential.
    #[error("No long-lived credential available")]
    MissingCredential,

    /// The exchange endpoint answered 429 Too Many Requests.
    #[error("Stream token exchange rate limited")]
    RateLimited,

    /// The exchange endpoint answered with a non-success status.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The response body was not a successful token document.
    #[error("Invalid exchange response: {0}")]
    InvalidResponse(String),

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),
}

impl ExchangeError {
    /// True for the distinguished "too many requests" case.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ExchangeError::RateLimited)
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ExchangeError::MissingCredential => ErrorCategory::Auth,
            ExchangeError::RateLimited => ErrorCategory::RateLimit,
            ExchangeError::Server { status: 401, .. } | ExchangeError::Server { status: 403, .. } => {
                ErrorCategory::Auth
            }
            ExchangeError::Server { .. } | ExchangeError::InvalidResponse(_) => {
                ErrorCategory::Server
            }
            ExchangeError::Network(_) => ErrorCategory::Network,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            ExchangeError::MissingCredential => {
                "You are not signed in. Please sign in to see live data.".to_string()
            }
            ExchangeError::RateLimited => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            ExchangeError::Server { status, .. } => match *status {
                401 => "Your session has expired. Please sign in again.".to_string(),
                403 => "You don't have access to live data.".to_string(),
                _ => "Live data is temporarily unavailable.".to_string(),
            },
            ExchangeError::InvalidResponse(_) => {
                "Live data is temporarily unavailable.".to_string()
            }
            ExchangeError::Network(_) => {
                "Unable to reach the server. Check your connection.".to_string()
            }
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            ExchangeError::MissingCredential => "E_XCHG_NO_CRED",
            ExchangeError::RateLimited => "E_XCHG_RATE_LIMIT",
            ExchangeError::Server { .. } => "E_XCHG_SERVER",
            ExchangeError::InvalidResponse(_) => "E_XCHG_INVALID",
            ExchangeError::Network(_) => "E_XCHG_NETWORK",
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        ExchangeError::Network(e.to_string())
    }
}
