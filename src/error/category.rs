//! Error category classification.
//!
//! Categories let callers decide how to react to a failure (back off, ask the
//! user to sign in again, surface a banner) without matching on every variant.

use std::fmt;

/// High-level categorization of errors for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection, DNS or timeout problems. Generally transient.
    Network,

    /// Missing or rejected credentials.
    Auth,

    /// Backend errors (HTTP 5xx, malformed responses).
    Server,

    /// The backend asked us to slow down.
    RateLimit,

    /// Local storage or OS errors.
    System,

    /// A payload could not be understood.
    Protocol,
}

impl ErrorCategory {
    /// Returns true if errors in this category are generally transient
    /// and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::Server | ErrorCategory::RateLimit
        )
    }

    /// Returns a short label for the category suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Server => "server",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::System => "system",
            ErrorCategory::Protocol => "protocol",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
