//! Credential records held by the token caches.
//!
//! Both records answer one question: may this token be handed to a caller
//! right now? A token is usable only while `now < expires_at - margin`, so a
//! caller never receives a token that could expire mid-request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Convert a std duration to a chrono duration, saturating on overflow.
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

fn usable_until(expires_at: DateTime<Utc>, now: DateTime<Utc>, margin: Duration) -> bool {
    expires_at
        .checked_sub_signed(to_chrono(margin))
        .is_some_and(|deadline| now < deadline)
}

/// The long-lived credential obtained from the identity provider.
///
/// Replaced wholesale on every refresh; persisted as JSON so a restart does
/// not force re-authentication while the token is still good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Opaque bearer token.
    pub token: String,
    /// When the token was obtained.
    pub issued_at: DateTime<Utc>,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Record a token obtained now with the given lifetime.
    pub fn issue(token: impl Into<String>, lifetime: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            token: token.into(),
            issued_at,
            expires_at: issued_at
                .checked_add_signed(to_chrono(lifetime))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Check whether the record may be handed out at `now`.
    ///
    /// Records whose expiry does not follow their issue time are never usable.
    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.issued_at < self.expires_at && usable_until(self.expires_at, now, margin)
    }

    /// Check whether the record may be handed out right now.
    pub fn is_usable(&self, margin: Duration) -> bool {
        self.is_usable_at(Utc::now(), margin)
    }
}

/// The short-lived streaming credential. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl StreamToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        usable_until(self.expires_at, now, margin)
    }

    pub fn is_usable(&self, margin: Duration) -> bool {
        self.is_usable_at(Utc::now(), margin)
    }
}
