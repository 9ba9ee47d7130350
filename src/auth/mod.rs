//! Credential lifecycle for Tradewire.
//!
//! This module provides:
//! - The long-lived credential cache, persisted across restarts
//! - The stream-token cache that exchanges it for streaming credentials
//! - Credential records and JWT expiry inspection

pub mod credentials;
pub mod jwt;
mod single_flight;
pub mod stream_token;
pub mod token_cache;

pub use credentials::{CredentialRecord, StreamToken};
pub use jwt::jwt_expiry;
pub use stream_token::StreamTokenCache;
pub use token_cache::CredentialCache;
