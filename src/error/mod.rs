//! Error types for the tradewire core.
//!
//! Nothing in this crate throws across an asynchronous boundary. Failures are
//! funneled into typed return values or connection callbacks:
//!
//! | Failure | Surfaced as |
//! |---------|-------------|
//! | Identity provider returned nothing | `None` from `CredentialCache::get_token` |
//! | Stream-token exchange rejected | [`ExchangeError`] |
//! | Socket error | `ConnectionHandler::on_error` |
//! | Undecodable payload | [`DecodeError`], logged and dropped |
//! | Reconnect attempts exhausted | one terminal `on_error` |
//! | Persistence failure | [`StorageError`], logged |

mod category;
mod exchange;
mod storage;
mod stream;

pub use category::ErrorCategory;
pub use exchange::ExchangeError;
pub use storage::StorageError;
pub use stream::{DecodeError, TransportError};
