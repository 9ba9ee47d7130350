//! Shared handle to an in-flight operation.
//!
//! The leader registers a pending handle while holding the cache lock, then
//! runs the operation outside it. Followers clone the handle and await the
//! same outcome. The operation itself clears the handle when it settles.

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

/// Clonable future resolving to the outcome of one in-flight operation.
pub(crate) type InFlight<T> = Shared<BoxFuture<'static, T>>;

/// Create a pending in-flight handle and the sender that completes it.
///
/// If the sender is dropped without sending, every awaiter receives
/// `abandoned`.
pub(crate) fn pending<T>(abandoned: T) -> (oneshot::Sender<T>, InFlight<T>)
where
    T: Clone + Send + Sync + 'static,
{
    let (tx, rx) = oneshot::channel();
    let flight = async move { rx.await.unwrap_or(abandoned) }.boxed().shared();
    (tx, flight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_followers_see_one_outcome() {
        let (tx, flight) = pending(None::<String>);
        let a = tokio::spawn(flight.clone());
        let b = tokio::spawn(flight.clone());

        tx.send(Some("token".to_string())).unwrap();

        assert_eq!(a.await.unwrap(), Some("token".to_string()));
        assert_eq!(b.await.unwrap(), Some("token".to_string()));
        assert_eq!(flight.await, Some("token".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_sender_yields_abandoned() {
        let (tx, flight) = pending(Err::<u8, &str>("abandoned"));
        drop(tx);
        assert_eq!(flight.await, Err("abandoned"));
    }
}
