//! Common test utilities for integration tests.
//!
//! This module provides reusable fixtures: a scriptable identity provider, a
//! registry wired to the mock transport, and helpers for draining connection
//! events.
//!
//! # Example
//!
//! ```ignore
//! let provider = FakeIdentityProvider::new("id-token");
//! let token = cache.get_token(provider.fetcher()).await;
//! assert_eq!(provider.calls(), 1);
//! ```

#![allow(dead_code)]

use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use tradewire::adapters::mock::MockTransport;
use tradewire::config::ReconnectPolicy;
use tradewire::stream::{ConnectionEvent, ConnectionRegistry};

/// Stand-in for the identity provider that counts how often it is asked.
#[derive(Clone)]
pub struct FakeIdentityProvider {
    token: Option<String>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl FakeIdentityProvider {
    pub fn new(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A provider that never produces a credential.
    pub fn signed_out() -> Self {
        Self {
            token: None,
            ..Self::new("")
        }
    }

    /// Delay every fetch, so overlapping callers really overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A one-shot fetch closure suitable for `get_token`.
    pub fn fetcher(&self) -> impl FnOnce() -> BoxFuture<'static, Option<String>> + Send + 'static {
        let provider = self.clone();
        move || {
            async move {
                provider.calls.fetch_add(1, Ordering::SeqCst);
                if !provider.delay.is_zero() {
                    tokio::time::sleep(provider.delay).await;
                }
                provider.token.clone()
            }
            .boxed()
        }
    }
}

/// Registry on the mock transport at `ws://mock`.
pub fn mock_registry(transport: &MockTransport, policy: ReconnectPolicy) -> ConnectionRegistry {
    ConnectionRegistry::new(Arc::new(transport.clone()), "ws://mock", policy)
}

/// Let spawned tasks run. Under paused time this advances the clock by 1ms,
/// well short of any backoff deadline.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Every event delivered so far.
pub fn drain(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Error events whose text marks the end of the retry budget.
pub fn terminal_errors(events: &[ConnectionEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, ConnectionEvent::Error { error, .. } if error.contains("gave up")))
        .count()
}
