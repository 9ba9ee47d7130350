//! Mock stream-token exchange for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ExchangeError;
use crate::traits::{ExchangedToken, TokenExchange};

/// [`TokenExchange`] that replays queued responses.
///
/// When the queue is empty every call succeeds with `stream-token-<n>`, where
/// `n` counts calls from 1.
#[derive(Debug, Clone, Default)]
pub struct MockExchange {
    state: Arc<Mutex<MockExchangeState>>,
}

#[derive(Debug, Default)]
struct MockExchangeState {
    responses: VecDeque<Result<ExchangedToken, ExchangeError>>,
    credentials: Vec<String>,
    delay: Option<Duration>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unanswered call.
    pub fn push_response(&self, response: Result<ExchangedToken, ExchangeError>) {
        self.state.lock().responses.push_back(response);
    }

    /// Delay every call, so overlapping callers really overlap.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Number of exchange calls made.
    pub fn call_count(&self) -> usize {
        self.state.lock().credentials.len()
    }

    /// Credentials presented so far, in call order.
    pub fn presented_credentials(&self) -> Vec<String> {
        self.state.lock().credentials.clone()
    }
}

#[async_trait]
impl TokenExchange for MockExchange {
    async fn exchange(&self, credential: &str) -> Result<ExchangedToken, ExchangeError> {
        let (delay, response) = {
            let mut state = self.state.lock();
            state.credentials.push(credential.to_string());
            let call = state.credentials.len();
            let response = state
                .responses
                .pop_front()
                .unwrap_or_else(|| Ok(ExchangedToken::new(format!("stream-token-{}", call))));
            (state.delay, response)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response
    }
}
