//! Application foreground/background signal.
//!
//! The platform glue publishes transitions through [`AppLifecycle`]; the
//! connection registry observes them through [`LifecycleSource`] and pauses or
//! resumes reconnection accordingly.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Whether the user is looking at the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Foreground,
    Background,
}

/// Anything that can publish [`AppState`] transitions.
pub trait LifecycleSource {
    /// Subscribe to the current state and every later change.
    fn subscribe(&self) -> watch::Receiver<AppState>;
}

/// Publisher of application state transitions.
#[derive(Debug)]
pub struct AppLifecycle {
    sender: watch::Sender<AppState>,
}

impl AppLifecycle {
    pub fn new(initial: AppState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Publish a transition. Repeating the current state is a no-op.
    pub fn set_state(&self, state: AppState) {
        self.sender.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    pub fn current(&self) -> AppState {
        *self.sender.borrow()
    }
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::new(AppState::Foreground)
    }
}

impl LifecycleSource for AppLifecycle {
    fn subscribe(&self) -> watch::Receiver<AppState> {
        self.sender.subscribe()
    }
}
