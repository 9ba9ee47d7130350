//! Registry of named streaming connections.
//!
//! Each connection runs its own state machine: connect, receive, and on an
//! unclean close reconnect with exponential backoff until its attempt budget
//! is spent. Connections are independent; one failing never affects another.
//!
//! # Tasks
//!
//! Every connect attempt spawns a driver task that opens the socket and pumps
//! its events into the handler. Every armed backoff spawns one timer task.
//! Both carry the generation of the attempt they belong to and re-check it
//! under the registry lock before touching the record, so a replaced or closed
//! connection never hears from its old socket. Closing or replacing also
//! aborts the old tasks outright.
//!
//! Callbacks run under a per-connection gate. Closing takes the same gate, so
//! a callback already running on another worker finishes before the close
//! returns, and none starts afterwards.
//!
//! A connection with a [`ConnectionToken::Source`] asks it for a fresh token
//! before each attempt. Failing to get one counts as a failed attempt.
//!
//! # Example
//!
//! ```ignore
//! let registry = ConnectionRegistry::new(transport, "wss://stream.example.com", ReconnectPolicy::default());
//! let (handler, mut events) = ChannelHandler::new();
//! registry.create_connection(
//!     ConnectionConfig::new("prices", "v1/prices").with_subscription(r#"{"op":"subscribe"}"#),
//!     handler,
//! );
//! ```

use bytes::Bytes;
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backoff::backoff_delay;
use super::connection::{
    with_token_query, ConnectionConfig, ConnectionHandler, ConnectionInfo, ConnectionStatus,
    ConnectionToken,
};
use super::decoder::DecoderRegistry;
use super::lifecycle::{AppState, LifecycleSource};
use crate::config::ReconnectPolicy;
use crate::traits::{CloseInfo, StreamTransport, TransportCommand, TransportEvent};

/// Owner of every streaming connection.
///
/// Cheap to clone; clones share the same connections. Every operation is
/// synchronous and must be called from within a tokio runtime.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    transport: Arc<dyn StreamTransport>,
    decoders: DecoderRegistry,
    stream_base_url: String,
    policy: ReconnectPolicy,
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    records: HashMap<String, ConnectionRecord>,
    backgrounded: bool,
    next_generation: u64,
    lifecycle_task: Option<JoinHandle<()>>,
    cleaned_up: bool,
}

/// Held while a connection's handler runs. Reentrant so a handler may call
/// back into the registry for its own connection.
type CallbackGate = Arc<ReentrantMutex<()>>;

struct ConnectionRecord {
    config: ConnectionConfig,
    handler: Arc<dyn ConnectionHandler>,
    gate: CallbackGate,
    max_attempts: u32,
    base_backoff: Duration,
    attempts: u32,
    status: ConnectionStatus,
    /// Identifies the current connect attempt.
    generation: u64,
    /// Present only while the socket is open.
    commands: Option<mpsc::UnboundedSender<TransportCommand>>,
    driver: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    pending_delay: Option<Duration>,
    exhausted_reported: bool,
}

impl ConnectionRecord {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        self.pending_delay = None;
    }

    /// Detach the current socket: its driver stops and the socket is asked to
    /// close.
    fn detach_socket(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(TransportCommand::Close);
        }
    }

    fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.config.id.clone(),
            endpoint: self.config.endpoint.clone(),
            status: self.status,
            reconnect_attempts: self.attempts,
            max_reconnect_attempts: self.max_attempts,
            pending_reconnect: self.pending_delay,
        }
    }
}

impl ConnectionRegistry {
    /// Create a registry with the built-in decoders.
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        stream_base_url: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self::with_decoders(transport, stream_base_url, policy, DecoderRegistry::default())
    }

    pub fn with_decoders(
        transport: Arc<dyn StreamTransport>,
        stream_base_url: impl Into<String>,
        policy: ReconnectPolicy,
        decoders: DecoderRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                transport,
                decoders,
                stream_base_url: stream_base_url.into(),
                policy,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    /// Create a connection and start connecting immediately.
    ///
    /// An existing connection with the same id is closed first.
    pub fn create_connection(&self, config: ConnectionConfig, handler: Arc<dyn ConnectionHandler>) {
        let id = config.id.clone();
        let record = ConnectionRecord {
            max_attempts: config
                .max_reconnect_attempts
                .unwrap_or(self.inner.policy.max_attempts),
            base_backoff: config.base_backoff.unwrap_or(self.inner.policy.base_backoff),
            config,
            handler,
            gate: Arc::new(ReentrantMutex::new(())),
            attempts: 0,
            status: ConnectionStatus::Disconnected,
            generation: 0,
            commands: None,
            driver: None,
            reconnect_timer: None,
            pending_delay: None,
            exhausted_reported: false,
        };

        if let Some(mut previous) = self.inner.remove_gated(&id) {
            debug!("Replacing connection '{}'", id);
            previous.cancel_timer();
            previous.detach_socket();
        }

        let mut state = self.inner.state.lock();
        if let Some(mut previous) = state.records.insert(id.clone(), record) {
            previous.cancel_timer();
            previous.detach_socket();
        }
        info!("Creating connection '{}'", id);
        self.inner.connect_locked(&mut state, &id);
    }

    /// Close a connection and forget it.
    ///
    /// Effective in every state, including mid-backoff. A callback for `id`
    /// already running on another thread completes before this returns; no
    /// callback for `id` starts after it returns.
    pub fn close_connection(&self, id: &str) {
        if let Some(mut record) = self.inner.remove_gated(id) {
            record.cancel_timer();
            record.detach_socket();
            info!("Closed connection '{}'", id);
        }
    }

    /// Reset the attempt budget and connect again right away.
    ///
    /// Returns `false` if no connection with `id` exists.
    pub fn reconnect_connection(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let Some(record) = state.records.get_mut(id) else {
            return false;
        };
        record.attempts = 0;
        record.exhausted_reported = false;
        record.cancel_timer();
        info!("Reconnecting '{}' on request", id);
        self.inner.connect_locked(&mut state, id);
        true
    }

    /// Send a text frame. Returns `false` unless the socket is open.
    pub fn send_message(&self, id: &str, payload: impl Into<String>) -> bool {
        let state = self.inner.state.lock();
        let Some(record) = state.records.get(id) else {
            return false;
        };
        match (&record.status, &record.commands) {
            (ConnectionStatus::Connected, Some(commands)) => {
                commands.send(TransportCommand::Send(payload.into())).is_ok()
            }
            _ => false,
        }
    }

    /// Status of `id`; unknown ids read as disconnected.
    pub fn get_connection_status(&self, id: &str) -> ConnectionStatus {
        self.inner
            .state
            .lock()
            .records
            .get(id)
            .map(|record| record.status)
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    pub fn connection_info(&self, id: &str) -> Option<ConnectionInfo> {
        self.inner.state.lock().records.get(id).map(ConnectionRecord::info)
    }

    /// Snapshot of every connection, ordered by id.
    pub fn get_all_connections(&self) -> Vec<ConnectionInfo> {
        let mut all: Vec<_> = self
            .inner
            .state
            .lock()
            .records
            .values()
            .map(ConnectionRecord::info)
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Follow foreground/background transitions published by `source`.
    ///
    /// Replaces any previously attached source.
    pub fn attach_lifecycle(&self, source: &dyn LifecycleSource) {
        let mut rx = source.subscribe();
        let initial = *rx.borrow_and_update();
        if initial == AppState::Background {
            self.inner.apply_app_state(AppState::Background);
        }

        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let app_state = *rx.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.apply_app_state(app_state);
            }
            debug!("Lifecycle observer stopped");
        });

        if let Some(previous) = self.inner.state.lock().lifecycle_task.replace(task) {
            previous.abort();
        }
    }

    /// Apply an application state directly, without a [`LifecycleSource`].
    pub fn set_app_state(&self, app_state: AppState) {
        self.inner.apply_app_state(app_state);
    }

    /// Close every connection, cancel every timer and detach the lifecycle
    /// observer. Later calls are no-ops.
    pub fn cleanup(&self) {
        let (ids, lifecycle_task) = {
            let mut state = self.inner.state.lock();
            if state.cleaned_up {
                return;
            }
            state.cleaned_up = true;
            let ids: Vec<String> = state.records.keys().cloned().collect();
            (ids, state.lifecycle_task.take())
        };

        if let Some(task) = lifecycle_task {
            task.abort();
        }
        let mut count = 0;
        for id in ids {
            if let Some(mut record) = self.inner.remove_gated(&id) {
                record.cancel_timer();
                record.detach_socket();
                count += 1;
            }
        }
        info!("Connection registry cleaned up ({} connections closed)", count);
    }
}

impl RegistryInner {
    /// Start a new connect attempt for `id`, superseding any previous one.
    fn connect_locked(self: &Arc<Self>, state: &mut RegistryState, id: &str) {
        let generation = state.next_generation;
        state.next_generation += 1;

        let Some(record) = state.records.get_mut(id) else {
            return;
        };
        record.detach_socket();
        record.generation = generation;
        record.status = ConnectionStatus::Connecting;

        let attempt = Attempt {
            id: id.to_string(),
            generation,
            gate: record.gate.clone(),
            url: record.config.url(&self.stream_base_url, None),
            token: record.config.token.clone(),
        };
        debug!("Connecting '{}' (generation {})", id, generation);
        record.driver = Some(tokio::spawn(drive_connection(
            Arc::downgrade(self),
            self.transport.clone(),
            attempt,
        )));
    }

    /// Remove `id` while holding its callback gate.
    fn remove_gated(&self, id: &str) -> Option<ConnectionRecord> {
        loop {
            let gate = self.state.lock().records.get(id)?.gate.clone();
            let _callbacks = gate.lock();
            let mut state = self.state.lock();
            match state.records.get(id).map(|record| Arc::ptr_eq(&record.gate, &gate)) {
                Some(true) => return state.records.remove(id),
                // Replaced while we waited; gate the newer record instead.
                Some(false) => continue,
                None => return None,
            }
        }
    }

    /// Look up the record for a callback from attempt `generation`.
    fn current<'a>(
        state: &'a mut RegistryState,
        id: &str,
        generation: u64,
    ) -> Option<&'a mut ConnectionRecord> {
        state
            .records
            .get_mut(id)
            .filter(|record| record.generation == generation)
    }

    fn handle_open(
        &self,
        attempt: &Attempt,
        commands: mpsc::UnboundedSender<TransportCommand>,
    ) -> bool {
        let (id, generation) = (attempt.id.as_str(), attempt.generation);
        let _callbacks = attempt.gate.lock();
        let (handler, subscription) = {
            let mut state = self.state.lock();
            let Some(record) = Self::current(&mut state, id, generation) else {
                return false;
            };
            record.status = ConnectionStatus::Connected;
            record.attempts = 0;
            record.exhausted_reported = false;
            record.commands = Some(commands.clone());
            (record.handler.clone(), record.config.subscription.clone())
        };

        info!("Connection '{}' open", id);
        handler.on_open(id);
        if let Some(subscription) = subscription {
            debug!("Sending subscription on '{}'", id);
            let _ = commands.send(TransportCommand::Send(subscription));
        }
        true
    }

    fn handle_message(&self, attempt: &Attempt, payload: &Bytes) {
        let (id, generation) = (attempt.id.as_str(), attempt.generation);
        let _callbacks = attempt.gate.lock();
        let (handler, decoder) = {
            let mut state = self.state.lock();
            let Some(record) = Self::current(&mut state, id, generation) else {
                return;
            };
            (record.handler.clone(), record.config.decoder.clone())
        };

        match self.decoders.decode(decoder.as_deref(), payload) {
            Ok(message) => handler.on_message(id, message),
            Err(e) => warn!("Dropping message on '{}': {}", id, e),
        }
    }

    fn handle_error(&self, attempt: &Attempt, description: &str) {
        let (id, generation) = (attempt.id.as_str(), attempt.generation);
        let _callbacks = attempt.gate.lock();
        let handler = {
            let mut state = self.state.lock();
            let Some(record) = Self::current(&mut state, id, generation) else {
                return;
            };
            record.status = ConnectionStatus::Error;
            record.handler.clone()
        };

        warn!("Connection '{}' error: {}", id, description);
        handler.on_error(id, &format!("Connection '{}' error: {}", id, description));
    }

    fn handle_close(self: &Arc<Self>, attempt: &Attempt, info: CloseInfo) {
        let (id, generation) = (attempt.id.as_str(), attempt.generation);
        let _callbacks = attempt.gate.lock();
        let handler = {
            let mut state = self.state.lock();
            let Some(record) = Self::current(&mut state, id, generation) else {
                return;
            };
            record.commands = None;
            if record.status != ConnectionStatus::Error {
                record.status = ConnectionStatus::Disconnected;
            }
            record.handler.clone()
        };

        info!(
            "Connection '{}' closed (code {:?}, clean: {})",
            id, info.code, info.clean
        );
        handler.on_close(id, &info);
        if !info.clean {
            self.schedule_reconnect(id, generation);
        }
    }

    /// Arm the backoff timer after attempt `generation` failed. Called with
    /// the connection's callback gate held.
    fn schedule_reconnect(self: &Arc<Self>, id: &str, generation: u64) {
        let exhausted = {
            let mut state = self.state.lock();
            let backgrounded = state.backgrounded;
            let Some(record) = Self::current(&mut state, id, generation) else {
                return;
            };

            if record.attempts >= record.max_attempts {
                if record.exhausted_reported {
                    return;
                }
                record.exhausted_reported = true;
                record.status = ConnectionStatus::Error;
                Some((record.handler.clone(), record.attempts))
            } else if backgrounded {
                debug!("Backgrounded, deferring reconnect of '{}'", id);
                None
            } else {
                let delay = backoff_delay(record.base_backoff, record.attempts, self.policy.max_backoff);
                record.attempts += 1;
                record.cancel_timer();
                record.pending_delay = Some(delay);
                info!(
                    "Reconnecting '{}' in {:?} (attempt {}/{})",
                    id, delay, record.attempts, record.max_attempts
                );

                let weak = Arc::downgrade(self);
                let timer_id = id.to_string();
                record.reconnect_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_reconnect(&timer_id, generation);
                    }
                }));
                None
            }
        };

        if let Some((handler, attempts)) = exhausted {
            error!("Connection '{}' gave up after {} reconnect attempts", id, attempts);
            handler.on_error(
                id,
                &format!(
                    "Connection '{}' failed: gave up after {} reconnect attempts",
                    id, attempts
                ),
            );
        }
    }

    fn fire_reconnect(self: &Arc<Self>, id: &str, generation: u64) {
        let mut state = self.state.lock();
        let Some(record) = Self::current(&mut state, id, generation) else {
            return;
        };
        // This task is the timer; dropping its handle is enough.
        record.reconnect_timer = None;
        record.pending_delay = None;
        self.connect_locked(&mut state, id);
    }

    fn apply_app_state(self: &Arc<Self>, app_state: AppState) {
        let mut state = self.state.lock();
        match app_state {
            AppState::Background => {
                if state.backgrounded {
                    return;
                }
                state.backgrounded = true;
                for record in state.records.values_mut() {
                    record.cancel_timer();
                }
                info!("Backgrounded, reconnect timers cancelled");
            }
            AppState::Foreground => {
                if !state.backgrounded {
                    return;
                }
                state.backgrounded = false;
                let stalled: Vec<String> = state
                    .records
                    .values()
                    .filter(|record| record.status != ConnectionStatus::Connected)
                    .map(|record| record.config.id.clone())
                    .collect();
                info!("Foregrounded, resuming {} connections", stalled.len());
                for id in stalled {
                    if let Some(record) = state.records.get_mut(&id) {
                        record.attempts = 0;
                        record.exhausted_reported = false;
                        record.cancel_timer();
                    }
                    self.connect_locked(&mut state, &id);
                }
            }
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(task) = state.lifecycle_task.take() {
            task.abort();
        }
        for record in state.records.values_mut() {
            record.cancel_timer();
            record.detach_socket();
        }
    }
}

/// One connect attempt, as seen by its driver task.
struct Attempt {
    id: String,
    generation: u64,
    gate: CallbackGate,
    /// Socket URL without the token parameter
    url: String,
    token: Option<ConnectionToken>,
}

/// Resolve the token, open the socket for one connect attempt and pump its
/// events.
async fn drive_connection(
    registry: Weak<RegistryInner>,
    transport: Arc<dyn StreamTransport>,
    attempt: Attempt,
) {
    let url = match &attempt.token {
        None => attempt.url.clone(),
        Some(token) => match token.resolve().await {
            Ok(token) => with_token_query(attempt.url.clone(), &token),
            Err(e) => {
                if let Some(inner) = registry.upgrade() {
                    let description = format!("stream token unavailable: {}", e);
                    inner.handle_error(&attempt, &description);
                    inner.handle_close(&attempt, CloseInfo::abnormal(description));
                }
                return;
            }
        },
    };

    let opened = transport.open(&url).await;
    let Some(inner) = registry.upgrade() else {
        return;
    };

    let mut events = match opened {
        Ok(handle) => {
            if !inner.handle_open(&attempt, handle.commands) {
                return;
            }
            handle.events
        }
        Err(e) => {
            inner.handle_error(&attempt, &e.to_string());
            inner.handle_close(&attempt, CloseInfo::abnormal(e.to_string()));
            return;
        }
    };
    drop(inner);

    while let Some(event) = events.recv().await {
        let Some(inner) = registry.upgrade() else {
            return;
        };
        match event {
            TransportEvent::Message(payload) => inner.handle_message(&attempt, &payload),
            TransportEvent::Error(description) => inner.handle_error(&attempt, &description),
            TransportEvent::Closed(info) => {
                inner.handle_close(&attempt, info);
                return;
            }
        }
    }

    if let Some(inner) = registry.upgrade() {
        inner.handle_close(&attempt, CloseInfo::abnormal("transport ended"));
    }
}
