/// Integration tests for foreground/background handling.
///
/// Backgrounding pauses retries without touching open sockets; foregrounding
/// resumes every connection that is not connected.
mod common;

use common::{drain, mock_registry, settle, terminal_errors};
use std::time::Duration;

use tradewire::adapters::mock::MockTransport;
use tradewire::config::ReconnectPolicy;
use tradewire::stream::{AppLifecycle, AppState, ChannelHandler, ConnectionConfig, ConnectionStatus};

/// Foregrounding reconnects the connection that was mid-backoff at once and
/// leaves the connected one alone.
#[tokio::test(start_paused = true)]
async fn test_foreground_resumes_only_disconnected() {
    let transport = MockTransport::new();
    let registry = mock_registry(&transport, ReconnectPolicy::default());
    let lifecycle = AppLifecycle::default();
    registry.attach_lifecycle(&lifecycle);
    let (handler, _events) = ChannelHandler::new();

    registry.create_connection(ConnectionConfig::new("live", "v1/live"), handler.clone());
    registry.create_connection(
        ConnectionConfig::new("flaky", "v1/flaky").with_base_backoff(Duration::from_secs(20)),
        handler,
    );
    settle().await;
    let live_socket = transport.last_socket("v1/live").unwrap();
    transport.last_socket("v1/flaky").unwrap().drop_connection();
    settle().await;
    assert_eq!(
        registry.connection_info("flaky").unwrap().pending_reconnect,
        Some(Duration::from_secs(20))
    );

    lifecycle.set_state(AppState::Background);
    settle().await;
    lifecycle.set_state(AppState::Foreground);
    settle().await;

    // Well before the 20s backoff would have fired.
    assert_eq!(transport.open_count_for("v1/flaky"), 2);
    assert_eq!(registry.get_connection_status("flaky"), ConnectionStatus::Connected);

    assert_eq!(transport.open_count_for("v1/live"), 1);
    assert!(!live_socket.is_closed());
    assert_eq!(registry.get_connection_status("live"), ConnectionStatus::Connected);
}

/// Backgrounding cancels armed timers but keeps open sockets.
#[tokio::test(start_paused = true)]
async fn test_background_cancels_timers_only() {
    let transport = MockTransport::new();
    let registry = mock_registry(&transport, ReconnectPolicy::default());
    let lifecycle = AppLifecycle::default();
    registry.attach_lifecycle(&lifecycle);
    let (handler, _events) = ChannelHandler::new();

    registry.create_connection(ConnectionConfig::new("live", "v1/live"), handler.clone());
    registry.create_connection(ConnectionConfig::new("flaky", "v1/flaky"), handler);
    settle().await;
    transport.last_socket("v1/flaky").unwrap().drop_connection();
    settle().await;

    lifecycle.set_state(AppState::Background);
    settle().await;
    assert_eq!(registry.connection_info("flaky").unwrap().pending_reconnect, None);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.open_count_for("v1/flaky"), 1);
    assert!(!transport.last_socket("v1/live").unwrap().is_closed());
    assert_eq!(registry.get_connection_status("live"), ConnectionStatus::Connected);
}

/// A failure while backgrounded is deferred, not abandoned.
#[tokio::test(start_paused = true)]
async fn test_failure_in_background_is_deferred() {
    let transport = MockTransport::new();
    let registry = mock_registry(&transport, ReconnectPolicy::default());
    let lifecycle = AppLifecycle::new(AppState::Background);
    registry.attach_lifecycle(&lifecycle);
    let (handler, mut events) = ChannelHandler::new();

    registry.create_connection(ConnectionConfig::new("prices", "v1/prices"), handler);
    settle().await;
    transport.last_socket("prices").unwrap().drop_connection();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(transport.open_count(), 1);
    let info = registry.connection_info("prices").unwrap();
    assert_eq!(info.pending_reconnect, None);
    assert_eq!(info.reconnect_attempts, 0);
    // No terminal error: the connection is waiting, not exhausted.
    assert_eq!(terminal_errors(&drain(&mut events)), 0);

    lifecycle.set_state(AppState::Foreground);
    settle().await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(registry.get_connection_status("prices"), ConnectionStatus::Connected);
}

/// The registry can be driven directly, without a lifecycle source.
#[tokio::test(start_paused = true)]
async fn test_set_app_state_directly() {
    let transport = MockTransport::new();
    transport.set_refuse_connections(true);
    let registry = mock_registry(&transport, ReconnectPolicy::default());
    let (handler, _events) = ChannelHandler::new();

    registry.create_connection(ConnectionConfig::new("prices", "v1/prices"), handler);
    settle().await;

    registry.set_app_state(AppState::Background);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);

    transport.set_refuse_connections(false);
    registry.set_app_state(AppState::Foreground);
    settle().await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(registry.get_connection_status("prices"), ConnectionStatus::Connected);
}

/// After cleanup the lifecycle observer is gone.
#[tokio::test(start_paused = true)]
async fn test_cleanup_detaches_lifecycle() {
    let transport = MockTransport::new();
    let registry = mock_registry(&transport, ReconnectPolicy::default());
    let lifecycle = AppLifecycle::default();
    registry.attach_lifecycle(&lifecycle);
    let (handler, _events) = ChannelHandler::new();

    registry.create_connection(ConnectionConfig::new("prices", "v1/prices"), handler);
    settle().await;
    registry.cleanup();
    settle().await;

    lifecycle.set_state(AppState::Background);
    lifecycle.set_state(AppState::Foreground);
    settle().await;

    assert_eq!(transport.open_count(), 1);
    assert!(registry.get_all_connections().is_empty());
}
