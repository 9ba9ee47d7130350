//! Headless streaming command.
//!
//! Signs in with the credential from `TRADEWIRE_ID_TOKEN`, opens every
//! requested endpoint and prints each callback as one JSON line on stdout
//! until interrupted.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::{json, Value};
use tracing::info;

use super::args::RunOptions;
use crate::config::ClientConfig;
use crate::session::Session;
use crate::stream::{ChannelHandler, ConnectionConfig, ConnectionEvent};

/// Environment variable holding the long-lived credential.
pub const ID_TOKEN_ENV: &str = "TRADEWIRE_ID_TOKEN";

/// Identity provider backed by the environment.
async fn identity_from_env() -> Option<String> {
    std::env::var(ID_TOKEN_ENV)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Render a callback as a JSON line.
pub fn event_to_json(event: &ConnectionEvent) -> Value {
    match event {
        ConnectionEvent::Opened { id } => json!({ "connection": id, "event": "open" }),
        ConnectionEvent::Message { id, message } => {
            json!({ "connection": id, "event": "message", "data": message })
        }
        ConnectionEvent::Closed { id, info } => json!({
            "connection": id,
            "event": "close",
            "code": info.code,
            "reason": info.reason,
            "clean": info.clean,
        }),
        ConnectionEvent::Error { id, error } => {
            json!({ "connection": id, "event": "error", "error": error })
        }
    }
}

/// Stream `options.endpoints` until Ctrl-C.
pub async fn run_streams(config: ClientConfig, options: RunOptions) -> Result<()> {
    let session = Session::from_config(&config)
        .ok_or_else(|| eyre!("Could not determine a data directory; set TRADEWIRE_DATA_DIR"))?;
    session.credentials().initialize().await;

    // Fail fast when signed out; the token stays cached for the first opens.
    session
        .stream_token(identity_from_env)
        .await
        .map_err(|e| eyre!("{} [{}]", e.user_message(), e.error_code()))?;

    let token_source = session.token_source(identity_from_env);
    let (handler, mut events) = ChannelHandler::new();
    for endpoint in &options.endpoints {
        let mut connection = ConnectionConfig::new(endpoint.clone(), endpoint.clone())
            .with_token_source(token_source.clone());
        if let Some(subscription) = &options.subscribe {
            connection = connection.with_subscription(subscription.clone());
        }
        if let Some(decoder) = &options.decoder {
            connection = connection.with_decoder(decoder.clone());
        }
        session.registry().create_connection(connection, handler.clone());
    }
    drop(handler);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("{}", event_to_json(&event)),
                None => break,
            },
            _ = &mut ctrl_c => {
                info!("Interrupted, closing connections");
                break;
            }
        }
    }

    session.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CloseInfo;
    use serial_test::serial;

    #[test]
    fn test_message_line() {
        let event = ConnectionEvent::Message {
            id: "prices".to_string(),
            message: json!({"bid": 1.5}),
        };
        assert_eq!(
            event_to_json(&event),
            json!({"connection": "prices", "event": "message", "data": {"bid": 1.5}})
        );
    }

    #[test]
    fn test_close_line() {
        let event = ConnectionEvent::Closed {
            id: "prices".to_string(),
            info: CloseInfo::with_code(1011, "server error", false),
        };
        let line = event_to_json(&event);
        assert_eq!(line["code"], json!(1011));
        assert_eq!(line["clean"], json!(false));
    }

    #[tokio::test]
    #[serial]
    async fn test_identity_from_env() {
        std::env::set_var(ID_TOKEN_ENV, "  id-token \n");
        assert_eq!(identity_from_env().await, Some("id-token".to_string()));

        std::env::set_var(ID_TOKEN_ENV, "");
        assert_eq!(identity_from_env().await, None);

        std::env::remove_var(ID_TOKEN_ENV);
        assert_eq!(identity_from_env().await, None);
    }
}
