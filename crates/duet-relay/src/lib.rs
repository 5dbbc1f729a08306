//! duet-relay: coordination relay for paired betting agents.
//!
//! Two agents per user ("PC1" and "PC2") connect over WebSocket, are given
//! a slot each, and are driven through a readiness check followed by a
//! paired dispatch. Observers on the same user see every step. A small HTTP
//! API lets a controller start, inspect and cancel bets.

pub mod api;
pub mod auth;
pub mod connection;
pub mod coordinator;
pub mod protocol;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod timer;

use std::sync::Arc;

use duet_config::DuetConfig;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::auth::Authorizer;
use crate::connection::{handle_connection, ConnectionSettings};
use crate::runtime::RelayHandle;

/// Accept WebSocket clients on `listener` forever.
pub async fn serve_ws(
    listener: TcpListener,
    relay: RelayHandle,
    authorizer: Arc<dyn Authorizer>,
    config: &DuetConfig,
) {
    let settings = ConnectionSettings::from_config(&config.server);
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let relay = relay.clone();
                let authorizer = authorizer.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, relay, authorizer, settings).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
