//! Per-connection handler: authenticate the first frame, attach to the
//! relay, then pump frames both ways until either side closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use duet_common::RelayError;
use duet_config::ServerConfig;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::auth::Authorizer;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::runtime::{Event, Outgoing, RelayHandle};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub hello_timeout: Duration,
    pub outbound_buffer: usize,
}

impl ConnectionSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            hello_timeout: Duration::from_secs(config.hello_timeout_secs),
            outbound_buffer: config.outbound_buffer,
        }
    }
}

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    relay: RelayHandle,
    authorizer: Arc<dyn Authorizer>,
    settings: ConnectionSettings,
) {
    let (mut sink, mut stream) = ws.split();

    // 1. The first frame must carry a token.
    let Some(first) = read_hello(&mut stream, addr, settings.hello_timeout).await else {
        let _ = sink.close().await;
        return;
    };
    let identity = match first
        .auth_token()
        .ok_or(RelayError::AuthFailure)
        .and_then(|token| authorizer.authorize(token))
    {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(peer = %addr, error = %e, "Connection refused");
            let _ = send_message(
                &mut sink,
                &ServerMessage::Error {
                    message: e.to_string(),
                    code: e.code().map(String::from),
                },
            )
            .await;
            let _ = sink.close().await;
            return;
        }
    };

    // 2. Attach to the relay with our own outbound queue.
    let conn = relay.next_conn_id();
    let (tx, mut rx) = mpsc::channel::<Outgoing>(settings.outbound_buffer);
    if relay
        .send(Event::Connected {
            conn,
            identity: identity.clone(),
            outlet: tx,
        })
        .await
        .is_err()
    {
        return;
    }
    tracing::info!(peer = %addr, conn = %conn, room = %identity, "Client authenticated");

    if matches!(first, ClientMessage::RegisterStatusListener { .. }) {
        let _ = relay.send(Event::Message { conn, message: first }).await;
    }

    // 3. Pump loop.
    loop {
        tokio::select! {
            out = rx.recv() => {
                match out {
                    Some(Outgoing::Frame(json)) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                        Ok(message) => {
                            if relay.send(Event::Message { conn, message }).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(conn = %conn, error = %e, "Malformed frame");
                            let err = RelayError::InvalidMessage(e.to_string());
                            if send_message(&mut sink, &ServerMessage::error(err.to_string()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(conn = %conn, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // 4. Cleanup.
    tracing::info!(peer = %addr, conn = %conn, room = %identity, "Client disconnected");
    let _ = relay.send(Event::Disconnected { conn }).await;
}

/// Read and parse the first message. Anything other than `hello` or
/// `registerStatusListener` carries no token and is refused by the caller.
async fn read_hello(
    stream: &mut WsStream,
    addr: SocketAddr,
    timeout: Duration,
) -> Option<ClientMessage> {
    let frame = tokio::time::timeout(timeout, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => match ClientMessage::parse(&text) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "Invalid hello message");
                None
            }
        },
        Ok(Some(Ok(_))) => {
            tracing::warn!(peer = %addr, "Expected text hello, got binary");
            None
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(peer = %addr, error = %e, "WS error during hello");
            None
        }
        Ok(None) => {
            tracing::debug!(peer = %addr, "Connection closed before hello");
            None
        }
        Err(_) => {
            tracing::warn!(peer = %addr, timeout = ?timeout, "Hello timeout");
            None
        }
    }
}

async fn send_message(
    sink: &mut WsSink,
    message: &ServerMessage,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    sink.send(Message::Text(message.to_json().into())).await
}
