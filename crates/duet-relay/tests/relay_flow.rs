//! End-to-end flows over real sockets: agents and an observer on WebSocket,
//! bets started through the relay handle.

use std::sync::Arc;
use std::time::Duration;

use duet_common::{RelayError, Side, Slot};
use duet_config::DuetConfig;
use duet_relay::auth::{Authorizer, Claims, JwtAuthorizer};
use duet_relay::coordinator::ActionRequest;
use duet_relay::protocol::ServerMessage;
use duet_relay::runtime::{self, RelayHandle};
use duet_relay::serve_ws;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "integration-secret";

fn config() -> DuetConfig {
    let mut config = DuetConfig::default();
    config.auth.jwt_secret = SECRET.into();
    config.auth.enforce_licenses = false;
    config.coordination.readiness_timeout_ms = 500;
    config.coordination.dispatch_timeout_ms = 500;
    config.coordination.settle_grace_ms = 100;
    config
}

fn token(user: &str) -> String {
    let claims = Claims {
        user: user.into(),
        exp: (chrono::Utc::now().timestamp() + 3600) as u64,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn start() -> (String, RelayHandle) {
    let config = config();
    let relay = runtime::spawn(&config);
    let authorizer: Arc<dyn Authorizer> = Arc::new(JwtAuthorizer::new(&config.auth));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let handle = relay.clone();
    tokio::spawn(async move { serve_ws(listener, handle, authorizer, &config).await });
    (url, relay)
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next relay message, skipping control frames.
async fn recv(ws: &mut Client) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skip frames until one matches.
async fn recv_until(ws: &mut Client, want: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
    loop {
        let message = recv(ws).await;
        if want(&message) {
            return message;
        }
    }
}

async fn agent(url: &str, user: &str, expected: Slot) -> Client {
    let (mut ws, _) = connect_async(url).await.unwrap();
    send(&mut ws, json!({ "type": "hello", "token": token(user) })).await;
    send(&mut ws, json!({ "type": "requestAssignment" })).await;
    assert_eq!(recv(&mut ws).await, ServerMessage::Assignment { slot: expected });
    send(&mut ws, json!({ "type": "register", "slot": expected.as_str() })).await;
    recv_until(&mut ws, |m| matches!(m, ServerMessage::Registered { .. })).await;
    ws
}

async fn observer(url: &str, user: &str) -> Client {
    let (mut ws, _) = connect_async(url).await.unwrap();
    send(
        &mut ws,
        json!({ "type": "registerStatusListener", "token": token(user) }),
    )
    .await;
    recv_until(&mut ws, |m| matches!(m, ServerMessage::Status { .. })).await;
    ws
}

fn pair_request() -> ActionRequest {
    ActionRequest {
        slot: Slot::A,
        amount: 1000,
        side: Side::Player,
        platform: None,
    }
}

#[tokio::test]
async fn paired_bet_completes_over_websocket() {
    let (url, relay) = start().await;
    let mut pc1 = agent(&url, "alice", Slot::A).await;
    let mut pc2 = agent(&url, "alice", Slot::B).await;
    let mut obs = observer(&url, "alice").await;

    let bet_id = relay.pair("alice".into(), pair_request()).await.unwrap();
    for ws in [&mut pc1, &mut pc2] {
        let check = recv_until(ws, |m| matches!(m, ServerMessage::CheckBettingTime { .. })).await;
        assert_eq!(check, ServerMessage::CheckBettingTime { bet_id: bet_id.clone() });
        send(ws, json!({ "type": "bettingTimeCheck", "result": true, "betId": bet_id })).await;
    }

    let bet = recv_until(&mut pc1, |m| matches!(m, ServerMessage::PlaceBet { .. })).await;
    assert_eq!(
        bet,
        ServerMessage::PlaceBet { amount: 1000, side: Side::Player, platform: None }
    );
    let bet = recv_until(&mut pc2, |m| matches!(m, ServerMessage::PlaceBet { .. })).await;
    assert_eq!(
        bet,
        ServerMessage::PlaceBet { amount: 1000, side: Side::Banker, platform: None }
    );

    send(&mut pc1, json!({ "type": "betSuccess", "amount": 1000, "side": "Player" })).await;
    send(&mut pc2, json!({ "type": "betSuccess", "amount": 1000, "side": "Banker" })).await;

    match recv_until(&mut obs, |m| matches!(m, ServerMessage::BetCompleted(_))).await {
        ServerMessage::BetCompleted(summary) => {
            assert_eq!(summary.bet_id, bet_id);
            assert_eq!(summary.message, "Both PCs successfully placed bets");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn failure_on_one_side_cancels_the_other() {
    let (url, relay) = start().await;
    let mut pc1 = agent(&url, "alice", Slot::A).await;
    let mut pc2 = agent(&url, "alice", Slot::B).await;

    relay.pair("alice".into(), pair_request()).await.unwrap();
    for ws in [&mut pc1, &mut pc2] {
        recv_until(ws, |m| matches!(m, ServerMessage::CheckBettingTime { .. })).await;
        send(ws, json!({ "type": "bettingTimeCheck", "result": true })).await;
    }
    recv_until(&mut pc1, |m| matches!(m, ServerMessage::PlaceBet { .. })).await;
    send(
        &mut pc1,
        json!({ "type": "betError", "message": "chip missing", "errorType": "chip_disabled" }),
    )
    .await;

    let cancel = recv_until(&mut pc2, |m| matches!(m, ServerMessage::CancelBet { .. })).await;
    assert_eq!(
        cancel,
        ServerMessage::CancelBet { amount: Some(1000), side: Some(Side::Banker), platform: None }
    );
}

#[tokio::test]
async fn third_agent_is_refused() {
    let (url, _relay) = start().await;
    let _pc1 = agent(&url, "alice", Slot::A).await;
    let _pc2 = agent(&url, "alice", Slot::B).await;

    let (mut ws, _) = connect_async(&url).await.unwrap();
    send(&mut ws, json!({ "type": "hello", "token": token("alice") })).await;
    send(&mut ws, json!({ "type": "requestAssignment" })).await;
    match recv(&mut ws).await {
        ServerMessage::Error { code, .. } => assert_eq!(code.as_deref(), Some("slots_exhausted")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn bad_token_is_refused() {
    let (url, _relay) = start().await;
    let (mut ws, _) = connect_async(&url).await.unwrap();
    send(&mut ws, json!({ "type": "hello", "token": "garbage" })).await;
    match recv(&mut ws).await {
        ServerMessage::Error { code, .. } => assert_eq!(code.as_deref(), Some("invalid_token")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let (url, _relay) = start().await;
    let mut pc1 = agent(&url, "alice", Slot::A).await;
    send(&mut pc1, json!({ "type": "noSuchThing" })).await;
    recv_until(&mut pc1, |m| matches!(m, ServerMessage::Error { .. })).await;

    send(&mut pc1, json!({ "type": "requestAssignment" })).await;
    let reply = recv_until(&mut pc1, |m| matches!(m, ServerMessage::Assignment { .. })).await;
    assert_eq!(reply, ServerMessage::Assignment { slot: Slot::A });
}

#[tokio::test]
async fn silent_agent_times_out_readiness() {
    let (url, relay) = start().await;
    let mut pc1 = agent(&url, "alice", Slot::A).await;
    let _pc2 = agent(&url, "alice", Slot::B).await;
    let mut obs = observer(&url, "alice").await;

    relay.pair("alice".into(), pair_request()).await.unwrap();
    recv_until(&mut pc1, |m| matches!(m, ServerMessage::CheckBettingTime { .. })).await;
    send(&mut pc1, json!({ "type": "bettingTimeCheck", "result": true })).await;

    match recv_until(&mut obs, |m| matches!(m, ServerMessage::BetError(_))).await {
        ServerMessage::BetError(notice) => {
            assert_eq!(notice.slot, Slot::B);
            assert_eq!(notice.error_type.as_deref(), Some("readiness_timeout"));
        }
        other => panic!("unexpected {other:?}"),
    }

    // Idle again: a new pair is accepted.
    let result = relay.pair("alice".into(), pair_request()).await;
    assert!(!matches!(result, Err(RelayError::SessionAlreadyInProgress)));
}
