//! HTTP control API used by the controller UI.
//!
//! Every `/api` route takes `Authorization: Bearer <token>`; the token's
//! identity selects the room.

use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use duet_common::{Identity, RelayError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::Authorizer;
use crate::coordinator::ActionRequest;
use crate::protocol::ConnectedSlots;
use crate::runtime::{HealthReport, RelayHandle};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct ApiState {
    pub relay: RelayHandle,
    pub authorizer: Arc<dyn Authorizer>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/bet-both", post(bet_both_handler))
        .route("/api/bet-single", post(bet_single_handler))
        .route("/api/bet", post(legacy_bet_handler))
        .route("/api/cancelBetAll", post(cancel_all_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReply {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bet_id: Option<String>,
}

impl ApiReply {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            bet_id: None,
        })
    }
}

/// A [`RelayError`] rendered as `{success:false, message, code?}`.
pub struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({ "success": false, "message": self.0.to_string() });
        if let Some(code) = self.0.code() {
            body["code"] = json!(code);
        }
        (status, Json(body)).into_response()
    }
}

/// The room owner named by the request's bearer token.
pub struct Caller(pub Identity);

impl FromRequestParts<ApiState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(RelayError::AuthFailure)?;
        Ok(Caller(state.authorizer.authorize(token.trim())?))
    }
}

/// GET /health
async fn health_handler(
    State(state): State<ApiState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let HealthReport { rooms, connections } = state.relay.health().await?;
    Ok(Json(json!({
        "status": "ok",
        "rooms": rooms,
        "connections": connections,
    })))
}

/// GET /api/status
async fn status_handler(
    State(state): State<ApiState>,
    Caller(identity): Caller,
) -> Result<Json<ConnectedSlots>, ApiError> {
    Ok(Json(state.relay.status(identity).await?))
}

/// POST /api/bet-both
async fn bet_both_handler(
    State(state): State<ApiState>,
    Caller(identity): Caller,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ApiReply>, ApiError> {
    pair(&state, identity, request).await
}

/// POST /api/bet-single
async fn bet_single_handler(
    State(state): State<ApiState>,
    Caller(identity): Caller,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ApiReply>, ApiError> {
    single(&state, identity, request).await
}

#[derive(Debug, Deserialize)]
struct LegacyBet {
    #[serde(default)]
    single: bool,
    #[serde(flatten)]
    request: ActionRequest,
}

/// POST /api/bet, the older combined route.
async fn legacy_bet_handler(
    State(state): State<ApiState>,
    Caller(identity): Caller,
    Json(bet): Json<LegacyBet>,
) -> Result<Json<ApiReply>, ApiError> {
    if bet.single {
        single(&state, identity, bet.request).await
    } else {
        pair(&state, identity, bet.request).await
    }
}

/// POST /api/cancelBetAll
async fn cancel_all_handler(
    State(state): State<ApiState>,
    Caller(identity): Caller,
) -> Result<Json<ApiReply>, ApiError> {
    let cancelled = state.relay.cancel_all(identity).await?;
    if cancelled == 0 {
        return Ok(Json(ApiReply {
            success: false,
            message: "No connected PCs to cancel bets on".into(),
            bet_id: None,
        }));
    }
    Ok(ApiReply::ok(format!(
        "Cancel command sent to {cancelled} connected PC(s)"
    )))
}

async fn pair(
    state: &ApiState,
    identity: Identity,
    request: ActionRequest,
) -> Result<Json<ApiReply>, ApiError> {
    let bet_id = state.relay.pair(identity, request).await?;
    Ok(Json(ApiReply {
        success: true,
        message: "Checking betting time for both PCs...".into(),
        bet_id: Some(bet_id),
    }))
}

async fn single(
    state: &ApiState,
    identity: Identity,
    request: ActionRequest,
) -> Result<Json<ApiReply>, ApiError> {
    let slot = request.slot;
    state.relay.single(identity, request).await?;
    Ok(ApiReply::ok(format!("Bet command sent to {slot}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::{authorizer, token_for, SECRET};
    use crate::runtime;
    use axum::body::Body;
    use axum::http::Request;
    use duet_config::DuetConfig;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        router(ApiState {
            relay: runtime::spawn(&DuetConfig::default()),
            authorizer: Arc::new(authorizer()),
        })
    }

    fn bearer() -> String {
        format!("Bearer {}", token_for("alice", SECRET))
    }

    async fn body_json(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, bearer())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
    }

    #[tokio::test]
    async fn status_requires_token() {
        let req = Request::builder()
            .uri("/api/status")
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "invalid_token");
    }

    #[tokio::test]
    async fn status_of_empty_room() {
        let req = Request::builder()
            .uri("/api/status")
            .header(header::AUTHORIZATION, bearer())
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json, serde_json::json!({ "PC1": false, "PC2": false }));
    }

    #[tokio::test]
    async fn bet_both_without_agents_is_404() {
        let resp = app()
            .oneshot(post_json(
                "/api/bet-both",
                serde_json::json!({ "pc": "PC1", "amount": 1000, "side": "player" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "one or both agents are not connected");
    }

    #[tokio::test]
    async fn legacy_single_routes_to_single_path() {
        let resp = app()
            .oneshot(post_json(
                "/api/bet",
                serde_json::json!({ "single": true, "pc": "PC2", "amount": 10, "side": "Banker" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "PC2 is not connected");
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let resp = app()
            .oneshot(post_json(
                "/api/bet-single",
                serde_json::json!({ "pc": "PC3", "amount": 10, "side": "Banker" }),
            ))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn cancel_with_no_agents() {
        let resp = app()
            .oneshot(post_json("/api/cancelBetAll", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
    }
}
